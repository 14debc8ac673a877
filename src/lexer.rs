//! Splitting a raw input line into arguments.
//!
//! The line is tokenized in place, in three passes over the same buffer:
//!
//! 1. scan left to right, validate quoting, count arguments and escape
//!    markers, and overwrite every delimiter with a NUL terminator;
//! 2. re-scan the terminator-separated buffer and record one byte range per
//!    argument, skipping the opening quote of quoted arguments;
//! 3. drop the escape markers, shifting the rest of the affected argument one
//!    byte left per removed marker. This pass stops as soon as all escapes
//!    counted in pass 1 are resolved.
//!
//! A backslash makes the following byte literal, inside quotes or out. Any
//! byte `<=` space separates arguments.

use std::ops::Range;
use thiserror::Error;

/// Errors that can occur while splitting a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LexingError {
    /// A quoted argument reached the end of the line without its closing quote.
    #[error("unterminated quote starting at byte {0}")]
    UnfinishedQuote(usize),
    /// A closing quote was directly followed by a non-whitespace byte.
    #[error("unexpected byte after closing quote at byte {0}")]
    TextAfterQuote(usize),
    /// A `"` appeared inside an unquoted argument.
    #[error("unescaped quote inside argument at byte {0}")]
    UnescapedQuote(usize),
    /// The line ended right after a backslash.
    #[error("dangling escape at byte {0}")]
    DanglingEscape(usize),
    /// The argument at this index is not valid UTF-8.
    #[error("argument {0} is not valid UTF-8")]
    InvalidUtf8(usize),
}

impl LexingError {
    /// `true` for the quoting and escaping errors, `false` for encoding errors.
    pub fn is_quoting(&self) -> bool {
        !matches!(self, Self::InvalidUtf8(_))
    }
}

/// The ordered arguments of one line, borrowed from the line buffer.
///
/// Indexing past the last argument yields `None`, which plays the role of the
/// end-of-arguments sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Argv<'a> {
    args: Vec<&'a str>,
}

impl<'a> Argv<'a> {
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument `idx`, or `None` once past the end.
    pub fn get(&self, idx: usize) -> Option<&'a str> {
        self.args.get(idx).copied()
    }

    /// The command name, i.e. `argv[0]`.
    pub fn name(&self) -> Option<&'a str> {
        self.get(0)
    }

    /// All arguments including the command name.
    pub fn as_slice(&self) -> &[&'a str] {
        &self.args
    }

    /// Arguments after the command name.
    pub fn params(&self) -> &[&'a str] {
        self.args.get(1..).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.args.iter().copied()
    }
}

impl<'a> From<Vec<&'a str>> for Argv<'a> {
    fn from(args: Vec<&'a str>) -> Self {
        Self { args }
    }
}

fn is_quote(byte: u8) -> bool {
    byte == b'"' || byte == b'\''
}

fn is_arg_byte(byte: u8) -> bool {
    byte > b' '
}

struct Scan {
    argc: usize,
    escapes: usize,
}

/// Pass 1: validate and terminate every argument in place.
fn mark_arguments(buf: &mut [u8]) -> Result<Scan, LexingError> {
    let len = buf.len();
    let mut pos = 0;
    let mut scan = Scan { argc: 0, escapes: 0 };

    while pos < len {
        if is_arg_byte(buf[pos]) {
            if is_quote(buf[pos]) {
                let start = pos;
                let quote = buf[pos];
                loop {
                    pos += 1;
                    match buf.get(pos) {
                        None => return Err(LexingError::UnfinishedQuote(start)),
                        Some(b'\\') => {
                            scan.escapes += 1;
                            pos += 1;
                            if pos >= len {
                                return Err(LexingError::UnfinishedQuote(start));
                            }
                        }
                        Some(&c) if c == quote => break,
                        Some(_) => {}
                    }
                }
                if buf.get(pos + 1).is_some_and(|&c| is_arg_byte(c)) {
                    return Err(LexingError::TextAfterQuote(pos + 1));
                }
            } else {
                loop {
                    if buf[pos] == b'\\' {
                        scan.escapes += 1;
                        pos += 1;
                        if pos >= len {
                            return Err(LexingError::DanglingEscape(pos - 1));
                        }
                    }
                    pos += 1;
                    match buf.get(pos) {
                        Some(b'"') => return Err(LexingError::UnescapedQuote(pos)),
                        Some(&c) if is_arg_byte(c) => {}
                        _ => break,
                    }
                }
            }
            scan.argc += 1;
        }

        // Whitespace and closing quotes become terminators.
        if pos < len {
            buf[pos] = 0;
            pos += 1;
        }
    }

    Ok(scan)
}

/// Pass 2: collect the range of every terminated argument.
fn collect_spans(buf: &[u8], argc: usize) -> Vec<Range<usize>> {
    let len = buf.len();
    let mut spans = Vec::with_capacity(argc);
    let mut pos = 0;

    for _ in 0..argc {
        while pos < len && buf[pos] == 0 {
            pos += 1;
        }
        if pos < len && is_quote(buf[pos]) {
            pos += 1;
        }
        let start = pos;
        while pos < len && buf[pos] != 0 {
            pos += 1;
        }
        spans.push(start..pos);
    }

    spans
}

/// Pass 3: remove escape markers, compacting each argument in place.
fn remove_escapes(buf: &mut [u8], spans: &mut [Range<usize>], mut remaining: usize) {
    for span in spans.iter_mut() {
        if remaining == 0 {
            break;
        }
        let mut i = span.start;
        while i < span.end && remaining > 0 {
            if buf[i] == b'\\' {
                buf.copy_within(i + 1..span.end, i);
                span.end -= 1;
                buf[span.end] = 0;
                remaining -= 1;
            }
            // Skip the byte that was escaped.
            i += 1;
        }
    }
}

/// Split `line` into arguments, rewriting it in place.
///
/// The line must hold a single line without terminators; a NUL byte ends the
/// line early. A blank line yields an empty [`Argv`]. On error the buffer
/// contents are unspecified and should be discarded.
///
/// Arguments are handed to commands as `&str`, so every argument must be
/// valid UTF-8 once escapes are removed. An argument that is not (for
/// example Latin-1 `caf\xe9`) fails with [`LexingError::InvalidUtf8`] and the
/// line is not dispatched. Quoting is checked first: a line that is both
/// badly quoted and not UTF-8 reports the quoting error.
pub fn split_into_args<'a>(line: &'a mut [u8]) -> Result<Argv<'a>, LexingError> {
    let len = line.iter().position(|&b| b == 0).unwrap_or(line.len());
    let buf: &'a mut [u8] = &mut line[..len];

    let scan = mark_arguments(buf)?;
    if scan.argc == 0 {
        return Ok(Argv::default());
    }

    let mut spans = collect_spans(buf, scan.argc);
    remove_escapes(buf, &mut spans, scan.escapes);

    let buf: &'a [u8] = buf;
    let args = spans
        .into_iter()
        .enumerate()
        .map(move |(idx, span)| {
            std::str::from_utf8(&buf[span]).map_err(|_| LexingError::InvalidUtf8(idx))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Argv { args })
}
