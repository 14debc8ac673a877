//! Assembling input bytes into lines.
//!
//! Handles the keys a dumb serial terminal sends: CR and LF end a line
//! (so CRLF just produces an extra empty line), the cancel byte abandons the
//! line, and BS / DEL erase the last byte.

use crate::config::{EOT, OverflowPolicy, ShellConfig};
use crate::io_adapters::ByteSource;
use crate::line_buffer::LineBuffer;
use std::io::{Result as IoResult, Write};

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;
const ERASE_SEQUENCE: &[u8] = b"\x08 \x08";
const NEWLINE: &[u8] = b"\r\n";

/// Result of reading one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A non-empty line is in the buffer.
    Line,
    /// The line was empty or cancelled; the buffer is empty.
    Empty,
    /// The input has no more bytes.
    Eof,
    /// The line did not fit and was discarded.
    Overflow,
}

/// Reads lines from a [`ByteSource`] into a [`LineBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct LineReader {
    echo: bool,
    cancel_byte: u8,
    /// A second cancel byte, only set for password entry.
    alt_cancel_byte: Option<u8>,
    overflow: OverflowPolicy,
}

impl LineReader {
    pub fn new(echo: bool, cancel_byte: u8, overflow: OverflowPolicy) -> Self {
        Self {
            echo,
            cancel_byte,
            alt_cancel_byte: None,
            overflow,
        }
    }

    pub fn from_config(config: &ShellConfig) -> Self {
        Self::new(config.echo, config.cancel_byte, config.overflow)
    }

    /// A copy of this reader that never echoes, always drains overflowing
    /// lines and also cancels on ctrl-D. Used for password entry.
    pub fn secret(&self) -> Self {
        Self {
            echo: false,
            alt_cancel_byte: Some(EOT),
            overflow: OverflowPolicy::Drain,
            ..*self
        }
    }

    /// Read one line into `line`, replacing its previous contents.
    ///
    /// Blocks on `input` for every byte. Echo output goes to `out`.
    pub fn read_line(
        &self,
        input: &mut dyn ByteSource,
        line: &mut LineBuffer,
        out: &mut dyn Write,
    ) -> IoResult<ReadOutcome> {
        line.clear();

        loop {
            let Some(byte) = input.read_byte()? else {
                return Ok(ReadOutcome::Eof);
            };

            match byte {
                b'\r' | b'\n' => {
                    self.echo_bytes(out, NEWLINE)?;
                    return Ok(if line.is_empty() {
                        ReadOutcome::Empty
                    } else {
                        ReadOutcome::Line
                    });
                }
                b if self.is_cancel(b) => {
                    self.echo_bytes(out, NEWLINE)?;
                    line.clear();
                    return Ok(ReadOutcome::Empty);
                }
                BACKSPACE | DELETE => {
                    if line.backspace() {
                        self.echo_bytes(out, ERASE_SEQUENCE)?;
                    }
                }
                b => {
                    if line.try_push(b) {
                        self.echo_bytes(out, &[b])?;
                    } else {
                        line.clear();
                        if self.overflow == OverflowPolicy::Drain {
                            self.drain(input)?;
                        }
                        self.echo_bytes(out, NEWLINE)?;
                        return Ok(ReadOutcome::Overflow);
                    }
                }
            }
        }
    }

    /// Discard input up to and including the next line terminator.
    fn drain(&self, input: &mut dyn ByteSource) -> IoResult<()> {
        while let Some(byte) = input.read_byte()? {
            if byte == b'\r' || byte == b'\n' || self.is_cancel(byte) {
                break;
            }
        }
        Ok(())
    }

    fn is_cancel(&self, byte: u8) -> bool {
        byte == self.cancel_byte || self.alt_cancel_byte == Some(byte)
    }

    fn echo_bytes(&self, out: &mut dyn Write, bytes: &[u8]) -> IoResult<()> {
        if self.echo {
            out.write_all(bytes)?;
            out.flush()?;
        }
        Ok(())
    }
}
