use crate::builtin::builtins;
use crate::command::{CommandTable, DispatchError, Outcome, dispatch};
use crate::config::ShellConfig;
use crate::io_adapters::ByteSource;
use crate::lexer::split_into_args;
use crate::line_buffer::LineBuffer;
use crate::line_reader::{LineReader, ReadOutcome};
use crate::lock::{LockGuard, LockState, LoginOutcome};
use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

const LOCKED_NOTICE: &str = "The shell is locked. Enter a valid password to unlock.";
const UNLOCKED_NOTICE: &str = "Shell was unlocked.";
const NO_AUTO_LOCK_REMINDER: &str =
    "IMPORTANT: Don't forget to lock the shell after usage, because it won't lock itself.";

/// A line-oriented command interpreter over an abstract byte stream.
///
/// Each line is read, split into arguments and dispatched to the first
/// matching command of the configured tables. When a [`LockConfig`] is set,
/// nothing is dispatched until the password has been entered.
///
/// Table order, highest priority first: the caller's tables, the `lock`
/// command (only with a lock configured), then the global builtins.
///
/// Example
/// ```
/// use shell_lock::{Interpreter, MemReader, ShellConfig};
/// let config = ShellConfig { echo: false, ..ShellConfig::default() };
/// let mut sh = Interpreter::new(config, Vec::new());
/// let mut out = Vec::<u8>::new();
/// sh.run(&mut MemReader::new("echo hello world\n"), &mut out).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap(), "> hello world\n> ");
/// ```
///
/// [`LockConfig`]: crate::config::LockConfig
pub struct Interpreter {
    config: ShellConfig,
    tables: Vec<CommandTable>,
    reader: LineReader,
    line: LineBuffer,
    lock: Option<LockGuard>,
}

impl Interpreter {
    /// Create a new interpreter with the caller's command tables, in priority order.
    pub fn new(config: ShellConfig, commands: Vec<CommandTable>) -> Self {
        let lock = config.lock.clone().map(LockGuard::new);

        let mut tables = commands;
        if let Some(guard) = &lock {
            tables.push(guard.command_table());
        }
        tables.push(builtins());

        Self {
            reader: LineReader::from_config(&config),
            line: LineBuffer::with_capacity(config.line_capacity),
            config,
            tables,
            lock,
        }
    }

    /// Shared lock state, if the lock feature is configured.
    ///
    /// Calling [`LockState::lock`] on it from anywhere makes the shell ask
    /// for the password again before the next command.
    pub fn lock_state(&self) -> Option<Arc<LockState>> {
        self.lock.as_ref().map(LockGuard::state)
    }

    pub fn is_locked(&self) -> bool {
        self.lock.as_ref().is_some_and(LockGuard::is_locked)
    }

    pub fn tables(&self) -> &[CommandTable] {
        &self.tables
    }

    /// Run the read-tokenize-dispatch loop until `input` ends.
    ///
    /// Handlers run to completion on this thread and write to `out`.
    pub fn run(&mut self, input: &mut dyn ByteSource, out: &mut dyn Write) -> Result<()> {
        loop {
            if self.is_locked() && !self.unlock(input, out)? {
                debug!("input ended while locked");
                return Ok(());
            }

            self.print_prompt(out)?;
            let outcome = self
                .reader
                .read_line(input, &mut self.line, out)
                .context("failed to read input")?;

            if outcome == ReadOutcome::Eof {
                debug!("end of input");
                return Ok(());
            }

            // Locked while we were waiting for this line: drop it.
            if self.is_locked() {
                self.line.wipe();
                continue;
            }
            if let Some(guard) = &self.lock {
                guard.record_activity();
            }

            match outcome {
                ReadOutcome::Line => self.handle_line(out)?,
                ReadOutcome::Overflow => {
                    warn!(capacity = self.line.capacity(), "input line too long, discarded");
                    writeln!(out, "shell: maximum line length exceeded")?;
                }
                ReadOutcome::Empty | ReadOutcome::Eof => {}
            }
        }
    }

    /// Run the login barrier. Returns `false` if input ended first.
    fn unlock(&mut self, input: &mut dyn ByteSource, out: &mut dyn Write) -> Result<bool> {
        let Some(guard) = self.lock.as_mut() else {
            return Ok(true);
        };

        writeln!(out, "{}\n", LOCKED_NOTICE)?;
        let outcome = guard
            .login_barrier(input, &self.reader, out)
            .context("failed to read password")?;
        if outcome == LoginOutcome::Eof {
            return Ok(false);
        }

        if guard.auto_lock_enabled() {
            writeln!(out, "{}\n", UNLOCKED_NOTICE)?;
        } else {
            writeln!(out, "{}\n\n{}\n", UNLOCKED_NOTICE, NO_AUTO_LOCK_REMINDER)?;
        }
        Ok(true)
    }

    fn handle_line(&mut self, out: &mut dyn Write) -> Result<()> {
        let argv = match split_into_args(self.line.as_mut_bytes()) {
            Ok(argv) => argv,
            Err(e) if e.is_quoting() => {
                debug!(error = %e, "line rejected");
                writeln!(out, "shell: incorrect quoting")?;
                return Ok(());
            }
            Err(e) => {
                writeln!(out, "shell: {}", e)?;
                return Ok(());
            }
        };
        let name = argv.name().unwrap_or_default();

        match dispatch(&self.tables, &argv, out) {
            Ok(Outcome::Completed(0) | Outcome::Empty | Outcome::Help) => {}
            Ok(Outcome::Completed(code)) => {
                debug!(command = name, code, "command exited with non-zero status");
            }
            Ok(Outcome::Failed(e)) => {
                warn!(command = name, error = %e, "command failed");
                writeln!(out, "shell: {}: {:#}", name, e)?;
            }
            Err(DispatchError::CommandNotFound(name)) => {
                writeln!(out, "shell: command not found: {}", name)?;
            }
            Err(e) => return Err(e.into()),
        }
        out.flush()?;
        Ok(())
    }

    fn print_prompt(&self, out: &mut dyn Write) -> Result<()> {
        out.write_all(self.config.prompt.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

impl Default for Interpreter {
    /// An unlocked interpreter with only the global builtins.
    fn default() -> Self {
        Self::new(ShellConfig::default(), Vec::new())
    }
}
