use crate::command::{Command, CommandTable, ExitCode};
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::io::Write;
use std::time::Instant;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and turned into
/// regular [`Command`] descriptors by [`command`].
pub trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo".
    fn name() -> &'static str;

    /// One-line description shown by `help`.
    fn description() -> &'static str;

    /// Executes the command, writing to the shell output.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, out: &mut dyn Write) -> Result<ExitCode>;
}

/// Wrap a builtin into a command descriptor.
///
/// Argument errors and `--help` print argh's message and return 1 or 0
/// instead of failing.
pub fn command<T: BuiltinCommand + 'static>() -> Command {
    Command::new(T::name(), T::description(), |argv, out| {
        match T::from_args(&[T::name()], argv.params()) {
            Ok(cmd) => cmd.execute(out),
            Err(EarlyExit { output, status }) => {
                writeln!(out, "{}", output.trim_end())?;
                Ok(if status.is_err() { 1 } else { 0 })
            }
        }
    })
}

#[derive(FromArgs)]
/// write the arguments to the output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn description() -> &'static str {
        "print the arguments"
    }

    fn execute(self, out: &mut dyn Write) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(out, "{}", s)?;
        } else {
            writeln!(out, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print how long the shell has been running.
pub struct Uptime {
    #[argh(switch, short = 's')]
    /// print whole seconds only.
    pub seconds: bool,
}

fn started_at() -> Instant {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    *START.get_or_init(Instant::now)
}

impl BuiltinCommand for Uptime {
    fn name() -> &'static str {
        "uptime"
    }

    fn description() -> &'static str {
        "time since the shell started"
    }

    fn execute(self, out: &mut dyn Write) -> Result<ExitCode> {
        let elapsed = started_at().elapsed();
        if self.seconds {
            writeln!(out, "{}", elapsed.as_secs())?;
        } else {
            writeln!(out, "up {:.3}s", elapsed.as_secs_f64())?;
        }
        Ok(0)
    }
}

/// Table of the global builtins, consulted after every other table.
pub fn builtins() -> CommandTable {
    started_at();
    CommandTable::new()
        .with(command::<Echo>())
        .with(command::<Uptime>())
}
