//! A small line-oriented command shell for resource-constrained devices.
//!
//! Bytes from any blocking source are assembled into lines, split into
//! arguments (with quoting and backslash escapes) and dispatched to the first
//! matching command of an ordered list of command tables. Optionally the whole
//! shell sits behind a password, with an idle timer that locks it again.
//!
//! The main entry point is [`Interpreter`]. The public modules [`command`],
//! [`config`] and [`lock`] expose the types for registering your own commands,
//! configuring a session and locking it from outside the shell loop. The
//! transport is up to the caller: anything implementing [`std::io::Read`]
//! works as input, anything implementing [`std::io::Write`] as output.

pub mod builtin;
pub mod command;
pub mod config;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod line_buffer;
pub mod line_reader;
pub mod lock;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;

pub use command::{Command, CommandTable, ExitCode};
pub use config::{AutoLockConfig, LockConfig, OverflowPolicy, ShellConfig};
pub use io_adapters::{ByteSource, MemReader, MemWriter};
pub use lexer::{Argv, LexingError, split_into_args};
pub use lock::{LockPhase, LockState};
