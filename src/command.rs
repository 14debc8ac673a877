use crate::lexer::Argv;
use anyhow::Result;
use std::io::Write;
use thiserror::Error;
use tracing::{debug, warn};

/// Conventional command exit code.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// The shell reports it but never changes control flow because of it.
pub type ExitCode = i32;

/// Reserved command name that lists every registered command.
pub const HELP_COMMAND: &str = "help";

/// Width of the name column in the help listing.
const HELP_NAME_WIDTH: usize = 20;

/// Signature of a command handler: the parsed arguments (name included) and
/// the shell output.
pub type Handler = Box<dyn Fn(&Argv<'_>, &mut dyn Write) -> Result<ExitCode> + Send + Sync>;

/// A named command with a one-line description. Immutable once built.
pub struct Command {
    name: String,
    description: String,
    handler: Handler,
}

impl Command {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Argv<'_>, &mut dyn Write) -> Result<ExitCode> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            handler: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run the handler to completion.
    pub fn invoke(&self, argv: &Argv<'_>, out: &mut dyn Write) -> Result<ExitCode> {
        (self.handler)(argv, out)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// An ordered list of commands. Lookup scans in declaration order.
#[derive(Debug, Default)]
pub struct CommandTable {
    commands: Vec<Command>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, command: Command) -> Self {
        self.push(command);
        self
    }

    pub fn push(&mut self, command: Command) {
        if command.name == HELP_COMMAND {
            warn!("registering a command named `help` hides the built-in listing");
        }
        self.commands.push(command);
    }

    /// First command named `name`.
    pub fn find(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }
}

/// Errors that stop a line from reaching any handler.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("command not found: {0}")]
    CommandNotFound(String),
    #[error("failed to write help")]
    Io(#[from] std::io::Error),
}

/// What happened to a dispatched line.
#[derive(Debug)]
pub enum Outcome {
    /// Nothing to run.
    Empty,
    /// The handler returned this exit code.
    Completed(ExitCode),
    /// The handler returned an error.
    Failed(anyhow::Error),
    /// No table claimed the name and the help listing was printed.
    Help,
}

/// Find the first command named `name`, scanning tables in order.
///
/// Earlier tables take priority over later ones.
pub fn find_command<'t>(tables: &'t [CommandTable], name: &str) -> Option<&'t Command> {
    tables.iter().find_map(|table| table.find(name))
}

/// Print every command of every table as a two-column listing.
pub fn print_help(tables: &[CommandTable], out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "{:<width$} Description", "Command", width = HELP_NAME_WIDTH)?;
    writeln!(out, "{}", "-".repeat(39))?;
    for command in tables.iter().flat_map(CommandTable::iter) {
        writeln!(
            out,
            "{:<width$} {}",
            command.name,
            command.description,
            width = HELP_NAME_WIDTH
        )?;
    }
    Ok(())
}

/// Resolve `argv[0]` against `tables` and run the match.
pub fn dispatch(
    tables: &[CommandTable],
    argv: &Argv<'_>,
    out: &mut dyn Write,
) -> Result<Outcome, DispatchError> {
    let Some(name) = argv.name() else {
        return Ok(Outcome::Empty);
    };

    if let Some(command) = find_command(tables, name) {
        debug!(command = name, argc = argv.argc(), "dispatching");
        return Ok(match command.invoke(argv, out) {
            Ok(code) => Outcome::Completed(code),
            Err(e) => Outcome::Failed(e),
        });
    }

    if name == HELP_COMMAND {
        print_help(tables, out)?;
        return Ok(Outcome::Help);
    }

    Err(DispatchError::CommandNotFound(name.to_string()))
}
