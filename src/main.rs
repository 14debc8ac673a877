use anyhow::Result;
use argh::FromArgs;
use shell_lock::{AutoLockConfig, Interpreter, LockConfig, OverflowPolicy, ShellConfig};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const PASSWORD_ENV: &str = "SHELL_LOCK_PASSWORD";

#[derive(FromArgs)]
/// Run an interactive command shell on stdin/stdout.
struct Args {
    /// password that unlocks the shell; falls back to $SHELL_LOCK_PASSWORD.
    /// without either, the shell is never locked.
    #[argh(option)]
    password: Option<String>,

    /// wrong attempts allowed before the long cooldown.
    #[argh(option, default = "3")]
    attempts: u32,

    /// lock again after this many idle seconds.
    #[argh(option)]
    auto_lock: Option<u64>,

    /// echo input back, for raw serial links without local echo.
    #[argh(switch)]
    echo: bool,

    /// maximum line length in bytes.
    #[argh(option, default = "shell_lock::config::DEFAULT_LINE_CAPACITY")]
    line_size: usize,

    /// skip the rest of an overlong line instead of reading it as the next one.
    #[argh(switch)]
    drain_overflow: bool,
}

impl Args {
    fn into_config(self) -> ShellConfig {
        let password = self.password.or_else(|| std::env::var(PASSWORD_ENV).ok());
        let auto_lock = self
            .auto_lock
            .map(|secs| AutoLockConfig::new(Duration::from_secs(secs)));

        let lock = password.map(|password| LockConfig {
            attempts_per_batch: self.attempts,
            auto_lock,
            ..LockConfig::new(password)
        });

        ShellConfig {
            echo: self.echo,
            line_capacity: self.line_size,
            overflow: if self.drain_overflow {
                OverflowPolicy::Drain
            } else {
                OverflowPolicy::Abort
            },
            lock,
            ..ShellConfig::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = argh::from_env::<Args>().into_config();
    tracing::debug!(?config, "starting shell");

    let mut sh = Interpreter::new(config, Vec::new());
    sh.run(&mut std::io::stdin().lock(), &mut std::io::stdout().lock())
}
