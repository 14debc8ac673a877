use std::time::Duration;

/// ASCII "End-of-Text", sent by most terminals for ctrl-C.
pub const ETX: u8 = 0x03;

/// ASCII "End-of-Transmission", ctrl-D. Also abandons a password attempt.
pub const EOT: u8 = 0x04;

/// Default capacity of the line buffer, in bytes.
pub const DEFAULT_LINE_CAPACITY: usize = 128;

/// What the line reader does with the rest of a line that no longer fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Report the overflow immediately. Bytes after the overflow point are
    /// left in the stream and become the start of the next line.
    #[default]
    Abort,
    /// Keep consuming (without storing or echoing) up to the next line
    /// terminator, then report the overflow.
    Drain,
}

/// Settings for a single shell session.
///
/// Fields are public so callers can tweak individual values on top of
/// [`ShellConfig::default`].
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Printed before every line read.
    pub prompt: String,
    /// Write accepted bytes and erase sequences back to the output.
    pub echo: bool,
    /// Maximum number of bytes a single line may hold.
    pub line_capacity: usize,
    /// Byte that abandons the current line.
    pub cancel_byte: u8,
    pub overflow: OverflowPolicy,
    /// Password gate. `None` means the shell is permanently unlocked.
    pub lock: Option<LockConfig>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "> ".to_string(),
            echo: true,
            line_capacity: DEFAULT_LINE_CAPACITY,
            cancel_byte: ETX,
            overflow: OverflowPolicy::Abort,
            lock: None,
        }
    }
}

/// Password gate settings.
///
/// Wrong attempts are grouped in batches of `attempts_per_batch`. Every
/// wrong attempt waits `wrong_attempt_delay`; an exhausted batch additionally
/// waits `batch_cooldown`. Batches repeat forever, there is no lockout.
#[derive(Clone)]
pub struct LockConfig {
    pub password: String,
    pub attempts_per_batch: u32,
    pub wrong_attempt_delay: Duration,
    pub batch_cooldown: Duration,
    /// Idle relock. `None` disables it.
    pub auto_lock: Option<AutoLockConfig>,
}

impl LockConfig {
    /// Lock settings with the default cooldowns and no auto-lock.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            attempts_per_batch: 3,
            wrong_attempt_delay: Duration::from_secs(1),
            batch_cooldown: Duration::from_secs(7),
            auto_lock: None,
        }
    }

    pub fn with_auto_lock(mut self, auto_lock: AutoLockConfig) -> Self {
        self.auto_lock = Some(auto_lock);
        self
    }
}

// Hand-written so the secret never ends up in logs.
impl std::fmt::Debug for LockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockConfig")
            .field("password", &"<redacted>")
            .field("attempts_per_batch", &self.attempts_per_batch)
            .field("wrong_attempt_delay", &self.wrong_attempt_delay)
            .field("batch_cooldown", &self.batch_cooldown)
            .field("auto_lock", &self.auto_lock)
            .finish()
    }
}

/// Idle relock settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoLockConfig {
    /// Inactivity after which the shell locks itself.
    pub idle_window: Duration,
    /// Upper bound on how long the checker sleeps between looks at the clock.
    pub max_poll_interval: Duration,
}

impl AutoLockConfig {
    pub fn new(idle_window: Duration) -> Self {
        Self {
            idle_window,
            max_poll_interval: idle_window.min(Duration::from_secs(300)),
        }
    }
}

impl Default for AutoLockConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
