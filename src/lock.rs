//! Password gate and idle relock.
//!
//! [`LockState`] is the only state shared between the shell loop and the
//! auto-lock checker thread. Both sides go through its mutex; the condvar
//! wakes the checker early when the shell locks, re-arms or shuts down.

use crate::command::{Command, CommandTable};
use crate::config::{DEFAULT_LINE_CAPACITY, LockConfig};
use crate::io_adapters::ByteSource;
use crate::line_buffer::LineBuffer;
use crate::line_reader::{LineReader, ReadOutcome};
use std::io::{Result as IoResult, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

/// Added to the remaining idle time so the checker wakes just past the deadline.
const WAKE_OFFSET: Duration = Duration::from_millis(50);

pub const LOCK_COMMAND: &str = "lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPhase {
    Unlocked,
    Locked,
}

#[derive(Debug)]
struct LockInner {
    phase: LockPhase,
    deadline: Option<Instant>,
    /// Bumped on every unlock; a checker from an older unlock exits.
    generation: u64,
    shutdown: bool,
}

/// Lock phase and auto-lock deadline of one shell session.
#[derive(Debug)]
pub struct LockState {
    inner: Mutex<LockInner>,
    changed: Condvar,
}

impl LockState {
    fn new(phase: LockPhase) -> Self {
        Self {
            inner: Mutex::new(LockInner {
                phase,
                deadline: None,
                generation: 0,
                shutdown: false,
            }),
            changed: Condvar::new(),
        }
    }

    // The guarded data stays consistent even if a holder panicked.
    fn inner(&self) -> MutexGuard<'_, LockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> LockPhase {
        self.inner().phase
    }

    pub fn is_locked(&self) -> bool {
        self.phase() == LockPhase::Locked
    }

    /// Lock the shell. The loop notices before its next prompt.
    pub fn lock(&self) {
        let mut inner = self.inner();
        if inner.phase != LockPhase::Locked {
            info!("shell locked");
        }
        inner.phase = LockPhase::Locked;
        inner.deadline = None;
        drop(inner);
        self.changed.notify_all();
    }

    /// Current auto-lock deadline, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner().deadline
    }

    /// Push the deadline to `now + window`. Ignored while locked.
    ///
    /// A window too large to represent leaves no deadline, so the shell
    /// never locks itself.
    pub fn refresh_deadline(&self, window: Duration) {
        let mut inner = self.inner();
        if inner.phase == LockPhase::Unlocked {
            inner.deadline = deadline_after(window);
        }
    }

    /// Enter the unlocked phase and start a new generation.
    fn unlock(&self, idle_window: Option<Duration>) -> u64 {
        let mut inner = self.inner();
        inner.phase = LockPhase::Unlocked;
        inner.generation += 1;
        inner.deadline = idle_window.and_then(deadline_after);
        let generation = inner.generation;
        drop(inner);
        self.changed.notify_all();
        generation
    }

    fn shutdown(&self) {
        self.inner().shutdown = true;
        self.changed.notify_all();
    }
}

fn deadline_after(window: Duration) -> Option<Instant> {
    Instant::now().checked_add(window)
}

/// How long the checker sleeps given the time left until the deadline.
pub fn poll_interval(remaining: Duration, max_poll: Duration) -> Duration {
    remaining.saturating_add(WAKE_OFFSET).min(max_poll)
}

fn run_auto_lock(state: Arc<LockState>, generation: u64, max_poll: Duration) {
    let mut inner = state.inner();
    loop {
        if inner.shutdown || inner.generation != generation || inner.phase == LockPhase::Locked {
            debug!(generation, "auto-lock checker stopped");
            return;
        }

        let now = Instant::now();
        let wait = match inner.deadline {
            Some(deadline) if now >= deadline => {
                inner.phase = LockPhase::Locked;
                inner.deadline = None;
                info!("idle timeout reached, shell locked");
                return;
            }
            Some(deadline) => poll_interval(deadline - now, max_poll),
            None => max_poll,
        };

        inner = state
            .changed
            .wait_timeout(inner, wait)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
}

/// Result of the login barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Unlocked,
    /// Input ended before a correct password arrived.
    Eof,
}

/// The lock feature of a shell session: state, login barrier and the
/// auto-lock checker.
pub struct LockGuard {
    config: LockConfig,
    state: Arc<LockState>,
    /// Password attempts go here, never into the command line buffer.
    attempt: LineBuffer,
    timer: Option<JoinHandle<()>>,
}

impl LockGuard {
    /// A guard that starts out locked.
    ///
    /// Attempts are read into a buffer of their own, large enough for the
    /// configured password whatever the shell's line capacity is.
    pub fn new(config: LockConfig) -> Self {
        let capacity = config.password.len().max(DEFAULT_LINE_CAPACITY);
        Self {
            config,
            state: Arc::new(LockState::new(LockPhase::Locked)),
            attempt: LineBuffer::with_capacity(capacity),
            timer: None,
        }
    }

    /// Shared handle to the lock state.
    pub fn state(&self) -> Arc<LockState> {
        self.state.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }

    pub fn auto_lock_enabled(&self) -> bool {
        self.config.auto_lock.is_some()
    }

    /// Table holding the `lock` command.
    pub fn command_table(&self) -> CommandTable {
        let state = self.state.clone();
        CommandTable::new().with(Command::new(LOCK_COMMAND, "lock the shell", move |_argv, _out| {
            state.lock();
            Ok(0)
        }))
    }

    /// Note accepted input while unlocked, pushing the auto-lock deadline back.
    pub fn record_activity(&self) {
        if let Some(auto_lock) = self.config.auto_lock {
            self.state.refresh_deadline(auto_lock.idle_window);
        }
    }

    /// Prompt for the password until it is entered correctly.
    ///
    /// Wrong attempts are answered after `wrong_attempt_delay`; every
    /// `attempts_per_batch` wrong attempts add `batch_cooldown`. There is no
    /// permanent lockout. On success the shell is unlocked and, if enabled,
    /// the auto-lock checker is armed.
    pub fn login_barrier(
        &mut self,
        input: &mut dyn ByteSource,
        reader: &LineReader,
        out: &mut dyn Write,
    ) -> IoResult<LoginOutcome> {
        let secret = reader.secret();
        let batch = self.config.attempts_per_batch.max(1);

        loop {
            for attempt in 1..=batch {
                out.write_all(b"Password: ")?;
                out.flush()?;

                let outcome = secret.read_line(input, &mut self.attempt, out)?;
                if outcome == ReadOutcome::Eof {
                    self.attempt.wipe();
                    return Ok(LoginOutcome::Eof);
                }

                let accepted = matches!(outcome, ReadOutcome::Line | ReadOutcome::Empty)
                    && self.matches(self.attempt.as_bytes());
                self.attempt.wipe();
                writeln!(out)?;

                if accepted {
                    self.unlock()?;
                    return Ok(LoginOutcome::Unlocked);
                }

                writeln!(out, "Wrong password")?;
                out.flush()?;
                warn!(attempt, batch, "wrong password");
                thread::sleep(self.config.wrong_attempt_delay);
            }

            info!(
                cooldown_ms = self.config.batch_cooldown.as_millis() as u64,
                "too many wrong passwords, cooling down"
            );
            thread::sleep(self.config.batch_cooldown);
        }
    }

    fn matches(&self, candidate: &[u8]) -> bool {
        self.config.password.as_bytes().ct_eq(candidate).into()
    }

    fn unlock(&mut self) -> IoResult<()> {
        let auto_lock = self.config.auto_lock;
        let generation = self.state.unlock(auto_lock.map(|a| a.idle_window));
        info!(auto_lock = auto_lock.is_some(), "shell unlocked");

        // The generation bump above tells a previous checker to exit.
        self.join_timer();

        if let Some(auto_lock) = auto_lock {
            let state = self.state.clone();
            let max_poll = auto_lock.max_poll_interval;
            let handle = thread::Builder::new()
                .name("shell-auto-lock".to_string())
                .spawn(move || run_auto_lock(state, generation, max_poll))?;
            debug!(generation, idle_ms = auto_lock.idle_window.as_millis() as u64, "auto-lock armed");
            self.timer = Some(handle);
        }
        Ok(())
    }

    fn join_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            if handle.join().is_err() {
                warn!("auto-lock checker panicked");
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.state.shutdown();
        self.join_timer();
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("config", &self.config)
            .field("phase", &self.state.phase())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AutoLockConfig, ETX, OverflowPolicy};
    use crate::lexer::Argv;

    fn quick_config(password: &str) -> LockConfig {
        LockConfig {
            wrong_attempt_delay: Duration::ZERO,
            batch_cooldown: Duration::ZERO,
            ..LockConfig::new(password)
        }
    }

    fn login(guard: &mut LockGuard, input: &[u8]) -> (LoginOutcome, String) {
        let mut input = input;
        let mut out = Vec::<u8>::new();
        let reader = LineReader::new(true, ETX, OverflowPolicy::Abort);
        let outcome = guard.login_barrier(&mut input, &reader, &mut out).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_starts_locked() {
        let guard = LockGuard::new(quick_config("secret"));
        assert!(guard.is_locked());
        assert_eq!(guard.state().deadline(), None);
    }

    #[test]
    fn test_correct_password_unlocks() {
        let mut guard = LockGuard::new(quick_config("secret"));
        let (outcome, out) = login(&mut guard, b"secret\n");
        assert_eq!(outcome, LoginOutcome::Unlocked);
        assert!(!guard.is_locked());
        assert_eq!(out, "Password: \n");
    }

    #[test]
    fn test_never_locked_out_permanently() {
        let mut guard = LockGuard::new(quick_config("secret"));
        let input = b"a\nb\nc\nd\ne\nf\ng\nsecret\n";
        let (outcome, out) = login(&mut guard, input);
        assert_eq!(outcome, LoginOutcome::Unlocked);
        assert_eq!(out.matches("Wrong password").count(), 7);
        assert_eq!(out.matches("Password: ").count(), 8);
    }

    #[test]
    fn test_password_is_not_echoed() {
        let mut guard = LockGuard::new(quick_config("secret"));
        let (_, out) = login(&mut guard, b"oops\nsecret\n");
        assert!(!out.contains("oops"));
        assert!(!out.contains("secret"));
    }

    #[test]
    fn test_prefix_and_cancelled_attempts_are_wrong() {
        let mut guard = LockGuard::new(quick_config("secret"));
        let (outcome, out) = login(&mut guard, b"secre\nsecret\x03\nsecret\n");
        assert_eq!(outcome, LoginOutcome::Unlocked);
        assert_eq!(out.matches("Wrong password").count(), 3);
    }

    #[test]
    fn test_overlong_attempt_is_drained() {
        let mut guard = LockGuard::new(quick_config("secret"));
        // The tail of the long attempt must not be taken as the next one.
        let input = [vec![b'x'; 500], b"secret\nsecret\n".to_vec()].concat();
        let (outcome, out) = login(&mut guard, &input);
        assert_eq!(outcome, LoginOutcome::Unlocked);
        assert_eq!(out.matches("Wrong password").count(), 1);
    }

    #[test]
    fn test_eof_ends_barrier() {
        let mut guard = LockGuard::new(quick_config("secret"));
        let (outcome, out) = login(&mut guard, b"nope\n");
        assert_eq!(outcome, LoginOutcome::Eof);
        assert!(guard.is_locked());
        assert!(out.ends_with("Wrong password\nPassword: "));
    }

    #[test]
    fn test_long_password_fits() {
        let password = "p".repeat(300);
        let mut guard = LockGuard::new(quick_config(&password));
        let (outcome, out) = login(&mut guard, format!("{}\n", password).as_bytes());
        assert_eq!(outcome, LoginOutcome::Unlocked);
        assert!(!out.contains("Wrong password"));
    }

    #[test]
    fn test_empty_password_accepts_empty_line() {
        let mut guard = LockGuard::new(quick_config(""));
        let (outcome, out) = login(&mut guard, b"x\n\n");
        assert_eq!(outcome, LoginOutcome::Unlocked);
        assert_eq!(out.matches("Wrong password").count(), 1);
    }

    #[test]
    fn test_ctrl_d_abandons_attempt() {
        let mut guard = LockGuard::new(quick_config("secret"));
        let (outcome, out) = login(&mut guard, b"secr\x04secret\n");
        assert_eq!(outcome, LoginOutcome::Unlocked);
        assert_eq!(out.matches("Wrong password").count(), 1);
    }

    #[test]
    fn test_huge_idle_window_never_locks() {
        let config = quick_config("secret").with_auto_lock(AutoLockConfig::new(Duration::MAX));
        let mut guard = LockGuard::new(config);
        login(&mut guard, b"secret\n");
        assert!(!guard.is_locked());
        assert_eq!(guard.state().deadline(), None);

        guard.record_activity();
        assert_eq!(guard.state().deadline(), None);
        assert!(!guard.is_locked());
    }

    #[test]
    fn test_lock_command_locks() {
        let mut guard = LockGuard::new(quick_config("secret"));
        login(&mut guard, b"secret\n");
        let table = guard.command_table();
        let lock = table.find(LOCK_COMMAND).unwrap();
        lock.invoke(&Argv::from(vec!["lock"]), &mut Vec::<u8>::new()).unwrap();
        assert!(guard.is_locked());
    }

    #[test]
    fn test_poll_interval_is_capped() {
        let max = Duration::from_secs(300);
        assert_eq!(poll_interval(Duration::from_secs(1), max), Duration::from_millis(1050));
        assert_eq!(poll_interval(Duration::from_secs(600), max), max);
        assert_eq!(poll_interval(Duration::ZERO, max), WAKE_OFFSET);
        assert_eq!(poll_interval(Duration::MAX, max), max);
    }

    #[test]
    fn test_auto_lock_fires_after_idle_window() {
        let config = quick_config("secret").with_auto_lock(AutoLockConfig::new(Duration::from_millis(60)));
        let mut guard = LockGuard::new(config);
        login(&mut guard, b"secret\n");
        assert!(!guard.is_locked());
        assert!(guard.state().deadline().is_some());

        thread::sleep(Duration::from_millis(400));
        assert!(guard.is_locked());
        assert_eq!(guard.state().deadline(), None);
    }

    #[test]
    fn test_activity_postpones_auto_lock() {
        let config = quick_config("secret").with_auto_lock(AutoLockConfig::new(Duration::from_millis(300)));
        let mut guard = LockGuard::new(config);
        login(&mut guard, b"secret\n");

        for _ in 0..8 {
            thread::sleep(Duration::from_millis(50));
            guard.record_activity();
        }
        // 400ms have passed, more than one idle window.
        assert!(!guard.is_locked());

        thread::sleep(Duration::from_millis(800));
        assert!(guard.is_locked());
    }

    #[test]
    fn test_manual_lock_stops_checker() {
        let config = quick_config("secret").with_auto_lock(AutoLockConfig::new(Duration::from_secs(60)));
        let mut guard = LockGuard::new(config);
        login(&mut guard, b"secret\n");

        guard.state().lock();
        thread::sleep(Duration::from_millis(200));
        assert!(guard.timer.as_ref().is_some_and(|h| h.is_finished()));
    }

    #[test]
    fn test_relogin_replaces_checker() {
        let config = quick_config("secret").with_auto_lock(AutoLockConfig::new(Duration::from_secs(60)));
        let mut guard = LockGuard::new(config);
        login(&mut guard, b"secret\n");
        guard.state().lock();
        login(&mut guard, b"secret\n");

        assert!(!guard.is_locked());
        assert!(guard.timer.as_ref().is_some_and(|h| !h.is_finished()));
        drop(guard);
    }
}
