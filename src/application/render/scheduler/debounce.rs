use std::time::Duration;

use tokio::time::Instant;

/// Debounce state: either nothing is waiting, or the latest text waits for a
/// quiet window to pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { text: String, deadline: Instant },
}

/// Outcome of checking the debouncer at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebouncePoll {
    /// The quiet window elapsed; render this text.
    Fire(String),
    /// Input arrived since the timer was armed; wait until this deadline.
    Wait(Instant),
    Idle,
}

/// Trailing-edge debouncer without a maximum wait.
///
/// Every push replaces the pending text and moves the deadline to
/// `now + quiet_window`, so a steady stream of input keeps it waiting.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet_window: Duration,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(quiet_window: Duration) -> Self {
        Self {
            quiet_window,
            state: DebounceState::Idle,
        }
    }

    pub fn quiet_window(&self) -> Duration {
        self.quiet_window
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, DebounceState::Pending { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DebounceState::Pending { deadline, .. } => Some(*deadline),
            DebounceState::Idle => None,
        }
    }

    /// Store `text` as the latest input. Returns `true` when the debouncer
    /// was idle, i.e. a timer has to be armed for the returned deadline.
    pub fn push(&mut self, text: String, now: Instant) -> bool {
        let was_idle = !self.is_pending();
        self.state = DebounceState::Pending {
            text,
            deadline: now + self.quiet_window,
        };
        was_idle
    }

    pub fn poll(&mut self, now: Instant) -> DebouncePoll {
        if let Some(deadline) = self.deadline()
            && deadline > now
        {
            return DebouncePoll::Wait(deadline);
        }

        match self.cancel() {
            Some(text) => DebouncePoll::Fire(text),
            None => DebouncePoll::Idle,
        }
    }

    /// Drop the pending text, if any.
    pub fn cancel(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, DebounceState::Idle) {
            DebounceState::Pending { text, .. } => Some(text),
            DebounceState::Idle => None,
        }
    }
}
