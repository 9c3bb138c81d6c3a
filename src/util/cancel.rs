//! Cooperative cancellation for long-running backend work.
//!
//! A [`CancelToken`] combines a shared flag (flipped by the caller to abandon
//! a whole resolution attempt) with an optional deadline (set per backend
//! `resolve` call). Backends poll it between steps and while waiting on
//! subprocesses or network transfers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why work was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The caller cancelled the attempt.
    Cancelled,
    /// The per-call deadline passed.
    TimedOut,
}

/// Shared cancellation flag plus optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that is never interrupted unless [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Derive a token that shares this token's flag and additionally expires
    /// after `timeout`. An earlier existing deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        CancelToken {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    /// Cancel every token sharing this flag.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the shared flag was flipped.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Check for interruption. Cancellation wins over an expired deadline.
    pub fn check(&self) -> Option<Interrupt> {
        if self.is_cancelled() {
            return Some(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupt::TimedOut),
            _ => None,
        }
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_propagates_to_derived_tokens() {
        let attempt = CancelToken::new();
        let call = attempt.with_timeout(Duration::from_secs(3600));

        assert_eq!(call.check(), None);
        attempt.cancel();
        assert_eq!(call.check(), Some(Interrupt::Cancelled));
        assert!(call.is_cancelled());
    }

    #[test]
    fn test_deadline_expires() {
        let token = CancelToken::new().with_timeout(Duration::ZERO);
        assert_eq!(token.check(), Some(Interrupt::TimedOut));
        assert_eq!(token.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_derived_deadline_never_extends() {
        let short = CancelToken::new().with_timeout(Duration::ZERO);
        let longer = short.with_timeout(Duration::from_secs(3600));
        assert_eq!(longer.check(), Some(Interrupt::TimedOut));
    }
}
