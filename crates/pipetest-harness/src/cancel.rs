//! Cooperative cancellation for synchronous engine round-trips.
//!
//! The tester is single-threaded and all engine calls are blocking, so
//! cancellation is cooperative: the token is checked before every round-trip
//! and inside the deferred-cleanup sleep. A tripped token surfaces as an
//! error result, never a panic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pipetest_error::{PipetestError, Result};

/// Granularity of the cancellable sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

/// Shared cancellation flag with an optional deadline.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// A token that never fires unless [`CancelToken::cancel`] is called.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
            }),
        }
    }

    /// A token that also fires once `deadline` passes.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Some(deadline),
            }),
        }
    }

    /// Trip the token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Return an error naming `operation` if the token has fired.
    pub fn checkpoint(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(PipetestError::Cancelled {
                operation: operation.to_owned(),
            })
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early with an error if cancelled.
    pub fn sleep(&self, duration: Duration, operation: &str) -> Result<()> {
        let until = Instant::now() + duration;
        loop {
            self.checkpoint(operation)?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            std::thread::sleep(SLEEP_SLICE.min(until - now));
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
