//! Submission bookkeeping: the in-flight guard and the delayed redirect.

use crate::errors::{Error, Result};
use crate::page::{Effect, EffectSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Allows at most one submission of a kind to run at a time.
#[derive(Debug, Clone)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
    operation: &'static str,
}

impl InFlight {
    pub fn new(operation: &'static str) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            operation,
        }
    }

    /// Claim the slot, or fail with [`Error::Busy`] if a submission is already running.
    pub fn try_begin(&self) -> Result<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy {
                operation: self.operation,
            })?;
        Ok(InFlightGuard {
            busy: self.busy.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the in-flight slot when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOutcome {
    Navigated,
    Cancelled,
}

/// Navigation scheduled to happen after a fixed delay.
///
/// The deadline is fixed when the redirect is created, not when it is first awaited.
#[derive(Debug)]
pub struct PendingRedirect {
    target: String,
    deadline: Instant,
    token: CancellationToken,
}

impl PendingRedirect {
    pub fn new(target: &str, delay: Duration) -> Self {
        Self {
            target: target.to_string(),
            deadline: Instant::now() + delay,
            token: CancellationToken::new(),
        }
    }

    /// Tie the redirect to `parent`: cancelling the parent also cancels the redirect.
    pub fn cancelled_by(mut self, parent: &CancellationToken) -> Self {
        self.token = parent.child_token();
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Token that aborts the redirect when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the deadline and navigate, unless cancelled first.
    #[tracing::instrument(skip(self, sink), fields(target = %self.target))]
    pub async fn run(self, sink: &dyn EffectSink) -> RedirectOutcome {
        tokio::select! {
            _ = self.token.cancelled() => {
                tracing::info!("Redirect cancelled");
                RedirectOutcome::Cancelled
            }
            _ = tokio::time::sleep_until(self.deadline) => {
                tracing::info!("Redirecting");
                sink.apply(Effect::Navigate(self.target));
                RedirectOutcome::Navigated
            }
        }
    }
}
