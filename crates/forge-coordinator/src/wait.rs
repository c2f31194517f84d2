//! Deadline-bounded waiting on eventually-consistent remote conditions.
//!
//! A [`TimeoutWatcher`] is created once per lifecycle operation. Every wait
//! inside that operation (cluster lookup, readiness, deletion, job
//! completion) is bounded by its deadline and shares one cancellation and
//! timeout contract.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use forge_common::defaults::POLL_INTERVAL;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::LifecycleError;

/// A deadline computed once, consumed by every wait entered under it.
#[derive(Debug, Clone)]
pub struct TimeoutWatcher {
    deadline: Instant,
    budget: Duration,
    poll_interval: Duration,
}

impl TimeoutWatcher {
    /// Start a watcher whose deadline is `budget` from now
    pub fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
            budget,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the interval between polls
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Total budget this watcher was created with
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Has the deadline elapsed
    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left before the deadline (zero once elapsed)
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// A watcher that ends at `limit` from now or at this watcher's deadline,
    /// whichever comes first.
    pub fn bounded(&self, limit: Duration) -> Self {
        let deadline = self.deadline.min(Instant::now() + limit);
        Self {
            deadline,
            budget: limit.min(self.budget),
            poll_interval: self.poll_interval,
        }
    }

    fn timeout_error(&self, what: &str) -> LifecycleError {
        LifecycleError::Timeout {
            what: what.to_string(),
            budget: self.budget,
        }
    }

    /// Poll `check` until it reports `true`, the deadline passes, or `cancel` fires.
    ///
    /// # Returns
    /// * `Ok(())` - Condition satisfied
    /// * `Err(Timeout)` - Deadline elapsed first
    /// * `Err(Cancelled)` - Token cancelled
    /// * `Err(Remote)` - `check` itself failed
    pub async fn wait_for<F, Fut>(
        &self,
        what: &str,
        cancel: Option<&CancellationToken>,
        check: F,
    ) -> Result<(), LifecycleError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        self.wait_for_value(what, cancel, || {
            let fut = check();
            async move { fut.await.map(|ready| ready.then_some(())) }
        })
        .await
    }

    /// Poll `check` until it yields a value.
    ///
    /// Same contract as [`wait_for`](Self::wait_for); used where the wait
    /// produces something, such as looking up a cluster object by name.
    pub async fn wait_for_value<T, F, Fut>(
        &self,
        what: &str,
        cancel: Option<&CancellationToken>,
        check: F,
    ) -> Result<T, LifecycleError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        let mut attempts = 0u32;
        let mut delays = ConstantBuilder::default()
            .with_delay(self.poll_interval)
            .build();

        loop {
            attempts += 1;

            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(LifecycleError::Cancelled {
                    what: what.to_string(),
                });
            }

            if self.is_elapsed() {
                warn!(what = %what, attempts, budget = ?self.budget, "Deadline elapsed");
                return Err(self.timeout_error(what));
            }

            match check().await {
                Ok(Some(value)) => {
                    debug!(what = %what, attempts, "Condition satisfied");
                    return Ok(value);
                }
                Ok(None) => {
                    let delay = delays
                        .next()
                        .unwrap_or(self.poll_interval)
                        .min(self.remaining());
                    debug!(
                        what = %what,
                        attempt = attempts,
                        delay_ms = delay.as_millis(),
                        "Condition not met, retrying"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancelled(cancel) => {
                            return Err(LifecycleError::Cancelled { what: what.to_string() });
                        }
                    }
                }
                Err(e) => {
                    warn!(what = %what, error = ?e, "Condition check failed");
                    return Err(LifecycleError::remote(what, self.budget, e));
                }
            }
        }
    }

    /// Bound a single blocking remote wait by the time left on this watcher.
    pub async fn run<T, Fut>(
        &self,
        what: &str,
        cancel: Option<&CancellationToken>,
        fut: Fut,
    ) -> Result<T, LifecycleError>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if self.is_elapsed() {
            return Err(self.timeout_error(what));
        }

        tokio::select! {
            result = tokio::time::timeout(self.remaining(), fut) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(LifecycleError::remote(what, self.budget, e)),
                Err(_) => {
                    warn!(what = %what, budget = ?self.budget, "Deadline elapsed");
                    Err(self.timeout_error(what))
                }
            },
            _ = cancelled(cancel) => Err(LifecycleError::Cancelled { what: what.to_string() }),
        }
    }
}

/// Resolves when `cancel` fires; never resolves without a token.
async fn cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}
