//! Bounded polling
//!
//! [`wait_until`] invokes a predicate once per tick until it reports done,
//! the attempts run out, or the root cancellation token fires. Predicate
//! errors other than cancellation are logged and retried on the next tick.

use rtctl_core::PollSettings;
use std::future::Future;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Result of a single predicate invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    Pending,
}

/// Poll `predicate` every `settings.interval`, at most `settings.max_attempts` times.
///
/// The first invocation happens one interval after the call. Returns
/// [`Error::Timeout`] after exactly `max_attempts` unsuccessful ticks and
/// [`Error::Cancelled`] as soon as `cancel` fires, including while the
/// predicate is in flight. A budget that cannot tick is rejected before the
/// first invocation.
pub async fn wait_until<T, F, Fut>(
    what: &str,
    settings: PollSettings,
    cancel: &CancellationToken,
    mut predicate: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    settings.check(what)?;

    let mut ticker = tokio::time::interval_at(Instant::now() + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for attempt in 1..=settings.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = predicate() => outcome,
        };

        match outcome {
            Ok(Attempt::Done(value)) => {
                tracing::debug!(what, attempt, "poll succeeded");
                return Ok(value);
            }
            Ok(Attempt::Pending) => {
                tracing::debug!(what, attempt, max = settings.max_attempts, "still waiting");
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::debug!(what, attempt, error = %e, "poll attempt failed, retrying");
            }
        }
    }

    Err(Error::Timeout {
        what: what.to_string(),
        attempts: settings.max_attempts,
    })
}
