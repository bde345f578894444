//! Bounded polling with a fixed delay

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::TriageError;

/// Attempt budget for a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(10),
        }
    }
}

/// Call `check` until it reports `true`, sleeping `policy.delay` between
/// attempts. Returns the attempt that succeeded, or
/// [`TriageError::WaitTimedOut`] once the budget is spent.
pub async fn poll_until<F, Fut>(policy: PollPolicy, what: &str, mut check: F) -> Result<u32, TriageError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<bool, TriageError>>,
{
    for attempt in 1..=policy.max_attempts {
        if check(attempt).await? {
            return Ok(attempt);
        }
        debug!(what = %what, attempt, max_attempts = policy.max_attempts, "Still waiting");
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Err(TriageError::WaitTimedOut {
        what: what.to_string(),
        attempts: policy.max_attempts,
    })
}
