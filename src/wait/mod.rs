//! Polling helper that waits for an instance to reach a lifecycle state.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::farm::{DeviceFarm, InstanceId, InstanceState};

/// Stand-in for budgets too large to represent as an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Returns the instant `budget` from now.
///
/// Budgets that overflow the clock saturate to roughly thirty years ahead,
/// which no run outlives.
#[must_use]
pub fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Errors raised while waiting for an instance state.
#[derive(Debug, Error)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised as soon as the device farm reports the `error` state.
    #[error("instance {instance_id} entered the error state")]
    InstanceError {
        /// Instance being waited on.
        instance_id: InstanceId,
    },
    /// Raised when the deadline passes before the target state is reached.
    #[error(
        "timed out waiting for instance {instance_id} to reach `{target}` (last state `{last_state}`)"
    )]
    Timeout {
        /// Instance being waited on.
        instance_id: InstanceId,
        /// State being waited for.
        target: String,
        /// Last state observed before giving up.
        last_state: InstanceState,
    },
    /// Raised when fetching the state fails.
    #[error("failed to fetch state of instance {instance_id}: {source}")]
    Api {
        /// Instance being waited on.
        instance_id: InstanceId,
        /// Provider error.
        #[source]
        source: E,
    },
}

/// Polls `instance` until its state equals `target`.
///
/// Each iteration fetches the state once. The `error` state fails the wait
/// before any comparison with `target`. Between unsuccessful polls the task
/// sleeps exactly `poll_interval`; the wait gives up instead of sleeping past
/// `deadline`.
///
/// # Errors
///
/// Returns [`WaitError::InstanceError`] when the instance fails,
/// [`WaitError::Timeout`] when the deadline would be exceeded and
/// [`WaitError::Api`] when a poll fails.
pub async fn wait_for_state<F>(
    farm: &F,
    instance: &InstanceId,
    target: &str,
    poll_interval: Duration,
    deadline: Instant,
) -> Result<(), WaitError<F::Error>>
where
    F: DeviceFarm,
{
    loop {
        let state = farm
            .instance_state(instance)
            .await
            .map_err(|source| WaitError::Api {
                instance_id: instance.clone(),
                source,
            })?;
        tracing::debug!(instance = %instance, state = %state, target, "polled instance state");

        if state.is_error() {
            return Err(WaitError::InstanceError {
                instance_id: instance.clone(),
            });
        }

        if state.as_str() == target {
            return Ok(());
        }

        let next_poll = Instant::now().checked_add(poll_interval);
        if next_poll.is_none_or(|next| next > deadline) {
            return Err(WaitError::Timeout {
                instance_id: instance.clone(),
                target: target.to_owned(),
                last_state: state,
            });
        }

        sleep(poll_interval).await;
    }
}
