//! History-polling completion waiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{bounded, evaluate_history, CompletionPayload, CompletionWaiter, WaitError, WaitState};
use crate::engine::EngineApi;
use crate::submit::JobHandle;

/// Polls `GET /history/{job_id}` at a fixed interval.
///
/// Failed polls (transport errors, unparseable bodies) are logged and
/// retried on the next tick; they never end the wait. The deadline keeps
/// running regardless.
pub struct PollingWaiter {
    engine: Arc<dyn EngineApi>,
    interval: Duration,
    timeout: Duration,
}

impl PollingWaiter {
    pub fn new(engine: Arc<dyn EngineApi>, interval: Duration, timeout: Duration) -> Self {
        Self {
            engine,
            interval,
            timeout,
        }
    }

    async fn poll_until_terminal(&self, job_id: &str) -> Result<CompletionPayload, WaitError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls: u64 = 0;

        loop {
            ticker.tick().await;
            polls += 1;

            let history = match self.engine.history(job_id).await {
                Ok(history) => history,
                Err(e) => {
                    tracing::warn!(job_id, polls, error = %e, "History poll failed, retrying");
                    continue;
                }
            };

            match evaluate_history(&history, job_id) {
                Ok(WaitState::Pending) => {}
                Ok(WaitState::Succeeded(payload)) => {
                    tracing::info!(job_id, polls, "Job completed");
                    return Ok(payload);
                }
                Ok(WaitState::Failed(message)) => {
                    tracing::warn!(job_id, polls, error = %message, "Job failed on the engine");
                    return Err(WaitError::Failed {
                        job_id: job_id.to_string(),
                        message,
                    });
                }
                Err(e) => {
                    tracing::debug!(job_id, polls, error = %e, "Unreadable history entry, retrying");
                }
            }
        }
    }
}

#[async_trait]
impl CompletionWaiter for PollingWaiter {
    async fn wait(
        &self,
        job: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<CompletionPayload, WaitError> {
        bounded(job, self.timeout, cancel, self.poll_until_terminal(&job.job_id)).await
    }
}
