//! Event-channel completion waiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::{
    bounded, evaluate_history, CompletionPayload, CompletionWaiter, JobTracker, WaitError,
    WaitState,
};
use crate::engine::{EngineApi, EventChannel};
use crate::submit::JobHandle;

/// Subscribes to the engine's event channel as the submitting client and
/// completes on the first terminal event for the job.
///
/// The subscription is opened before a single history check, so a job
/// that finished between submission and subscription is still seen. A
/// dropped channel fails the wait with [`WaitError::ChannelLost`]; it is
/// never silently reopened, since the completion event may already have
/// been missed.
pub struct PushWaiter {
    channel: Arc<dyn EventChannel>,
    engine: Arc<dyn EngineApi>,
    timeout: Duration,
}

impl PushWaiter {
    pub fn new(channel: Arc<dyn EventChannel>, engine: Arc<dyn EngineApi>, timeout: Duration) -> Self {
        Self {
            channel,
            engine,
            timeout,
        }
    }

    async fn listen(&self, job: &JobHandle) -> Result<CompletionPayload, WaitError> {
        let job_id = job.job_id.as_str();
        let mut events = self.channel.subscribe(&job.client_id).await?;

        if let Some(done) = self.check_history(job_id).await {
            return done;
        }

        let mut tracker = JobTracker::new(job_id);
        loop {
            let msg = match events.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Err(WaitError::ChannelLost {
                        job_id: job_id.to_string(),
                        reason: e.to_string(),
                    })
                }
                None => {
                    return Err(WaitError::ChannelLost {
                        job_id: job_id.to_string(),
                        reason: "channel closed by the engine".into(),
                    })
                }
            };

            match tracker.observe(&msg) {
                WaitState::Pending => {}
                WaitState::Succeeded(payload) if tracker.has_outputs() => {
                    tracing::info!(job_id, "Job completed");
                    return Ok(payload);
                }
                WaitState::Succeeded(payload) => {
                    // Fully cached runs finish without `executed` events;
                    // their outputs are only in history.
                    drop(events);
                    return self.outputs_from_history(payload).await;
                }
                WaitState::Failed(message) => {
                    tracing::warn!(job_id, error = %message, "Job failed on the engine");
                    return Err(WaitError::Failed {
                        job_id: job_id.to_string(),
                        message,
                    });
                }
            }
        }
    }

    /// One read-only look at history; `None` means keep listening.
    async fn check_history(&self, job_id: &str) -> Option<Result<CompletionPayload, WaitError>> {
        let history = match self.engine.history(job_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::debug!(job_id, error = %e, "Initial history check failed");
                return None;
            }
        };
        match evaluate_history(&history, job_id) {
            Ok(WaitState::Succeeded(payload)) => {
                tracing::info!(job_id, "Job already completed before subscription");
                Some(Ok(payload))
            }
            Ok(WaitState::Failed(message)) => Some(Err(WaitError::Failed {
                job_id: job_id.to_string(),
                message,
            })),
            Ok(WaitState::Pending) => None,
            Err(e) => {
                tracing::debug!(job_id, error = %e, "Unreadable history entry");
                None
            }
        }
    }

    async fn outputs_from_history(
        &self,
        observed: CompletionPayload,
    ) -> Result<CompletionPayload, WaitError> {
        let history = self.engine.history(&observed.job_id).await?;
        match evaluate_history(&history, &observed.job_id) {
            Ok(WaitState::Succeeded(payload)) => Ok(payload),
            Ok(WaitState::Failed(message)) => Err(WaitError::Failed {
                job_id: observed.job_id,
                message,
            }),
            // Finished without outputs; the resolver reports that.
            Ok(WaitState::Pending) | Err(_) => Ok(observed),
        }
    }
}

#[async_trait]
impl CompletionWaiter for PushWaiter {
    async fn wait(
        &self,
        job: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<CompletionPayload, WaitError> {
        bounded(job, self.timeout, cancel, self.listen(job)).await
    }
}
