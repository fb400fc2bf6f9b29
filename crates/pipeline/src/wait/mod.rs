//! Completion detection for submitted jobs.
//!
//! Both strategies drive the same per-job state machine,
//! `Pending -> Succeeded | Failed`, evaluated by the pure functions in
//! [`state`]. The overall deadline and caller cancellation are applied
//! uniformly by [`bounded`]: whichever fires first drops the in-flight
//! wait, which closes any open channel or request.

pub mod polling;
pub mod push;
pub mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::{CompletionConfig, CompletionStrategy};
use crate::engine::{EngineApi, EngineError, EventChannel};
use crate::submit::JobHandle;

pub use polling::PollingWaiter;
pub use push::PushWaiter;
pub use state::{evaluate_history, JobTracker, WaitState};

/// Outputs of a finished job, keyed by output node id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionPayload {
    pub job_id: String,
    pub outputs: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// The engine reported that the job failed.
    #[error("job {job_id} failed on the engine: {message}")]
    Failed { job_id: String, message: String },

    #[error("job {job_id} did not finish within {}s", .after.as_secs())]
    Timeout { job_id: String, after: Duration },

    /// The push channel dropped before a terminal event arrived.
    #[error("event channel lost while waiting for job {job_id}: {reason}")]
    ChannelLost { job_id: String, reason: String },

    /// A non-retried engine call inside the wait failed.
    #[error("engine unavailable while waiting: {0}")]
    Transport(#[from] EngineError),

    #[error("wait cancelled")]
    Cancelled,
}

/// Blocks until a submitted job reaches a terminal state.
#[async_trait]
pub trait CompletionWaiter: Send + Sync {
    async fn wait(
        &self,
        job: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<CompletionPayload, WaitError>;
}

/// Build the waiter selected by configuration.
pub fn waiter_for(
    config: &CompletionConfig,
    engine: Arc<dyn EngineApi>,
    channel: Arc<dyn EventChannel>,
) -> Arc<dyn CompletionWaiter> {
    match config.strategy {
        CompletionStrategy::Polling => {
            Arc::new(PollingWaiter::new(engine, config.poll_interval, config.timeout))
        }
        CompletionStrategy::Push => Arc::new(PushWaiter::new(channel, engine, config.timeout)),
    }
}

/// Run `wait` until it finishes, `deadline` elapses, or `cancel` fires.
///
/// On timeout or cancellation the `wait` future is dropped before this
/// returns.
pub(crate) async fn bounded<F>(
    job: &JobHandle,
    deadline: Duration,
    cancel: &CancellationToken,
    wait: F,
) -> Result<CompletionPayload, WaitError>
where
    F: Future<Output = Result<CompletionPayload, WaitError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!(job_id = %job.job_id, "Completion wait cancelled");
            Err(WaitError::Cancelled)
        }
        outcome = tokio::time::timeout(deadline, wait) => match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    job_id = %job.job_id,
                    timeout_secs = deadline.as_secs(),
                    "Job did not finish before the deadline",
                );
                Err(WaitError::Timeout {
                    job_id: job.job_id.clone(),
                    after: deadline,
                })
            }
        },
    }
}
