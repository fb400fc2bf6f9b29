//! Queues a parameterized workflow on the engine.

use std::sync::Arc;

use crate::engine::{EngineApi, EngineError};
use crate::template::WorkflowTemplate;

/// Identifies one submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Engine-assigned prompt id.
    pub job_id: String,
    /// Client id the job was queued under; the event channel only
    /// delivers this job's execution events to that client.
    pub client_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("engine rejected the workflow ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("workflow did not reach the engine: {0}")]
    Transport(String),

    #[error("engine returned an unusable submit response: {0}")]
    InvalidResponse(String),
}

impl From<EngineError> for SubmitError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Rejected { status, body } => Self::Rejected { status, body },
            EngineError::Transport(e) => Self::Transport(e),
            EngineError::InvalidResponse(e) => Self::InvalidResponse(e),
        }
    }
}

/// Sends workflows to the engine's execution queue.
///
/// Not idempotent: every call creates a new job on the engine.
#[derive(Clone)]
pub struct JobSubmitter {
    engine: Arc<dyn EngineApi>,
}

impl JobSubmitter {
    pub fn new(engine: Arc<dyn EngineApi>) -> Self {
        Self { engine }
    }

    pub async fn submit(&self, workflow: &WorkflowTemplate) -> Result<JobHandle, SubmitError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let response = self.engine.submit(&workflow.to_value(), &client_id).await?;

        if response.prompt_id.trim().is_empty() {
            return Err(SubmitError::InvalidResponse("empty prompt_id".into()));
        }

        if response
            .node_errors
            .as_object()
            .is_some_and(|errors| !errors.is_empty())
        {
            tracing::warn!(
                job_id = %response.prompt_id,
                node_errors = %response.node_errors,
                "Engine queued the workflow with node errors",
            );
        }

        tracing::info!(job_id = %response.prompt_id, queue_position = response.number, "Workflow submitted");

        Ok(JobHandle {
            job_id: response.prompt_id,
            client_id,
        })
    }
}
