//! Stage-tagged failure reported by the orchestrator.

use std::fmt;

use serde::Serialize;

use crate::extract::ExtractError;
use crate::resolve::ResolveError;
use crate::submit::SubmitError;
use crate::template::TemplateError;
use crate::upload::UploadError;
use crate::wait::WaitError;

/// Pipeline stage at which a generation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadTemplate,
    Upload,
    Inject,
    Submit,
    Wait,
    Resolve,
    Extract,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadTemplate => "load_template",
            Self::Upload => "upload",
            Self::Inject => "inject",
            Self::Submit => "submit",
            Self::Wait => "wait",
            Self::Resolve => "resolve",
            Self::Extract => "extract",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse failure class, independent of the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or connection failure talking to the engine.
    Transport,
    /// The engine refused a request.
    RejectedByEngine,
    /// Template missing, malformed, or not matching the slot bindings.
    Template,
    /// The engine ran the job and reported a failure.
    JobFailed,
    /// The job finished without any recognized output.
    NoOutputProduced,
    CompletionTimeout,
    ChannelLost,
    Cancelled,
    ArtifactFetch,
    Probe,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::RejectedByEngine => "rejected_by_engine",
            Self::Template => "template",
            Self::JobFailed => "job_failed",
            Self::NoOutputProduced => "no_output_produced",
            Self::CompletionTimeout => "completion_timeout",
            Self::ChannelLost => "channel_lost",
            Self::Cancelled => "cancelled",
            Self::ArtifactFetch => "artifact_fetch",
            Self::Probe => "probe",
        }
    }
}

/// The underlying failure of a stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Template(_) => ErrorKind::Template,
            Self::Upload(UploadError::Transport(_)) | Self::Submit(SubmitError::Transport(_)) => {
                ErrorKind::Transport
            }
            Self::Upload(_) | Self::Submit(_) => ErrorKind::RejectedByEngine,
            Self::Wait(e) => match e {
                WaitError::Failed { .. } => ErrorKind::JobFailed,
                WaitError::Timeout { .. } => ErrorKind::CompletionTimeout,
                WaitError::ChannelLost { .. } => ErrorKind::ChannelLost,
                WaitError::Transport(_) => ErrorKind::Transport,
                WaitError::Cancelled => ErrorKind::Cancelled,
            },
            Self::Resolve(ResolveError::NoOutputProduced { .. }) => ErrorKind::NoOutputProduced,
            Self::Extract(e) => match e {
                ExtractError::ArtifactFetch { .. } | ExtractError::TempFile(_) => {
                    ErrorKind::ArtifactFetch
                }
                ExtractError::Probe { .. } | ExtractError::MissingField { .. } => ErrorKind::Probe,
            },
        }
    }
}

/// The single error returned by [`GenerationPipeline::run`](crate::GenerationPipeline::run).
#[derive(Debug, thiserror::Error)]
#[error("generation failed at stage '{stage}': {source}")]
pub struct GenerationFailed {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl GenerationFailed {
    pub fn new(stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn kinds_follow_the_underlying_error() {
        let timeout = GenerationFailed::new(
            Stage::Wait,
            WaitError::Timeout {
                job_id: "j".into(),
                after: Duration::from_secs(900),
            },
        );
        assert_eq!(timeout.kind(), ErrorKind::CompletionTimeout);

        let rejected = GenerationFailed::new(
            Stage::Submit,
            SubmitError::Rejected {
                status: 400,
                body: "bad".into(),
            },
        );
        assert_eq!(rejected.kind(), ErrorKind::RejectedByEngine);

        let transport = GenerationFailed::new(Stage::Upload, UploadError::Transport("refused".into()));
        assert_eq!(transport.kind(), ErrorKind::Transport);

        let empty = GenerationFailed::new(
            Stage::Resolve,
            ResolveError::NoOutputProduced { job_id: "j".into() },
        );
        assert_eq!(empty.kind(), ErrorKind::NoOutputProduced);
    }

    #[test]
    fn message_names_the_stage() {
        let err = GenerationFailed::new(
            Stage::Inject,
            TemplateError::SlotMissing {
                node_id: "1206".into(),
                input: "image".into(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("'inject'"));
        assert!(msg.contains("1206"));
        assert_eq!(err.kind(), ErrorKind::Template);
    }
}
