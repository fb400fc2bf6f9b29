//! Seams between the pipeline and the outside world.
//!
//! The stages talk to the generation engine, its event channel and the
//! media prober only through these traits, so they can be exercised
//! against in-process fakes. The production implementations wrap
//! [`vidgen_comfyui`] and [`vidgen_core::ffmpeg`].

use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use vidgen_comfyui::api::{ComfyUIApi, ComfyUIApiError, SubmitResponse, UploadResponse};
use vidgen_comfyui::client::{ComfyUIClient, ComfyUIClientError};
use vidgen_comfyui::messages::ComfyUIMessage;
use vidgen_core::ffmpeg::{probe_media, FfmpegError, FfprobeOutput};

/// Failure of a single call to the engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The engine could not be reached or the connection broke.
    #[error("engine transport error: {0}")]
    Transport(String),

    /// The engine answered with a non-success status.
    #[error("engine rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The engine answered 2xx with a body we could not interpret.
    #[error("engine returned an unreadable response: {0}")]
    InvalidResponse(String),
}

impl From<ComfyUIApiError> for EngineError {
    fn from(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::ApiError { status, body } => Self::Rejected { status, body },
            ComfyUIApiError::Request(e) if e.is_decode() => Self::InvalidResponse(e.to_string()),
            ComfyUIApiError::Request(e) => Self::Transport(e.to_string()),
        }
    }
}

impl From<ComfyUIClientError> for EngineError {
    fn from(err: ComfyUIClientError) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Request/response operations on the generation engine.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Push an input image into the engine's asset namespace.
    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadResponse, EngineError>;

    /// Queue a parameterized workflow on behalf of `client_id`.
    async fn submit(&self, workflow: &Value, client_id: &str) -> Result<SubmitResponse, EngineError>;

    /// Raw history payload for one job.
    async fn history(&self, job_id: &str) -> Result<Value, EngineError>;

    /// Fetch a produced artifact.
    async fn download(
        &self,
        filename: &str,
        subfolder: &str,
        folder_type: &str,
    ) -> Result<Vec<u8>, EngineError>;
}

#[async_trait]
impl EngineApi for ComfyUIApi {
    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadResponse, EngineError> {
        Ok(ComfyUIApi::upload_image(self, bytes, filename, content_type).await?)
    }

    async fn submit(&self, workflow: &Value, client_id: &str) -> Result<SubmitResponse, EngineError> {
        Ok(self.submit_workflow(workflow, client_id).await?)
    }

    async fn history(&self, job_id: &str) -> Result<Value, EngineError> {
        Ok(self.get_history(job_id).await?)
    }

    async fn download(
        &self,
        filename: &str,
        subfolder: &str,
        folder_type: &str,
    ) -> Result<Vec<u8>, EngineError> {
        Ok(self.view(filename, subfolder, folder_type).await?)
    }
}

/// Stream of engine events for one subscribed client.
///
/// Dropping the stream closes the underlying connection.
pub type EventStream = BoxStream<'static, Result<ComfyUIMessage, EngineError>>;

/// Push channel carrying the engine's execution events.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Open a subscription as `client_id`.
    async fn subscribe(&self, client_id: &str) -> Result<EventStream, EngineError>;
}

#[async_trait]
impl EventChannel for ComfyUIClient {
    async fn subscribe(&self, client_id: &str) -> Result<EventStream, EngineError> {
        let connection = self.connect(client_id).await?;
        Ok(connection
            .into_messages()
            .map(|item| item.map_err(EngineError::from))
            .boxed())
    }
}

/// Media-probing capability.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<FfprobeOutput, FfmpegError>;
}

/// [`MediaProbe`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: String,
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
        probe_media(&self.binary, path).await
    }
}
