//! Pushes the caller's input image to the engine.

use std::sync::Arc;

use crate::engine::{EngineApi, EngineError};

/// An input image supplied with a generation request.
#[derive(Debug, Clone)]
pub struct InputAsset {
    pub bytes: Vec<u8>,
    /// Name as supplied by the caller; only used as a readable suffix.
    pub filename: String,
    /// Declared MIME type, e.g. `image/png`.
    pub content_type: String,
}

/// Engine-side name of an uploaded asset, as written into the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAssetRef(pub String);

impl UploadedAssetRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("engine rejected the upload ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("upload did not reach the engine: {0}")]
    Transport(String),

    #[error("engine returned an unusable upload response: {0}")]
    InvalidResponse(String),
}

impl From<EngineError> for UploadError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Rejected { status, body } => Self::Rejected { status, body },
            EngineError::Transport(e) => Self::Transport(e),
            EngineError::InvalidResponse(e) => Self::InvalidResponse(e),
        }
    }
}

/// Uploads input assets under request-unique names.
#[derive(Clone)]
pub struct AssetUploader {
    engine: Arc<dyn EngineApi>,
}

impl AssetUploader {
    pub fn new(engine: Arc<dyn EngineApi>) -> Self {
        Self { engine }
    }

    /// Upload `asset` if there is one.
    ///
    /// `Ok(None)` when no asset was supplied. The stored name is prefixed
    /// with a fresh UUID so two requests never share an engine asset.
    pub async fn upload(
        &self,
        asset: Option<&InputAsset>,
    ) -> Result<Option<UploadedAssetRef>, UploadError> {
        let Some(asset) = asset else {
            return Ok(None);
        };

        let filename = format!(
            "{}_{}",
            uuid::Uuid::new_v4().simple(),
            sanitize_filename(&asset.filename)
        );
        let response = self
            .engine
            .upload_image(asset.bytes.clone(), &filename, &asset.content_type)
            .await?;

        if response.name.is_empty() {
            return Err(UploadError::InvalidResponse("empty asset name".into()));
        }

        let reference = UploadedAssetRef(response.reference());
        tracing::debug!(asset_ref = %reference.as_str(), bytes = asset.bytes.len(), "Uploaded input asset");
        Ok(Some(reference))
    }
}

/// Keep only the final path component and replace anything outside
/// `[A-Za-z0-9._-]`.
fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "input".to_string()
    } else {
        cleaned.to_string()
    }
}
