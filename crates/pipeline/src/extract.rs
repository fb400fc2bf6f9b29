//! Derives technical metadata for a resolved artifact.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use vidgen_core::media::{parse_frame_rate, VideoMetadata};

use crate::config::MetadataSource;
use crate::engine::{EngineApi, MediaProbe};
use crate::resolve::OutputDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("could not fetch artifact {filename}: {reason}")]
    ArtifactFetch { filename: String, reason: String },

    #[error("could not stage artifact for probing: {0}")]
    TempFile(#[from] std::io::Error),

    #[error("probe failed for {filename}: {reason}")]
    Probe { filename: String, reason: String },

    /// The engine echo lacks a field the metadata cannot do without.
    #[error("engine did not report '{field}' for {filename}")]
    MissingField { filename: String, field: &'static str },
}

/// Produces [`VideoMetadata`] from the configured source of truth.
pub struct MetadataExtractor {
    engine: Arc<dyn EngineApi>,
    probe: Arc<dyn MediaProbe>,
    source: MetadataSource,
    temp_dir: Option<PathBuf>,
    probe_timeout: Duration,
}

impl MetadataExtractor {
    pub fn new(
        engine: Arc<dyn EngineApi>,
        probe: Arc<dyn MediaProbe>,
        source: MetadataSource,
        temp_dir: Option<PathBuf>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            probe,
            source,
            temp_dir,
            probe_timeout,
        }
    }

    pub fn source(&self) -> MetadataSource {
        self.source
    }

    pub async fn extract(&self, output: &OutputDescriptor) -> Result<VideoMetadata, ExtractError> {
        match self.source {
            MetadataSource::Probe => self.probe_artifact(output).await,
            MetadataSource::Engine => from_engine_echo(output),
        }
    }

    /// Download the artifact into a scoped temp file and probe it.
    ///
    /// The temp file is removed when `staged` drops, on every return path.
    async fn probe_artifact(&self, output: &OutputDescriptor) -> Result<VideoMetadata, ExtractError> {
        let filename = output.filename.as_str();
        let bytes = self
            .engine
            .download(
                filename,
                output.subfolder.as_deref().unwrap_or_default(),
                &output.folder_type,
            )
            .await
            .map_err(|e| ExtractError::ArtifactFetch {
                filename: filename.to_string(),
                reason: e.to_string(),
            })?;
        if bytes.is_empty() {
            return Err(ExtractError::ArtifactFetch {
                filename: filename.to_string(),
                reason: "empty body".into(),
            });
        }

        let suffix = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix("vidgen-artifact-").suffix(&suffix);
        let staged = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        tokio::fs::write(staged.path(), &bytes).await?;

        tracing::debug!(
            filename,
            bytes = bytes.len(),
            path = %staged.path().display(),
            "Probing downloaded artifact",
        );

        let probed = tokio::time::timeout(self.probe_timeout, self.probe.probe(staged.path()))
            .await
            .map_err(|_| ExtractError::Probe {
                filename: filename.to_string(),
                reason: format!("timed out after {}s", self.probe_timeout.as_secs()),
            })?
            .map_err(|e| ExtractError::Probe {
                filename: filename.to_string(),
                reason: e.to_string(),
            })?;

        VideoMetadata::from_probe(&probed).ok_or_else(|| ExtractError::Probe {
            filename: filename.to_string(),
            reason: "no video stream with dimensions".into(),
        })
    }
}

/// Build metadata from the fields the engine echoed next to the output.
fn from_engine_echo(output: &OutputDescriptor) -> Result<VideoMetadata, ExtractError> {
    let entry = &output.entry;
    let missing = |field: &'static str| ExtractError::MissingField {
        filename: output.filename.clone(),
        field,
    };

    let width = dimension(entry, "width").ok_or_else(|| missing("width"))?;
    let height = dimension(entry, "height").ok_or_else(|| missing("height"))?;

    let frame_rate = entry.get("frame_rate").and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_frame_rate(s),
        _ => None,
    });
    let frame_count = entry.get("frame_count").and_then(Value::as_u64);
    let duration = entry.get("duration").and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    let codec = entry
        .get("codec")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(VideoMetadata::from_parts(
        width,
        height,
        frame_rate,
        frame_count,
        duration,
        codec,
    ))
}

fn dimension(entry: &Value, key: &str) -> Option<u32> {
    entry
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
}
