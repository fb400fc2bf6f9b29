//! Picks the produced artifact out of a completion payload.
//!
//! Output nodes report their files grouped by kind:
//! `{"<node_id>": {"gifs": [{"filename", "subfolder", "type"}, ..]}}`.
//! Video kinds are always preferred over still images, whatever order
//! the nodes appear in.

use serde::Serialize;
use serde_json::Value;

use crate::config::OutputPolicy;
use crate::wait::CompletionPayload;

/// Recognized output groups, in resolution priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// `videos` group.
    Video,
    /// `gifs` group; video-combine nodes report mp4/webm files here.
    Animation,
    /// `images` group.
    Image,
}

impl OutputKind {
    pub const PRIORITY: [OutputKind; 3] = [Self::Video, Self::Animation, Self::Image];

    /// Group key in the engine's output object.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Animation => "gifs",
            Self::Image => "images",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video | Self::Animation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Animation => "animation",
            Self::Image => "image",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "video" => Some(Self::Video),
            "animation" => Some(Self::Animation),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Location of one produced artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDescriptor {
    pub filename: String,
    pub subfolder: Option<String>,
    /// Engine folder type, `output` unless the entry says otherwise.
    pub folder_type: String,
    pub kind: OutputKind,
    pub node_id: String,
    /// The raw entry, including any metadata the engine echoed.
    pub entry: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("job {job_id} finished without a usable output")]
    NoOutputProduced { job_id: String },
}

/// Select the artifact to return for `payload`.
///
/// Kinds are tried in [`OutputKind::PRIORITY`] order and the first
/// entry of the first non-empty group wins; within a kind, nodes are
/// scanned in node-id order. Entries without a string `filename` are
/// skipped.
pub fn resolve(payload: &CompletionPayload, policy: OutputPolicy) -> Result<OutputDescriptor, ResolveError> {
    for kind in OutputKind::PRIORITY {
        if policy == OutputPolicy::VideoOnly && !kind.is_video() {
            continue;
        }
        for (node_id, groups) in &payload.outputs {
            let Some(entries) = groups.get(kind.tag()).and_then(Value::as_array) else {
                continue;
            };
            if let Some(found) = entries.iter().find_map(|e| describe(node_id, kind, e)) {
                tracing::debug!(
                    job_id = %payload.job_id,
                    node_id = %found.node_id,
                    kind = kind.tag(),
                    filename = %found.filename,
                    "Resolved output",
                );
                return Ok(found);
            }
        }
    }

    Err(ResolveError::NoOutputProduced {
        job_id: payload.job_id.clone(),
    })
}

fn describe(node_id: &str, kind: OutputKind, entry: &Value) -> Option<OutputDescriptor> {
    let filename = entry.get("filename")?.as_str()?.trim();
    if filename.is_empty() {
        return None;
    }
    let subfolder = entry
        .get("subfolder")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let folder_type = entry
        .get("type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("output")
        .to_string();

    Some(OutputDescriptor {
        filename: filename.to_string(),
        subfolder,
        folder_type,
        kind,
        node_id: node_id.to_string(),
        entry: entry.clone(),
    })
}
