//! Parser for the `GET /history/{prompt_id}` payload.
//!
//! The endpoint returns an object keyed by prompt id. The key is absent
//! until the prompt has left the queue; once present, the entry carries
//! the per-node `outputs` and an execution `status` block.

use serde::Deserialize;
use serde_json::{Map, Value};

/// One prompt's history record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    /// Node id to that node's output groups (`{"gifs": [...]}`, ...).
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default)]
    pub status: Option<HistoryStatus>,
}

/// Execution status attached to a history record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    /// `"success"` or `"error"`.
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// `[event_name, payload]` pairs recorded during execution.
    #[serde(default)]
    pub messages: Vec<Value>,
}

impl HistoryEntry {
    /// `true` when at least one node recorded a non-empty output object.
    pub fn has_outputs(&self) -> bool {
        self.outputs
            .values()
            .any(|v| v.as_object().is_some_and(|o| !o.is_empty()))
    }

    /// `true` when the engine marked the execution as failed.
    pub fn is_error(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.status_str.as_deref())
            == Some("error")
    }

    /// The engine's own description of the failure, taken from the first
    /// `execution_error` status message.
    pub fn error_message(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        status.messages.iter().find_map(|m| {
            let pair = m.as_array()?;
            if pair.first()?.as_str()? != "execution_error" {
                return None;
            }
            let data = pair.get(1)?;
            let message = data.get("exception_message")?.as_str()?;
            match data.get("node_id").and_then(Value::as_str) {
                Some(node) => Some(format!("node {node}: {message}")),
                None => Some(message.to_string()),
            }
        })
    }
}

/// Extract the entry for `prompt_id` from a raw history response.
///
/// Returns `Ok(None)` while the prompt is still queued or running, and
/// `Err` when the entry exists but does not have the expected shape.
/// Entries for any other prompt id are never consulted.
pub fn entry_for(history: &Value, prompt_id: &str) -> Result<Option<HistoryEntry>, serde_json::Error> {
    match history.get(prompt_id) {
        Some(raw) => HistoryEntry::deserialize(raw).map(Some),
        None => Ok(None),
    }
}
