//! Pure state transitions for a single job.

use serde_json::{Map, Value};
use vidgen_comfyui::history::entry_for;
use vidgen_comfyui::messages::ComfyUIMessage;

use super::CompletionPayload;

/// Where a job stands after one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitState {
    Pending,
    Succeeded(CompletionPayload),
    Failed(String),
}

/// Evaluate a raw history response for `job_id`.
///
/// Only the entry keyed by exactly `job_id` is consulted. An error status
/// wins over any outputs recorded before the failure. A successful
/// completion without outputs is still terminal; the resolver reports it
/// as "no output produced".
pub fn evaluate_history(history: &Value, job_id: &str) -> Result<WaitState, serde_json::Error> {
    let Some(entry) = entry_for(history, job_id)? else {
        return Ok(WaitState::Pending);
    };

    if entry.is_error() {
        let message = entry
            .error_message()
            .unwrap_or_else(|| "engine reported an execution error".to_string());
        return Ok(WaitState::Failed(message));
    }

    let completed = entry.status.as_ref().is_some_and(|s| s.completed);
    if entry.has_outputs() || completed {
        return Ok(WaitState::Succeeded(CompletionPayload {
            job_id: job_id.to_string(),
            outputs: entry.outputs,
        }));
    }

    Ok(WaitState::Pending)
}

/// Follows one job through a stream of push events.
///
/// Outputs are collected from `executed` events as they arrive, because
/// the terminal event itself carries none.
#[derive(Debug)]
pub struct JobTracker {
    job_id: String,
    outputs: Map<String, Value>,
}

impl JobTracker {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            outputs: Map::new(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Whether any output has been collected so far.
    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }

    /// Apply one event. Events for any other job leave the state at
    /// `Pending` and are otherwise ignored.
    pub fn observe(&mut self, msg: &ComfyUIMessage) -> WaitState {
        if msg.prompt_id() != Some(self.job_id.as_str()) {
            return WaitState::Pending;
        }

        match msg {
            ComfyUIMessage::Executed(data) => {
                if let Value::Object(groups) = &data.output {
                    let node = self
                        .outputs
                        .entry(data.node.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(existing) = node {
                        for (kind, entries) in groups {
                            existing.insert(kind.clone(), entries.clone());
                        }
                    }
                }
                WaitState::Pending
            }
            ComfyUIMessage::Executing(data) if data.node.is_none() => self.succeeded(),
            ComfyUIMessage::ExecutionSuccess(_) => self.succeeded(),
            ComfyUIMessage::ExecutionError(data) => WaitState::Failed(format!(
                "node {}: {}: {}",
                data.node_id, data.exception_type, data.exception_message
            )),
            ComfyUIMessage::ExecutionInterrupted(data) => WaitState::Failed(match &data.node_id {
                Some(node) => format!("execution interrupted at node {node}"),
                None => "execution interrupted".to_string(),
            }),
            _ => WaitState::Pending,
        }
    }

    fn succeeded(&self) -> WaitState {
        WaitState::Succeeded(CompletionPayload {
            job_id: self.job_id.clone(),
            outputs: self.outputs.clone(),
        })
    }
}
