//! Workflow template loading.
//!
//! A template is the engine's API-format graph: an ordered map from node
//! id to `{class_type, inputs, ..}`. Loaded templates are handed out as
//! `Arc<WorkflowTemplate>` and never mutated; the injector clones before
//! writing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// One node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Engine node type (the node's role), e.g. `CLIPTextEncode`.
    #[serde(alias = "role")]
    pub class_type: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Fields the pipeline does not interpret (`_meta`, ...), passed through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An ordered node-id to node mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowTemplate {
    nodes: IndexMap<String, WorkflowNode>,
}

impl WorkflowTemplate {
    pub fn from_nodes(nodes: IndexMap<String, WorkflowNode>) -> Self {
        Self { nodes }
    }

    /// Parse a template from JSON text.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&String, &WorkflowNode)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The JSON document submitted to the engine.
    pub fn to_value(&self) -> Value {
        // A map of plain structs with string keys always serializes.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Errors raised while loading or filling a template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("workflow template not readable at {path}: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workflow template at {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// A configured slot is absent; the template and the slot bindings
    /// were written for different engine workflows.
    #[error("workflow template has no input '{input}' on node '{node_id}'")]
    SlotMissing { node_id: String, input: String },

    #[error("an input image was supplied but no image slot is configured")]
    ImageSlotDisabled,
}

/// Loads templates from disk, optionally caching them by path.
#[derive(Debug, Default)]
pub struct TemplateStore {
    cache_enabled: bool,
    cache: RwLock<HashMap<PathBuf, Arc<WorkflowTemplate>>>,
}

impl TemplateStore {
    pub fn new(cache_enabled: bool) -> Self {
        Self {
            cache_enabled,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load the template at `path`.
    ///
    /// An empty graph is rejected as malformed: submitting it would only
    /// fail later with a less useful engine error.
    pub async fn load(&self, path: &Path) -> Result<Arc<WorkflowTemplate>, TemplateError> {
        if self.cache_enabled {
            if let Some(hit) = self.cache.read().await.get(path) {
                return Ok(Arc::clone(hit));
            }
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TemplateError::NotFound {
                path: path.to_path_buf(),
                source,
            })?;

        let template = WorkflowTemplate::parse(&raw).map_err(|e| TemplateError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if template.is_empty() {
            return Err(TemplateError::Malformed {
                path: path.to_path_buf(),
                reason: "template contains no nodes".into(),
            });
        }

        let template = Arc::new(template);
        tracing::debug!(path = %path.display(), nodes = template.len(), "Loaded workflow template");

        if self.cache_enabled {
            self.cache
                .write()
                .await
                .insert(path.to_path_buf(), Arc::clone(&template));
        }
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;

    use super::*;

    const TEMPLATE: &str = r#"{
        "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "default positive", "clip": ["38", 0]}},
        "7": {"class_type": "CLIPTextEncode", "inputs": {"text": "default negative", "clip": ["38", 0]}},
        "1206": {"role": "LoadImage", "inputs": {"image": "placeholder.png"}, "_meta": {"title": "Start frame"}}
    }"#;

    fn write_template(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_keeps_node_order_and_extra_fields() {
        let template = WorkflowTemplate::parse(TEMPLATE).unwrap();
        let ids: Vec<_> = template.nodes().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["6", "7", "1206"]);

        let image = template.node("1206").unwrap();
        assert_eq!(image.class_type, "LoadImage");
        assert_eq!(image.extra["_meta"]["title"], "Start frame");

        let value = template.to_value();
        assert_eq!(value["1206"]["_meta"]["title"], "Start frame");
        assert_eq!(value["6"]["inputs"]["clip"][0], "38");
    }

    #[tokio::test]
    async fn load_missing_file_is_not_found() {
        let store = TemplateStore::new(false);
        let err = store.load(Path::new("/nope/workflow.json")).await.unwrap_err();
        assert_matches!(err, TemplateError::NotFound { .. });
    }

    #[tokio::test]
    async fn load_rejects_wrong_shape() {
        let store = TemplateStore::new(false);
        let file = write_template(r#"{"6": "not a node"}"#);
        let err = store.load(file.path()).await.unwrap_err();
        assert_matches!(err, TemplateError::Malformed { .. });

        let empty = write_template("{}");
        let err = store.load(empty.path()).await.unwrap_err();
        assert_matches!(err, TemplateError::Malformed { .. });
    }

    #[tokio::test]
    async fn cached_store_returns_same_instance() {
        let store = TemplateStore::new(true);
        let file = write_template(TEMPLATE);
        let first = store.load(file.path()).await.unwrap();
        let second = store.load(file.path()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn uncached_store_rereads() {
        let store = TemplateStore::new(false);
        let file = write_template(TEMPLATE);
        let first = store.load(file.path()).await.unwrap();
        let second = store.load(file.path()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }
}
