//! Engine port for the ComfyUI HTTP API.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// Response to a workflow submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPrompt {
    /// Identifier used to poll the engine's history.
    pub prompt_id: String,
    /// Position in the engine's queue, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
}

/// One prompt's entry in the engine's history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Execution status, absent while the prompt is still queued.
    #[serde(default)]
    pub status: Option<PromptStatus>,
    /// Raw outputs per node id. Only the node asked for is ever interpreted.
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl HistoryEntry {
    /// Images written by `node`; empty when it wrote none.
    ///
    /// # Errors
    ///
    /// Returns an error if the node's `images` list doesn't hold image references.
    pub fn node_images(&self, node: &str) -> Result<Vec<OutputImageRef>, serde_json::Error> {
        match self.outputs.get(node).and_then(|out| out.get("images")) {
            Some(images) => Vec::<OutputImageRef>::deserialize(images),
            None => Ok(Vec::new()),
        }
    }
}

/// Execution status reported by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptStatus {
    /// `"success"` or `"error"` once the prompt has run.
    #[serde(default)]
    pub status_str: Option<String>,
    /// Whether execution finished.
    #[serde(default)]
    pub completed: bool,
    /// Execution events as `[event_name, payload]` pairs.
    #[serde(default)]
    pub messages: Vec<Value>,
}

impl PromptStatus {
    /// Whether the engine reported a failed execution.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status_str.as_deref() == Some("error")
    }

    /// Human-readable summary of the reported execution errors.
    ///
    /// Uses the `execution_error` events when present and falls back to the
    /// raw message list otherwise.
    #[must_use]
    pub fn error_summary(&self) -> String {
        let errors: Vec<String> = self
            .messages
            .iter()
            .filter_map(|m| {
                let pair = m.as_array()?;
                if pair.first()?.as_str()? != "execution_error" {
                    return None;
                }
                let data = pair.get(1)?;
                let message = data
                    .get("exception_message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .trim();
                let node_id = data.get("node_id").and_then(Value::as_str);
                let node_type = data.get("node_type").and_then(Value::as_str);
                Some(match (node_id, node_type) {
                    (Some(id), Some(ty)) => format!("node {id} ({ty}): {message}"),
                    (Some(id), None) => format!("node {id}: {message}"),
                    _ => message.to_string(),
                })
            })
            .collect();

        if errors.is_empty() {
            serde_json::to_string(&self.messages).unwrap_or_else(|_| "no details".to_string())
        } else {
            errors.join("; ")
        }
    }
}

/// Reference to an image served by the engine's `/view` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputImageRef {
    /// File name within the folder.
    pub filename: String,
    /// Subfolder below the folder type's root.
    #[serde(default)]
    pub subfolder: String,
    /// Folder type (`"output"`, `"temp"`, `"input"`).
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    "output".to_string()
}

/// Raw image bytes downloaded from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBytes(#[serde(with = "base64_bytes")] pub Vec<u8>);

/// Boxed future type returned by [`Engine`] methods.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RelayError>> + Send + 'a>>;

/// The generation engine's HTTP API.
pub trait Engine: Send + Sync {
    /// Succeeds when the engine's root endpoint answers with HTTP 200.
    fn probe(&self) -> EngineFuture<'_, ()>;

    /// Names of every node type the engine has registered.
    fn object_info(&self) -> EngineFuture<'_, BTreeSet<String>>;

    /// Queue a workflow for execution.
    fn queue_prompt(&self, workflow: &Value) -> EngineFuture<'_, QueuedPrompt>;

    /// History entry for a prompt, `None` while the engine has no record of it.
    fn history(&self, prompt_id: &str) -> EngineFuture<'_, Option<HistoryEntry>>;

    /// Download an output image.
    fn view(&self, image: &OutputImageRef) -> EngineFuture<'_, ImageBytes>;
}

/// Serde helper for serializing `Vec<u8>` as base64 strings in cassettes.
mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as base64 string.
    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        serializer.serialize_str(&encoded)
    }

    /// Deserialize base64 string to bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
