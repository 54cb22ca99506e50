//! Live adapter for the ComfyUI HTTP API.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::error::RelayError;
use crate::ports::engine::{
    Engine, EngineFuture, HistoryEntry, ImageBytes, OutputImageRef, QueuedPrompt,
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const OBJECT_INFO_TIMEOUT: Duration = Duration::from_secs(30);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
const HISTORY_TIMEOUT: Duration = Duration::from_secs(10);
const VIEW_TIMEOUT: Duration = Duration::from_secs(30);

/// Live engine client that talks to a ComfyUI server.
pub struct ComfyEngine {
    client: Client,
    base_url: String,
}

impl ComfyEngine {
    /// Create a client for the engine at `host` (`host:port`, or a full `http(s)://` URL).
    #[must_use]
    pub fn new(host: &str) -> Self {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{host}")
        };
        Self { client: Client::new(), base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Engine for ComfyEngine {
    fn probe(&self) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.url("/"))
                .timeout(PROBE_TIMEOUT)
                .send()
                .await
                .map_err(|e| RelayError::Engine(format!("readiness probe failed: {e}")))?;

            if response.status() == reqwest::StatusCode::OK {
                Ok(())
            } else {
                Err(RelayError::Engine(format!("readiness probe returned {}", response.status())))
            }
        })
    }

    fn object_info(&self) -> EngineFuture<'_, BTreeSet<String>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.url("/object_info"))
                .timeout(OBJECT_INFO_TIMEOUT)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| RelayError::Engine(format!("failed to query node types: {e}")))?;

            let nodes: HashMap<String, Value> = response
                .json()
                .await
                .map_err(|e| RelayError::Engine(format!("failed to parse node types: {e}")))?;

            Ok(nodes.into_keys().collect())
        })
    }

    fn queue_prompt(&self, workflow: &Value) -> EngineFuture<'_, QueuedPrompt> {
        let body = serde_json::json!({ "prompt": workflow });
        Box::pin(async move {
            let response = self
                .client
                .post(self.url("/prompt"))
                .timeout(SUBMIT_TIMEOUT)
                .json(&body)
                .send()
                .await
                .map_err(|e| RelayError::Submission(e.to_string()))?;

            let status = response.status();
            let response_text =
                response.text().await.map_err(|e| RelayError::Submission(e.to_string()))?;

            if !status.is_success() {
                return Err(RelayError::Submission(format!(
                    "engine returned {status}: {}",
                    truncate(&response_text)
                )));
            }

            let parsed: Value = serde_json::from_str(&response_text).map_err(|e| {
                RelayError::Submission(format!("failed to parse response: {e}"))
            })?;

            let prompt_id = parsed
                .get("prompt_id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    RelayError::Submission(format!(
                        "no prompt_id in response: {}",
                        truncate(&response_text)
                    ))
                })?;

            Ok(QueuedPrompt {
                prompt_id: prompt_id.to_string(),
                number: parsed.get("number").and_then(Value::as_i64),
            })
        })
    }

    fn history(&self, prompt_id: &str) -> EngineFuture<'_, Option<HistoryEntry>> {
        let prompt_id = prompt_id.to_string();
        Box::pin(async move {
            let response = self
                .client
                .get(self.url(&format!("/history/{prompt_id}")))
                .timeout(HISTORY_TIMEOUT)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| RelayError::Engine(format!("failed to check workflow status: {e}")))?;

            let mut history: HashMap<String, HistoryEntry> = response.json().await.map_err(|e| {
                RelayError::Engine(format!("failed to parse workflow status: {e}"))
            })?;

            Ok(history.remove(&prompt_id))
        })
    }

    fn view(&self, image: &OutputImageRef) -> EngineFuture<'_, ImageBytes> {
        let image = image.clone();
        Box::pin(async move {
            let response = self
                .client
                .get(self.url("/view"))
                .query(&[
                    ("filename", image.filename.as_str()),
                    ("subfolder", image.subfolder.as_str()),
                    ("type", image.folder_type.as_str()),
                ])
                .timeout(VIEW_TIMEOUT)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| RelayError::Fetch(e.to_string()))?;

            let bytes = response.bytes().await.map_err(|e| RelayError::Fetch(e.to_string()))?;
            Ok(ImageBytes(bytes.to_vec()))
        })
    }
}

/// Clip a response body for inclusion in an error message.
fn truncate(body: &str) -> String {
    const LIMIT: usize = 500;
    if body.chars().count() > LIMIT {
        format!("{}...", body.chars().take(LIMIT).collect::<String>())
    } else {
        body.to_string()
    }
}
