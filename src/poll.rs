//! Workflow submission and history polling.
//!
//! `submit` posts the patched workflow and returns the engine's prompt id.
//! `wait_for_output` then polls the history at a fixed interval until one of:
//! the engine reports an error status, the output node has images, outputs
//! exist without them, or the wall-clock bound elapses.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::error::RelayError;
use crate::ports::engine::{Engine, HistoryEntry, OutputImageRef};

/// Submits workflows and waits for their designated output.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
    output_node: String,
}

impl Poller {
    /// Poll every `interval`, give up after `timeout`, return images of `output_node`.
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration, output_node: impl Into<String>) -> Self {
        Self { interval, timeout, output_node: output_node.into() }
    }

    /// Queue `workflow` and return its prompt id.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Submission`] if the engine is unreachable or
    /// doesn't hand back a prompt id.
    pub async fn submit(&self, engine: &dyn Engine, workflow: &Value) -> Result<String, RelayError> {
        let queued = engine.queue_prompt(workflow).await?;
        tracing::info!(prompt_id = %queued.prompt_id, queue_number = ?queued.number, "workflow queued");
        Ok(queued.prompt_id)
    }

    /// Poll the engine until `prompt_id` produces the designated output.
    ///
    /// # Errors
    ///
    /// Returns an execution, output-missing, timeout or engine error. A
    /// failed history request ends the wait; it is not retried.
    pub async fn wait_for_output(
        &self,
        engine: &dyn Engine,
        prompt_id: &str,
    ) -> Result<OutputImageRef, RelayError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            if started.elapsed() > self.timeout {
                tracing::warn!(prompt_id, attempts, "gave up waiting for workflow");
                return Err(RelayError::Timeout(self.timeout));
            }

            attempts += 1;
            if let Some(entry) = engine.history(prompt_id).await? {
                if let Some(image) = self.inspect(&entry)? {
                    tracing::info!(
                        prompt_id,
                        attempts,
                        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        filename = %image.filename,
                        "workflow finished"
                    );
                    return Ok(image);
                }
                let completed = entry.status.as_ref().is_some_and(|s| s.completed);
                tracing::trace!(prompt_id, attempts, completed, "workflow still running");
            } else {
                tracing::trace!(prompt_id, attempts, "workflow not in history yet");
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Classify one history observation: `Some` when the output is ready,
    /// `None` while still running, an error when the run is over without it.
    fn inspect(&self, entry: &HistoryEntry) -> Result<Option<OutputImageRef>, RelayError> {
        if let Some(status) = entry.status.as_ref().filter(|s| s.is_error()) {
            return Err(RelayError::Execution(status.error_summary()));
        }

        if entry.outputs.is_empty() {
            return Ok(None);
        }

        let images = entry.node_images(&self.output_node).map_err(|e| {
            RelayError::OutputMissing(format!("node {} images are unreadable: {e}", self.output_node))
        })?;
        match images.into_iter().next() {
            Some(image) => Ok(Some(image)),
            None => {
                let produced: Vec<&str> = entry.outputs.keys().map(String::as_str).collect();
                Err(RelayError::OutputMissing(format!(
                    "node {} produced no images (outputs from nodes: {})",
                    self.output_node,
                    produced.join(", ")
                )))
            }
        }
    }
}
