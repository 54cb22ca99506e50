//! Per-job orchestration: validate, stage, patch, check, submit, poll, fetch.

use tracing::Instrument;

use crate::error::RelayError;
use crate::fetch::fetch_output;
use crate::ingest::Ingestor;
use crate::job::{Job, JobOutput};
use crate::nodes::check_required_nodes;
use crate::poll::Poller;
use crate::ports::Engine;
use crate::validate::validate_input;
use crate::workflow::{Workflow, STAGED_INPUT_FILENAME};

/// Turns jobs into engine runs. Holds everything a job needs so nothing is global.
pub struct Relay {
    engine: Box<dyn Engine>,
    workflow: Workflow,
    ingestor: Ingestor,
    poller: Poller,
    required_nodes: Vec<String>,
}

impl Relay {
    /// Assemble a relay. An empty `required_nodes` skips the capability check.
    #[must_use]
    pub fn new(
        engine: Box<dyn Engine>,
        workflow: Workflow,
        ingestor: Ingestor,
        poller: Poller,
        required_nodes: Vec<String>,
    ) -> Self {
        Self { engine, workflow, ingestor, poller, required_nodes }
    }

    /// The engine port jobs are sent to.
    #[must_use]
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Handle one job. Every failure becomes an error payload; nothing here is fatal.
    pub async fn handle(&self, job: &Job) -> JobOutput {
        let span = tracing::info_span!("job", id = job.id.as_deref().unwrap_or("-"));
        async {
            match self.run(&job.input).await {
                Ok(bytes) => {
                    tracing::info!(bytes = bytes.len(), "job succeeded");
                    JobOutput::image(&bytes)
                }
                Err(e) => {
                    tracing::warn!(kind = e.kind(), error = %e, "job failed");
                    JobOutput::from(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, input: &serde_json::Value) -> Result<Vec<u8>, RelayError> {
        let input = validate_input(input)?;
        tracing::debug!(prompt_chars = input.prompt.chars().count(), "input validated");

        self.ingestor.ingest(&input.image_base64)?;

        let workflow = self.workflow.patch(&input.prompt, STAGED_INPUT_FILENAME)?;

        check_required_nodes(self.engine(), &self.required_nodes).await?;

        let prompt_id = self.poller.submit(self.engine(), &workflow).await?;
        let image = self.poller.wait_for_output(self.engine(), &prompt_id).await?;
        fetch_output(self.engine(), &image).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use base64::Engine as _;
    use serde_json::{json, Value};

    use super::*;
    use crate::nodes::{default_required_nodes, REQUIRED_NODES};
    use crate::ports::engine::{EngineFuture, HistoryEntry, ImageBytes, OutputImageRef, QueuedPrompt};
    use crate::testing::{completed, failed, ScriptedEngine};
    use crate::workflow::WorkflowBindings;

    /// Lets a test keep inspecting the scripted engine after the relay takes ownership.
    struct Shared(Arc<ScriptedEngine>);

    impl Engine for Shared {
        fn probe(&self) -> EngineFuture<'_, ()> {
            self.0.probe()
        }
        fn object_info(&self) -> EngineFuture<'_, BTreeSet<String>> {
            self.0.object_info()
        }
        fn queue_prompt(&self, workflow: &Value) -> EngineFuture<'_, QueuedPrompt> {
            self.0.queue_prompt(workflow)
        }
        fn history(&self, prompt_id: &str) -> EngineFuture<'_, Option<HistoryEntry>> {
            self.0.history(prompt_id)
        }
        fn view(&self, image: &OutputImageRef) -> EngineFuture<'_, ImageBytes> {
            self.0.view(image)
        }
    }

    struct Fixture {
        relay: Relay,
        engine: Arc<ScriptedEngine>,
        staged: std::path::PathBuf,
        _dir: tempfile::TempDir,
    }

    fn fixture(engine: ScriptedEngine) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("input").join(STAGED_INPUT_FILENAME);
        let engine = Arc::new(engine);
        let relay = Relay::new(
            Box::new(Shared(Arc::clone(&engine))),
            Workflow::bundled(WorkflowBindings::default()).unwrap(),
            Ingestor::new(staged.clone(), 20 * 1024 * 1024),
            Poller::new(Duration::from_secs(1), Duration::from_secs(300), "95"),
            default_required_nodes(),
        );
        Fixture { relay, engine, staged, _dir: dir }
    }

    fn all_nodes() -> BTreeSet<String> {
        REQUIRED_NODES.iter().map(ToString::to_string).collect()
    }

    fn png_like(len: usize) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.resize(len, 0x42);
        bytes
    }

    fn job(prompt: &str, image: &[u8]) -> Job {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        Job {
            id: Some("test-job".into()),
            input: json!({"prompt": prompt, "image": format!("data:image/png;base64,{encoded}")}),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_job_returns_fetched_bytes() {
        let output_bytes: Vec<u8> = (0..50).collect();
        let engine = ScriptedEngine {
            nodes: all_nodes(),
            image: Some(output_bytes.clone()),
            ..ScriptedEngine::new("abc", vec![Some(completed("95", &["out.webp"]))])
        };
        let f = fixture(engine);

        let output = f.relay.handle(&job("a cat", &png_like(1024))).await;

        let JobOutput::Image { image_base64 } = output else { panic!("expected an image response") };
        let decoded = base64::engine::general_purpose::STANDARD.decode(image_base64).unwrap();
        assert_eq!(decoded, output_bytes);

        assert_eq!(std::fs::read(&f.staged).unwrap(), png_like(1024));
        let submitted = f.engine.submitted.lock().unwrap().clone().unwrap();
        assert_eq!(submitted["56"]["inputs"]["text"], "a cat");
        assert_eq!(submitted["1"]["inputs"]["image"], STAGED_INPUT_FILENAME);
        assert_eq!(
            *f.engine.calls.lock().unwrap(),
            vec!["object_info", "queue_prompt", "history", "view"]
        );
    }

    #[tokio::test]
    async fn invalid_input_never_touches_engine_or_disk() {
        let f = fixture(ScriptedEngine::new("abc", vec![]));
        let output = f.relay.handle(&Job { id: None, input: json!({"image": "aGVsbG8="}) }).await;
        assert_eq!(output, JobOutput::Error { error: "Invalid input: Missing required 'prompt' parameter".into() });
        assert!(f.engine.calls.lock().unwrap().is_empty());
        assert!(!f.staged.exists());
    }

    #[tokio::test]
    async fn undecodable_image_is_reported() {
        let f = fixture(ScriptedEngine::new("abc", vec![]));
        let input = json!({"prompt": "a cat", "image": "data:image/png;base64,***"});
        let output = f.relay.handle(&Job { id: None, input }).await;
        let JobOutput::Error { error } = output else { panic!("expected error") };
        assert!(error.starts_with("Failed to decode input image"), "{error}");
        assert!(f.engine.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tiny_image_is_a_size_error() {
        let f = fixture(ScriptedEngine::new("abc", vec![]));
        let output = f.relay.handle(&job("a cat", &png_like(40))).await;
        let JobOutput::Error { error } = output else { panic!("expected error") };
        assert!(error.starts_with("Input image rejected"), "{error}");
    }

    #[tokio::test]
    async fn missing_nodes_fail_before_submission() {
        let mut nodes = all_nodes();
        nodes.remove("SaveImagePlus");
        let engine = ScriptedEngine { nodes, ..ScriptedEngine::new("abc", vec![]) };
        let f = fixture(engine);

        let output = f.relay.handle(&job("a cat", &png_like(512))).await;
        assert_eq!(
            output,
            JobOutput::Error { error: "Engine is missing required node types: SaveImagePlus".into() }
        );
        assert_eq!(f.engine.calls_to("queue_prompt"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn execution_error_is_reported() {
        let engine = ScriptedEngine {
            nodes: all_nodes(),
            ..ScriptedEngine::new("abc", vec![Some(failed("CUDA out of memory"))])
        };
        let f = fixture(engine);
        let output = f.relay.handle(&job("a cat", &png_like(512))).await;
        let JobOutput::Error { error } = output else { panic!("expected error") };
        assert!(error.contains("CUDA out of memory"), "{error}");
        assert_eq!(f.engine.calls_to("view"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn capability_check_can_be_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine {
            image: Some(vec![1; 64]),
            ..ScriptedEngine::new("abc", vec![Some(completed("95", &["out.webp"]))])
        });
        let relay = Relay::new(
            Box::new(Shared(Arc::clone(&engine))),
            Workflow::bundled(WorkflowBindings::default()).unwrap(),
            Ingestor::new(dir.path().join(STAGED_INPUT_FILENAME), 1024 * 1024),
            Poller::new(Duration::from_secs(1), Duration::from_secs(300), "95"),
            Vec::new(),
        );
        assert!(!relay.handle(&job("a cat", &png_like(256))).await.is_error());
        assert_eq!(engine.calls_to("object_info"), 0);
    }
}
