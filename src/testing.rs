//! Scripted in-memory engine for unit tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::error::RelayError;
use crate::ports::engine::{
    Engine, EngineFuture, HistoryEntry, ImageBytes, OutputImageRef, PromptStatus, QueuedPrompt,
};

/// Engine double that answers from a script and logs every call.
#[derive(Default)]
pub(crate) struct ScriptedEngine {
    /// Node types reported by `object_info`.
    pub nodes: BTreeSet<String>,
    /// Id returned by `queue_prompt`; `None` makes submission fail.
    pub prompt_id: Option<String>,
    /// History answers in order; once drained the prompt looks still queued.
    pub history: Mutex<VecDeque<Option<HistoryEntry>>>,
    /// Bytes served by `view`; `None` makes the download fail.
    pub image: Option<Vec<u8>>,
    /// Number of probes that fail before the engine reports ready.
    pub probe_failures: Mutex<usize>,
    /// Method names in call order.
    pub calls: Mutex<Vec<&'static str>>,
    /// The last workflow submitted.
    pub submitted: Mutex<Option<Value>>,
}

impl ScriptedEngine {
    /// An engine that accepts `prompt_id` and answers polls with `history`.
    pub fn new(prompt_id: &str, history: Vec<Option<HistoryEntry>>) -> Self {
        Self {
            prompt_id: Some(prompt_id.to_string()),
            history: Mutex::new(history.into()),
            ..Self::default()
        }
    }

    /// How many times `method` was called.
    pub fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| **m == method).count()
    }

    fn log(&self, method: &'static str) {
        self.calls.lock().unwrap().push(method);
    }
}

/// History entry whose `node` produced the given image filenames.
pub(crate) fn completed(node: &str, filenames: &[&str]) -> HistoryEntry {
    let images: Vec<Value> = filenames
        .iter()
        .map(|f| json!({"filename": f, "subfolder": "", "type": "output"}))
        .collect();
    HistoryEntry {
        status: Some(PromptStatus {
            status_str: Some("success".into()),
            completed: true,
            messages: Vec::new(),
        }),
        outputs: BTreeMap::from([(node.to_string(), json!({"images": images}))]),
    }
}

/// History entry reporting a failed execution.
pub(crate) fn failed(message: &str) -> HistoryEntry {
    HistoryEntry {
        status: Some(PromptStatus {
            status_str: Some("error".into()),
            completed: false,
            messages: vec![json!(["execution_error", {
                "node_id": "63",
                "node_type": "NunchakuFluxDiTLoader",
                "exception_message": message,
            }])],
        }),
        outputs: BTreeMap::new(),
    }
}

/// History entry for a prompt that has started but produced nothing yet.
pub(crate) fn running() -> HistoryEntry {
    HistoryEntry {
        status: Some(PromptStatus { status_str: None, completed: false, messages: Vec::new() }),
        outputs: BTreeMap::new(),
    }
}

impl Engine for ScriptedEngine {
    fn probe(&self) -> EngineFuture<'_, ()> {
        self.log("probe");
        let mut remaining = self.probe_failures.lock().unwrap();
        let result = if *remaining > 0 {
            *remaining -= 1;
            Err(RelayError::Engine("connection refused".into()))
        } else {
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn object_info(&self) -> EngineFuture<'_, BTreeSet<String>> {
        self.log("object_info");
        let nodes = self.nodes.clone();
        Box::pin(async move { Ok(nodes) })
    }

    fn queue_prompt(&self, workflow: &Value) -> EngineFuture<'_, QueuedPrompt> {
        self.log("queue_prompt");
        *self.submitted.lock().unwrap() = Some(workflow.clone());
        let result = self
            .prompt_id
            .clone()
            .map(|prompt_id| QueuedPrompt { prompt_id, number: Some(1) })
            .ok_or_else(|| RelayError::Submission("no prompt_id in response: {}".into()));
        Box::pin(async move { result })
    }

    fn history(&self, _prompt_id: &str) -> EngineFuture<'_, Option<HistoryEntry>> {
        self.log("history");
        let next = self.history.lock().unwrap().pop_front().unwrap_or_else(|| Some(running()));
        Box::pin(async move { Ok(next) })
    }

    fn view(&self, _image: &OutputImageRef) -> EngineFuture<'_, ImageBytes> {
        self.log("view");
        let result = self
            .image
            .clone()
            .map(ImageBytes)
            .ok_or_else(|| RelayError::Fetch("HTTP status server error (500)".into()));
        Box::pin(async move { result })
    }
}
