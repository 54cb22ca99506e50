//! Recording adapter for the `Engine` port.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use super::record_result;
use crate::cassette::recorder::CassetteRecorder;
use crate::ports::engine::{
    Engine, EngineFuture, HistoryEntry, ImageBytes, OutputImageRef, QueuedPrompt,
};

const PORT: &str = "engine";

/// Records every engine call while delegating to an inner implementation.
pub struct RecordingEngine {
    inner: Box<dyn Engine>,
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingEngine {
    /// Wrap `inner`, writing its interactions to `recorder`.
    pub fn new(inner: Box<dyn Engine>, recorder: Arc<Mutex<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }
}

impl Engine for RecordingEngine {
    fn probe(&self) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            let result = self.inner.probe().await;
            record_result(&self.recorder, PORT, "probe", &Value::Null, &result);
            result
        })
    }

    fn object_info(&self) -> EngineFuture<'_, BTreeSet<String>> {
        Box::pin(async move {
            let result = self.inner.object_info().await;
            record_result(&self.recorder, PORT, "object_info", &Value::Null, &result);
            result
        })
    }

    fn queue_prompt(&self, workflow: &Value) -> EngineFuture<'_, QueuedPrompt> {
        let workflow = workflow.clone();
        Box::pin(async move {
            let result: Result<QueuedPrompt, _> = self.inner.queue_prompt(&workflow).await;
            record_result(&self.recorder, PORT, "queue_prompt", &workflow, &result);
            result
        })
    }

    fn history(&self, prompt_id: &str) -> EngineFuture<'_, Option<HistoryEntry>> {
        let prompt_id = prompt_id.to_string();
        Box::pin(async move {
            let result = self.inner.history(&prompt_id).await;
            record_result(&self.recorder, PORT, "history", &json!({ "prompt_id": prompt_id }), &result);
            result
        })
    }

    fn view(&self, image: &OutputImageRef) -> EngineFuture<'_, ImageBytes> {
        let image = image.clone();
        Box::pin(async move {
            let result = self.inner.view(&image).await;
            record_result(&self.recorder, PORT, "view", &image, &result);
            result
        })
    }
}
