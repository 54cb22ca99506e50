//! Replaying adapter for the `Engine` port.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{next_output, replay_result};
use crate::cassette::replayer::CassetteReplayer;
use crate::error::RelayError;
use crate::ports::engine::{
    Engine, EngineFuture, HistoryEntry, ImageBytes, OutputImageRef, QueuedPrompt,
};

const PORT: &str = "engine";

/// Serves recorded engine responses from a cassette; never touches the network.
pub struct ReplayingEngine {
    replayer: Arc<Mutex<CassetteReplayer>>,
}

impl ReplayingEngine {
    /// Create a replaying engine backed by the given replayer.
    #[must_use]
    pub fn new(replayer: Arc<Mutex<CassetteReplayer>>) -> Self {
        Self { replayer }
    }

    /// Replay the next `method` output, mapping failures with `into_error`.
    fn replay<'a, T>(
        &self,
        method: &str,
        into_error: fn(String) -> RelayError,
    ) -> EngineFuture<'a, T>
    where
        T: DeserializeOwned + Send + 'a,
    {
        let result = next_output(&self.replayer, PORT, method)
            .and_then(replay_result::<T>)
            .map_err(into_error);
        Box::pin(async move { result })
    }
}

impl Engine for ReplayingEngine {
    fn probe(&self) -> EngineFuture<'_, ()> {
        self.replay("probe", RelayError::Engine)
    }

    fn object_info(&self) -> EngineFuture<'_, BTreeSet<String>> {
        self.replay("object_info", RelayError::Engine)
    }

    fn queue_prompt(&self, _workflow: &Value) -> EngineFuture<'_, QueuedPrompt> {
        self.replay("queue_prompt", RelayError::Submission)
    }

    fn history(&self, _prompt_id: &str) -> EngineFuture<'_, Option<HistoryEntry>> {
        self.replay("history", RelayError::Engine)
    }

    fn view(&self, _image: &OutputImageRef) -> EngineFuture<'_, ImageBytes> {
        self.replay("view", RelayError::Fetch)
    }
}
