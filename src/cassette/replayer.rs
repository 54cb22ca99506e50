//! Serves recorded interactions back in order.

use std::collections::{HashMap, VecDeque};

use super::format::{Cassette, Interaction};

/// Replays a cassette. Each `(port, method)` pair has its own queue, so calls to
/// different methods may interleave differently than when recorded.
pub struct CassetteReplayer {
    queues: HashMap<(String, String), VecDeque<Interaction>>,
}

impl CassetteReplayer {
    /// Index a loaded cassette for replay.
    #[must_use]
    pub fn new(cassette: &Cassette) -> Self {
        let mut queues: HashMap<(String, String), VecDeque<Interaction>> = HashMap::new();
        let mut ordered = cassette.interactions.clone();
        ordered.sort_by_key(|i| i.seq);
        for interaction in ordered {
            queues
                .entry((interaction.port.clone(), interaction.method.clone()))
                .or_default()
                .push_back(interaction);
        }
        Self { queues }
    }

    /// Take the next recorded interaction for `port`/`method`.
    ///
    /// # Errors
    ///
    /// Returns an error naming what is available when the pair was never
    /// recorded or its interactions have all been served.
    pub fn next_interaction(&mut self, port: &str, method: &str) -> Result<Interaction, String> {
        let key = (port.to_string(), method.to_string());
        match self.queues.get_mut(&key) {
            Some(queue) => queue.pop_front().ok_or_else(|| {
                format!("Cassette exhausted: every {port}::{method} interaction has been replayed")
            }),
            None => {
                let mut available: Vec<String> =
                    self.queues.keys().map(|(p, m)| format!("{p}::{m}")).collect();
                available.sort();
                Err(format!(
                    "Cassette has no interactions recorded for {port}::{method}. \
                     Available: [{}]",
                    available.join(", ")
                ))
            }
        }
    }
}
