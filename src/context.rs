//! Service context: which `Engine` adapter the relay talks through.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::adapters::live::comfy::ComfyEngine;
use crate::adapters::recording::engine::RecordingEngine;
use crate::adapters::replaying::engine::ReplayingEngine;
use crate::cassette::loader::load_cassette;
use crate::cassette::recorder::CassetteRecorder;
use crate::config::Config;
use crate::error::RelayError;
use crate::ports::Engine;

/// Directory recordings are written under, one timestamped folder per session.
const CASSETTE_ROOT: &str = ".comfy-relay/cassettes";

/// How engine calls are served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Straight to the engine over HTTP.
    Live,
    /// Live, with every interaction written to a cassette.
    Recording,
    /// From a cassette file; the engine is never contacted.
    Replaying(PathBuf),
}

impl Mode {
    /// Read the mode from `COMFY_RELAY_REPLAY` and `COMFY_RELAY_REC`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("COMFY_RELAY_REPLAY").ok().as_deref(),
            std::env::var("COMFY_RELAY_REC").ok().as_deref(),
        )
    }

    /// Replay wins over recording; recording needs `1` or `true`.
    fn from_vars(replay: Option<&str>, rec: Option<&str>) -> Self {
        match (replay.filter(|p| !p.is_empty()), rec) {
            (Some(path), _) => Self::Replaying(PathBuf::from(path)),
            (None, Some("1" | "true")) => Self::Recording,
            _ => Self::Live,
        }
    }
}

/// Bundles the port trait objects the relay needs.
pub struct ServiceContext {
    /// Generation engine port.
    pub engine: Box<dyn Engine>,
}

/// An open recording. Finish it once the engine it feeds has been dropped.
pub struct RecordingSession {
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingSession {
    /// Write the cassette and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the recording engine is still alive or the file
    /// cannot be written.
    pub fn finish(self) -> Result<PathBuf, String> {
        let recorder = Arc::try_unwrap(self.recorder)
            .map_err(|_| "recording engine is still in use".to_string())?
            .into_inner()
            .map_err(|e| format!("recorder lock poisoned: {e}"))?;
        recorder.finish().map_err(|e| format!("failed to write cassette: {e}"))
    }
}

impl ServiceContext {
    /// Build the context for `mode`. Recording also hands back the session to finish.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if a replay cassette cannot be loaded.
    pub fn for_mode(
        mode: &Mode,
        config: &Config,
    ) -> Result<(Self, Option<RecordingSession>), RelayError> {
        match mode {
            Mode::Live => Ok((Self::live(config), None)),
            Mode::Recording => {
                let (ctx, session) = Self::recording(config);
                Ok((ctx, Some(session)))
            }
            Mode::Replaying(path) => Ok((Self::replaying(path)?, None)),
        }
    }

    /// Talk to the configured engine host.
    #[must_use]
    pub fn live(config: &Config) -> Self {
        Self { engine: Box::new(ComfyEngine::new(&config.engine_host())) }
    }

    /// Talk to the engine and record every interaction.
    #[must_use]
    pub fn recording(config: &Config) -> (Self, RecordingSession) {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        let path = Path::new(CASSETTE_ROOT).join(&timestamp).join("engine.cassette.yaml");
        let recorder = CassetteRecorder::new(path, format!("{timestamp}-engine"), source_revision());
        Self::recorded(Box::new(ComfyEngine::new(&config.engine_host())), recorder)
    }

    /// Route calls through `inner`, writing each one to `recorder`.
    fn recorded(inner: Box<dyn Engine>, recorder: CassetteRecorder) -> (Self, RecordingSession) {
        let recorder = Arc::new(Mutex::new(recorder));
        let engine = RecordingEngine::new(inner, Arc::clone(&recorder));
        (Self { engine: Box::new(engine) }, RecordingSession { recorder })
    }

    /// Serve engine calls from the cassette at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the cassette cannot be read or parsed.
    pub fn replaying(path: &Path) -> Result<Self, RelayError> {
        let replayer = load_cassette(path)
            .map_err(|e| RelayError::Config(format!("Failed to load cassette: {e}")))?;
        Ok(Self { engine: Box::new(ReplayingEngine::new(Arc::new(Mutex::new(replayer)))) })
    }
}

/// `git rev-parse HEAD` of the working directory, or `unknown`.
fn source_revision() -> String {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map_or_else(|| "unknown".to_string(), |s| s.trim().to_string())
}
