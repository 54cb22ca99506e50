//! Configuration file loading with environment variable overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::workflow::WorkflowBindings;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Generation engine location and launch settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Input size limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// History polling cadence and bound.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Workflow template and node bindings.
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Generation engine settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `host:port` of the engine's HTTP API.
    pub host: String,
    /// Engine install directory; the staged input lives under `<dir>/input`.
    pub dir: PathBuf,
    /// Command used to launch the engine, run from `dir`.
    pub command: Vec<String>,
    /// How long to wait for a launched engine to answer its readiness probe.
    pub startup_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:8188".to_string(),
            dir: PathBuf::from("/workspace/ComfyUI"),
            command: [
                "python3",
                "main.py",
                "--listen",
                "127.0.0.1",
                "--port",
                "8188",
                "--disable-auto-launch",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            startup_timeout_secs: 120,
        }
    }
}

/// Input size limits.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted decoded input image, in MiB.
    pub max_image_mb: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_image_mb: 20 }
    }
}

/// History polling settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between history polls, in milliseconds.
    pub interval_ms: u64,
    /// Wall-clock bound on waiting for a submitted workflow, in seconds.
    pub timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 1000, timeout_secs: 300 }
    }
}

/// Workflow template settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Template file to use instead of the bundled one.
    pub path: Option<PathBuf>,
    /// Query the engine for required node types before submitting.
    pub check_nodes: bool,
    /// Node types the engine must provide; the bundled list when unset.
    pub required_nodes: Option<Vec<String>>,
    /// Node ids and input fields patched per job.
    pub bindings: WorkflowBindings,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            path: None,
            check_nodes: true,
            required_nodes: None,
            bindings: WorkflowBindings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the given path, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
    }

    /// Engine `host:port`, preferring `COMFY_HOST`.
    #[must_use]
    pub fn engine_host(&self) -> String {
        std::env::var("COMFY_HOST").ok().unwrap_or_else(|| self.engine.host.clone())
    }

    /// Engine install directory, preferring `COMFY_DIR`.
    #[must_use]
    pub fn engine_dir(&self) -> PathBuf {
        std::env::var("COMFY_DIR").map_or_else(|_| self.engine.dir.clone(), PathBuf::from)
    }

    /// Where each job's decoded input image is written.
    #[must_use]
    pub fn staged_input_path(&self, filename: &str) -> PathBuf {
        self.engine_dir().join("input").join(filename)
    }

    /// Largest accepted decoded image in bytes, preferring `MAX_IMAGE_SIZE_MB`.
    #[must_use]
    pub fn max_image_bytes(&self) -> usize {
        let mb = env_number("MAX_IMAGE_SIZE_MB").unwrap_or(self.limits.max_image_mb);
        usize::try_from(mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }

    /// Delay between history polls, preferring `COMFY_POLL_INTERVAL_MS`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(env_number("COMFY_POLL_INTERVAL_MS").unwrap_or(self.polling.interval_ms))
    }

    /// Polling bound, preferring `COMFY_POLL_TIMEOUT_SECS`.
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(env_number("COMFY_POLL_TIMEOUT_SECS").unwrap_or(self.polling.timeout_secs))
    }

    /// Engine startup bound.
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.startup_timeout_secs)
    }
}

/// Parse a numeric environment variable, ignoring (with a warning) values that don't parse.
fn env_number<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring non-numeric environment override");
            None
        }
    }
}

/// Discover the config file path using the resolution order:
/// 1. Explicit path (from `--config` flag)
/// 2. `COMFY_RELAY_CONFIG` environment variable
/// 3. `~/.config/comfy-relay/config.toml`
#[must_use]
pub fn discover_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(p) = explicit {
        return PathBuf::from(p);
    }

    if let Ok(p) = std::env::var("COMFY_RELAY_CONFIG") {
        return PathBuf::from(p);
    }

    default_config_path()
}

/// Default config path: `~/.config/comfy-relay/config.toml`.
fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config/comfy-relay/config.toml")
    } else {
        PathBuf::from("comfy-relay.toml")
    }
}
