//! Engine readiness probing and process supervision.
//!
//! When asked to, the relay launches the engine itself at startup and holds
//! the child for its whole lifetime. Jobs are only accepted once the engine
//! answers its readiness probe. There is no restart: if the engine dies
//! later, the next job's requests fail like any other engine error.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::error::RelayError;
use crate::ports::Engine;

/// Delay between readiness probes.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Probe the engine until it answers or `timeout` elapses.
///
/// # Errors
///
/// Returns [`RelayError::Startup`] with the last probe failure on timeout.
pub async fn wait_until_ready(
    engine: &dyn Engine,
    timeout: Duration,
    interval: Duration,
) -> Result<(), RelayError> {
    probe_until_ready(engine, timeout, interval, || Ok(())).await
}

async fn probe_until_ready(
    engine: &dyn Engine,
    timeout: Duration,
    interval: Duration,
    mut still_alive: impl FnMut() -> Result<(), RelayError>,
) -> Result<(), RelayError> {
    let started = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        still_alive()?;
        attempts += 1;
        match engine.probe().await {
            Ok(()) => {
                tracing::info!(attempts, elapsed_s = started.elapsed().as_secs(), "engine is ready");
                return Ok(());
            }
            Err(e) => {
                if started.elapsed() >= timeout {
                    return Err(RelayError::Startup(format!(
                        "engine not ready after {}s ({attempts} probes): {e}",
                        timeout.as_secs()
                    )));
                }
                tracing::debug!(attempts, error = %e, "engine not ready yet");
            }
        }
        tokio::time::sleep(interval).await;
    }
}

/// A generation engine launched as a child process.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
}

impl EngineProcess {
    /// Launch `command` in `dir`. The child inherits stdout and stderr; its
    /// stdin is closed so it can't consume the job stream. It is killed
    /// when the handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Startup`] if the command is empty or can't be spawned.
    pub fn spawn(command: &[String], dir: &Path) -> Result<Self, RelayError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| RelayError::Startup("engine command is empty".into()))?;

        let child = Command::new(program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RelayError::Startup(format!("failed to launch {program} in {}: {e}", dir.display()))
            })?;

        tracing::info!(pid = ?child.id(), program = %program, dir = %dir.display(), "engine launched");
        Ok(Self { child })
    }

    /// Launch the engine and wait until it answers its readiness probe.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Startup`] if the launch fails, the child exits
    /// early, or it isn't ready within `timeout`.
    pub async fn start(
        command: &[String],
        dir: &Path,
        engine: &dyn Engine,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Self, RelayError> {
        let mut process = Self::spawn(command, dir)?;
        let ready = probe_until_ready(engine, timeout, interval, || process.check_alive()).await;
        match ready {
            Ok(()) => Ok(process),
            Err(e) => {
                let _ = process.child.start_kill();
                Err(e)
            }
        }
    }

    /// OS process id, while the child is running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn check_alive(&mut self) -> Result<(), RelayError> {
        match self.child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => {
                Err(RelayError::Startup(format!("engine exited during startup with {status}")))
            }
            Err(e) => Err(RelayError::Startup(format!("failed to check engine process: {e}"))),
        }
    }
}
