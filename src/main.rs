//! comfy-relay - serverless job adapter for a local ComfyUI workflow.

mod adapters;
mod cassette;
mod cli;
mod config;
mod context;
mod error;
mod fetch;
mod handler;
mod ingest;
mod job;
mod nodes;
mod poll;
mod ports;
mod supervisor;
#[cfg(test)]
mod testing;
mod validate;
mod workflow;

use std::process;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, JobSource};
use crate::config::Config;
use crate::context::{Mode, ServiceContext};
use crate::error::RelayError;
use crate::handler::Relay;
use crate::ingest::Ingestor;
use crate::job::{Job, JobOutput};
use crate::poll::Poller;
use crate::supervisor::{wait_until_ready, EngineProcess, PROBE_INTERVAL};
use crate::workflow::{Workflow, STAGED_INPUT_FILENAME};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Log to stderr; stdout carries job responses only.
fn init_tracing(verbose: bool) {
    let default = if verbose { "comfy_relay=debug,warn" } else { "comfy_relay=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<(), RelayError> {
    // Load config
    let config_path = config::discover_config_path(cli.config.as_deref());
    let config = Config::load(&config_path).map_err(RelayError::Config)?;

    let bindings = config.workflow.bindings.clone();
    let workflow = match config.workflow.path {
        Some(ref path) => Workflow::from_file(path, bindings)?,
        None => Workflow::bundled(bindings)?,
    };

    tracing::info!(
        host = %config.engine_host(),
        engine_dir = %config.engine_dir().display(),
        max_image_bytes = config.max_image_bytes(),
        poll_interval_ms = u64::try_from(config.poll_interval().as_millis()).unwrap_or(u64::MAX),
        poll_timeout_s = config.poll_timeout().as_secs(),
        "configuration loaded"
    );

    let mode = Mode::from_env();
    match mode {
        Mode::Live => {}
        Mode::Recording => tracing::info!("recording engine interactions"),
        Mode::Replaying(ref path) => {
            tracing::info!(cassette = %path.display(), "replaying engine interactions");
        }
    }
    let (ctx, recording_session) = ServiceContext::for_mode(&mode, &config)?;

    // Bring the engine up before accepting jobs
    let engine_process = if cli.launch_engine {
        let process = EngineProcess::start(
            &config.engine.command,
            &config.engine_dir(),
            ctx.engine.as_ref(),
            config.startup_timeout(),
            PROBE_INTERVAL,
        )
        .await?;
        Some(process)
    } else {
        if cli.wait_ready {
            wait_until_ready(ctx.engine.as_ref(), config.startup_timeout(), PROBE_INTERVAL).await?;
        }
        None
    };

    let required_nodes = if config.workflow.check_nodes {
        config.workflow.required_nodes.clone().unwrap_or_else(nodes::default_required_nodes)
    } else {
        Vec::new()
    };
    let output_node = workflow.bindings().output_node.clone();

    let ingestor =
        Ingestor::new(config.staged_input_path(STAGED_INPUT_FILENAME), config.max_image_bytes());
    tracing::info!(
        staged_input = %ingestor.staged_path().display(),
        required_nodes = required_nodes.len(),
        "accepting jobs"
    );

    let relay = Relay::new(
        ctx.engine,
        workflow,
        ingestor,
        Poller::new(config.poll_interval(), config.poll_timeout(), output_node),
        required_nodes,
    );

    let mut tally = Tally::default();
    match cli.job_source() {
        JobSource::Inline(text) => tally.add(&respond(&relay, &text).await),
        JobSource::File(path) => {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                RelayError::Config(format!("Failed to read job file {}: {e}", path.display()))
            })?;
            tally.add(&respond(&relay, &text).await);
        }
        JobSource::Stdin => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                tally.add(&respond(&relay, &line).await);
            }
        }
    }
    tracing::info!(jobs = tally.handled, failed = tally.failed, "job stream finished");

    // The recorder is shared with the relay's engine
    drop(relay);
    if let Some(session) = recording_session {
        match session.finish() {
            Ok(path) => tracing::info!(path = %path.display(), "cassette saved"),
            Err(e) => tracing::warn!("failed to save cassette: {e}"),
        }
    }

    if let Some(process) = engine_process {
        tracing::info!(pid = ?process.id(), "stopping engine");
    }

    Ok(())
}

#[derive(Default)]
struct Tally {
    handled: usize,
    failed: usize,
}

impl Tally {
    fn add(&mut self, output: &JobOutput) {
        self.handled += 1;
        if output.is_error() {
            self.failed += 1;
        }
    }
}

/// Handle one job's JSON text and write its response line to stdout.
async fn respond(relay: &Relay, text: &str) -> JobOutput {
    let output = match Job::from_json(text) {
        Ok(job) => relay.handle(&job).await,
        Err(e) => {
            tracing::warn!(kind = e.kind(), error = %e, "rejected job");
            JobOutput::from(e)
        }
    };
    match serde_json::to_string(&output) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize job response"),
    }
    output
}
