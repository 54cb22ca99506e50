//! CLI argument parsing with clap.

use std::path::PathBuf;

use clap::Parser;

/// Serverless job adapter: runs a prompt and an input image through a local ComfyUI workflow.
///
/// Without `--test-input` or `--job-file`, jobs are read from stdin as
/// newline-delimited JSON and one response line is written per job.
#[derive(Parser, Debug)]
#[command(name = "comfy-relay", version, about)]
pub struct Cli {
    /// Handle a single job given inline as JSON, e.g. '{"input": {"prompt": "...", "image": "..."}}'.
    #[arg(long, conflicts_with = "job_file")]
    pub test_input: Option<String>,

    /// Handle a single job read from a JSON file.
    #[arg(short, long, conflicts_with = "test_input")]
    pub job_file: Option<PathBuf>,

    /// Launch the engine as a child process and wait for it before accepting jobs.
    #[arg(long)]
    pub launch_engine: bool,

    /// Wait for an already running engine to become ready before accepting jobs.
    #[arg(long, conflicts_with = "launch_engine")]
    pub wait_ready: bool,

    /// Config file path override.
    #[arg(long)]
    pub config: Option<String>,

    /// Verbose logging (debug level unless RUST_LOG is set).
    #[arg(short, long)]
    pub verbose: bool,
}

/// Where jobs come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    /// One inline job.
    Inline(String),
    /// One job in a file.
    File(PathBuf),
    /// Newline-delimited jobs on stdin.
    Stdin,
}

impl Cli {
    /// Resolve the job source from the flags.
    #[must_use]
    pub fn job_source(&self) -> JobSource {
        if let Some(ref text) = self.test_input {
            JobSource::Inline(text.clone())
        } else if let Some(ref path) = self.job_file {
            JobSource::File(path.clone())
        } else {
            JobSource::Stdin
        }
    }
}
