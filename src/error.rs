//! Unified error type for comfy-relay.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while relaying a job to the generation engine.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The job payload is missing a field or a field has the wrong shape.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The image payload is not valid base64.
    #[error("Failed to decode input image: {0}")]
    Decoding(String),

    /// The decoded image is outside the accepted size bounds.
    #[error("Input image rejected: {0}")]
    Size(String),

    /// The engine does not provide every node type the workflow needs.
    #[error("Engine is missing required node types: {}", .0.join(", "))]
    Capability(Vec<String>),

    /// The engine could not be reached or rejected the workflow submission.
    #[error("Failed to queue workflow: {0}")]
    Submission(String),

    /// The engine reported that the workflow failed.
    #[error("Workflow execution failed: {0}")]
    Execution(String),

    /// The workflow did not finish within the polling bound.
    #[error("Timeout waiting for workflow completion after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Downloading the output image failed.
    #[error("Failed to download output image: {0}")]
    Fetch(String),

    /// The workflow finished without producing the expected output image.
    #[error("Expected output not found: {0}")]
    OutputMissing(String),

    /// A status or introspection request to the engine failed.
    #[error("Engine request failed: {0}")]
    Engine(String),

    /// The workflow template cannot be patched.
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// The engine could not be started or never became ready.
    #[error("Engine startup failed: {0}")]
    Startup(String),
}

impl RelayError {
    /// Short, stable name of the error kind for log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Decoding(_) => "decoding",
            Self::Size(_) => "size",
            Self::Capability(_) => "capability",
            Self::Submission(_) => "submission",
            Self::Execution(_) => "execution",
            Self::Timeout(_) => "timeout",
            Self::Fetch(_) => "fetch",
            Self::OutputMissing(_) => "output_missing",
            Self::Engine(_) => "engine",
            Self::Workflow(_) => "workflow",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::Startup(_) => "startup",
        }
    }

    /// The detail carried by the variant, without its `Display` prefix.
    ///
    /// Rebuilding the same variant from this text reproduces the original error.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Validation(m)
            | Self::Decoding(m)
            | Self::Size(m)
            | Self::Submission(m)
            | Self::Execution(m)
            | Self::Fetch(m)
            | Self::OutputMissing(m)
            | Self::Engine(m)
            | Self::Workflow(m)
            | Self::Config(m)
            | Self::Startup(m) => m.clone(),
            Self::Capability(nodes) => nodes.join(", "),
            Self::Timeout(_) | Self::Io(_) => self.to_string(),
        }
    }
}
