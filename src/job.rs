//! Serverless job envelope and response payload.

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// An inbound job: `{"id"?: string, "input": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    /// Caller-assigned job id, used for log correlation. Numbers and booleans
    /// are kept in their JSON text form; anything else is dropped.
    #[serde(default, deserialize_with = "scalar_id")]
    pub id: Option<String>,
    /// Raw job input; validated before use.
    #[serde(default)]
    pub input: Value,
}

impl Job {
    /// Parse a job envelope from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Validation`] if the text is not a job object.
    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::Validation(format!("malformed job: {e}")))
    }
}

fn scalar_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        scalar @ (Value::Number(_) | Value::Bool(_)) => Some(scalar.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

/// The job response: the generated image, or an error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobOutput {
    /// The output image, base64-encoded.
    Image {
        /// Standard-alphabet base64 of the output image bytes.
        image_base64: String,
    },
    /// Why the job failed.
    Error {
        /// Human-readable failure description.
        error: String,
    },
}

impl JobOutput {
    /// Successful response carrying `bytes`.
    #[must_use]
    pub fn image(bytes: &[u8]) -> Self {
        Self::Image { image_base64: base64::engine::general_purpose::STANDARD.encode(bytes) }
    }

    /// Whether this is an error response.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl From<RelayError> for JobOutput {
    fn from(e: RelayError) -> Self {
        Self::Error { error: e.to_string() }
    }
}
