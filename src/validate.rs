//! Job input validation. Runs before any side effect.

use serde_json::Value;

use crate::error::RelayError;

/// Longest accepted prompt, in characters after trimming.
pub const MAX_PROMPT_CHARS: usize = 2000;

/// A job input that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInput {
    /// The prompt, trimmed.
    pub prompt: String,
    /// The image payload as received (possibly data-URI prefixed).
    pub image_base64: String,
}

/// Validate a job's `input` object.
///
/// # Errors
///
/// Returns [`RelayError::Validation`] naming the first offending field.
pub fn validate_input(input: &Value) -> Result<ValidatedInput, RelayError> {
    let fields = input
        .as_object()
        .ok_or_else(|| RelayError::Validation("job input must be a JSON object".into()))?;

    let prompt = match fields.get("prompt") {
        None | Some(Value::Null) => {
            return Err(RelayError::Validation("Missing required 'prompt' parameter".into()))
        }
        Some(Value::String(s)) => validate_prompt(s)?,
        Some(_) => return Err(RelayError::Validation("'prompt' must be a string".into())),
    };

    let image_base64 = match fields.get("image") {
        None | Some(Value::Null) => {
            return Err(RelayError::Validation("Missing required 'image' parameter".into()))
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(RelayError::Validation("'image' must not be empty".into()))
        }
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(RelayError::Validation("'image' must be a base64 string".into())),
    };

    Ok(ValidatedInput { prompt, image_base64 })
}

/// Trim a prompt and check its length.
///
/// # Errors
///
/// Returns an error if the trimmed prompt is empty or longer than [`MAX_PROMPT_CHARS`].
pub fn validate_prompt(prompt: &str) -> Result<String, RelayError> {
    let trimmed = prompt.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        return Err(RelayError::Validation("'prompt' must not be empty".into()));
    }
    if len > MAX_PROMPT_CHARS {
        return Err(RelayError::Validation(format!(
            "'prompt' is {len} characters; the limit is {MAX_PROMPT_CHARS}"
        )));
    }
    Ok(trimmed.to_string())
}
