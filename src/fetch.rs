//! Download of the finished workflow's output image.

use crate::error::RelayError;
use crate::ports::engine::{Engine, OutputImageRef};

/// Download `image` from the engine. A single attempt; any failure fails the job.
///
/// # Errors
///
/// Returns [`RelayError::Fetch`] if the request fails or the body is empty.
pub async fn fetch_output(engine: &dyn Engine, image: &OutputImageRef) -> Result<Vec<u8>, RelayError> {
    let bytes = engine.view(image).await?.0;
    if bytes.is_empty() {
        return Err(RelayError::Fetch(format!("engine returned an empty body for {}", image.filename)));
    }
    tracing::debug!(
        filename = %image.filename,
        subfolder = %image.subfolder,
        folder_type = %image.folder_type,
        bytes = bytes.len(),
        "downloaded output image"
    );
    Ok(bytes)
}
