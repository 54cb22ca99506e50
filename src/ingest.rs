//! Decoding and staging of the job's input image.

use std::path::{Path, PathBuf};

use base64::Engine;

use crate::error::RelayError;

/// Smallest plausible image; anything shorter is treated as truncated.
pub const MIN_IMAGE_BYTES: usize = 100;

/// Decodes input images and writes them to the single staging slot the
/// workflow's image loader reads from.
#[derive(Debug, Clone)]
pub struct Ingestor {
    staged_path: PathBuf,
    max_bytes: usize,
}

impl Ingestor {
    /// Stage images at `staged_path`, rejecting decoded payloads over `max_bytes`.
    #[must_use]
    pub fn new(staged_path: PathBuf, max_bytes: usize) -> Self {
        Self { staged_path, max_bytes }
    }

    /// Where images are staged.
    #[must_use]
    pub fn staged_path(&self) -> &Path {
        &self.staged_path
    }

    /// Decode `image_base64`, check its size and write it to the staging path,
    /// replacing whatever the previous job left there.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns a decoding, size or I/O error. Nothing is written unless the
    /// payload decodes and is within bounds.
    pub fn ingest(&self, image_base64: &str) -> Result<usize, RelayError> {
        // Padding makes the estimate overshoot by at most two bytes
        let estimate = base64::decoded_len_estimate(encoded_symbols(image_base64));
        if estimate > self.max_bytes.saturating_add(2) {
            return Err(RelayError::Size(format!(
                "image is about {estimate} bytes; the limit is {} bytes",
                self.max_bytes
            )));
        }

        let data = decode_image(image_base64)?;
        check_size(data.len(), self.max_bytes)?;

        if let Some(parent) = self.staged_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.staged_path, &data)?;

        match image::guess_format(&data) {
            Ok(format) => tracing::debug!(
                bytes = data.len(),
                ?format,
                path = %self.staged_path.display(),
                "staged input image"
            ),
            Err(_) => tracing::warn!(
                bytes = data.len(),
                path = %self.staged_path.display(),
                "staged input is not a recognised image format"
            ),
        }

        Ok(data.len())
    }
}

/// Drop a data-URI header: everything up to and including the first comma.
#[must_use]
pub fn strip_data_uri(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

/// Number of base64 symbols in the payload once the prefix and whitespace are dropped.
fn encoded_symbols(payload: &str) -> usize {
    strip_data_uri(payload).bytes().filter(|b| !b.is_ascii_whitespace()).count()
}

/// Decode a possibly data-URI-prefixed, possibly line-wrapped base64 payload.
///
/// # Errors
///
/// Returns [`RelayError::Decoding`] if the payload is not valid base64.
pub fn decode_image(payload: &str) -> Result<Vec<u8>, RelayError> {
    let data: String =
        strip_data_uri(payload).chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(data.as_bytes())
        .map_err(|e| RelayError::Decoding(e.to_string()))
}

/// Check a decoded image length against `[MIN_IMAGE_BYTES, max_bytes]`.
///
/// # Errors
///
/// Returns [`RelayError::Size`] when out of bounds.
pub fn check_size(len: usize, max_bytes: usize) -> Result<(), RelayError> {
    if len > max_bytes {
        return Err(RelayError::Size(format!(
            "image is {len} bytes; the limit is {max_bytes} bytes"
        )));
    }
    if len < MIN_IMAGE_BYTES {
        return Err(RelayError::Size(format!(
            "image is only {len} bytes; expected at least {MIN_IMAGE_BYTES} (truncated or corrupt?)"
        )));
    }
    Ok(())
}
