//! Fail-fast check that the engine has the custom nodes the workflow uses.

use std::collections::BTreeSet;

use crate::error::RelayError;
use crate::ports::Engine;

/// Custom (non-core) node types referenced by the bundled workflow.
pub const REQUIRED_NODES: &[&str] = &[
    "AIO_Preprocessor",
    "ColorMatch",
    "GetImageSize+",
    "ImageResizeKJv2",
    "NunchakuFluxDiTLoader",
    "NunchakuTextEncoderLoaderV2",
    "SaveImagePlus",
    "Textbox",
    "UpscaleImageByUsingModel",
];

/// The bundled required-node list as owned strings.
#[must_use]
pub fn default_required_nodes() -> Vec<String> {
    REQUIRED_NODES.iter().map(ToString::to_string).collect()
}

/// Entries of `required` that are not in `available`, in `required` order.
#[must_use]
pub fn missing_nodes(available: &BTreeSet<String>, required: &[String]) -> Vec<String> {
    required.iter().filter(|name| !available.contains(*name)).cloned().collect()
}

/// Ask the engine for its node types and fail if any of `required` is absent.
///
/// # Errors
///
/// Returns [`RelayError::Capability`] listing the missing types, or the
/// engine error if the query itself fails.
pub async fn check_required_nodes(engine: &dyn Engine, required: &[String]) -> Result<(), RelayError> {
    if required.is_empty() {
        return Ok(());
    }
    let available = engine.object_info().await?;
    let missing = missing_nodes(&available, required);
    if missing.is_empty() {
        tracing::debug!(count = required.len(), "all required node types present");
        Ok(())
    } else {
        Err(RelayError::Capability(missing))
    }
}
