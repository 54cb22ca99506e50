//! Recording adapters that capture interactions to cassettes.

pub mod engine;

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::cassette::recorder::CassetteRecorder;
use crate::error::RelayError;

/// Record a call's result using the Ok/Err JSON convention.
///
/// Errors are stored as their bare message so replay can rebuild the same variant.
pub(crate) fn record_result<T, I>(
    recorder: &Arc<Mutex<CassetteRecorder>>,
    port: &str,
    method: &str,
    input: &I,
    result: &Result<T, RelayError>,
) where
    T: Serialize,
    I: Serialize + ?Sized,
{
    let input_json = serde_json::to_value(input).unwrap_or_else(|e| {
        tracing::warn!(port, method, error = %e, "recording input could not be serialized");
        serde_json::Value::Null
    });

    let output_json = match result {
        Ok(v) => match serde_json::to_value(v) {
            Ok(inner) => serde_json::json!({ "Ok": inner }),
            Err(e) => serde_json::json!({ "Err": format!("unserializable result: {e}") }),
        },
        Err(e) => serde_json::json!({ "Err": e.message() }),
    };

    let mut guard = recorder.lock().unwrap_or_else(PoisonError::into_inner);
    guard.record(port, method, input_json, output_json);
}
