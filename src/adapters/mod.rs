//! Adapter implementations for port traits.
//!
//! - `live/`: Real ComfyUI HTTP client
//! - `recording/`: Record engine interactions to cassettes
//! - `replaying/`: Replay engine interactions from cassettes

pub mod live;
pub mod recording;
pub mod replaying;
