//! Record/replay of engine interactions for deterministic runs without a GPU.

pub mod format;
pub mod loader;
pub mod recorder;
pub mod replayer;
