//! Volume partitioning and texture streaming for volstream.
//!
//! This crate provides:
//! - Partitioning of a volume extent into GPU-sized [`Block`]s
//! - Texture encoding selection with per-component scale/bias
//! - Direct and slice-by-slice host-converted uploads
//! - Per-frame block streaming with bounded graphics memory

pub mod block;
pub mod error;
pub mod format;
pub mod streamer;

pub use block::{partition, Block};
pub use error::{Result, StreamError};
pub use format::{Conversion, ScaleBias, TextureEncoding};
pub use streamer::VolumeStreamer;
