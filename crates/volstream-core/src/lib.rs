//! Core data model for volstream.
//!
//! This crate provides the foundational types shared by the streaming and
//! rendering crates:
//! - Index-space extents and world-space bounding boxes
//! - Scalar element types and typed component storage
//! - The immutable-per-frame `Volume` and its named component arrays
//! - Monotonic modification versions used for cache invalidation

pub mod error;
pub mod extent;
pub mod math;
pub mod scalar;
pub mod version;
pub mod volume;

pub use error::{Error, Result};
pub use extent::{Axis, Extent};
pub use math::Aabb;
pub use scalar::{ScalarData, ScalarType};
pub use version::Version;
pub use volume::{Centering, ComponentArray, Volume};

/// Library-wide constants
pub mod constants {
    /// Largest component count a single volume texture can hold (RGBA).
    pub const MAX_COMPONENTS: usize = 4;
}
