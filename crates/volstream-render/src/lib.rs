//! Sorting, lookup tables and mappers for volstream.
//!
//! This crate provides:
//! - Back-to-front ordering of blocks and whole volumes
//! - Transfer functions and the lookup table cache
//! - Camera and view management
//! - The shader uniform contract
//! - Single-volume and composite mappers driving the frame loop

pub mod camera;
pub mod composite;
pub mod config;
pub mod error;
pub mod lookup_table;
pub mod mapper;
pub mod property;
pub mod sort;
pub mod transfer_function;
pub mod uniforms;

pub use camera::{Camera, Projection};
pub use composite::{CompositeInput, CompositeMapper};
pub use config::{BlendMode, Interpolation, VolumeRenderConfig};
pub use error::{RenderError, Result};
pub use lookup_table::{LookupTable, LookupTableCache, TableInputs, TableKey, TableKind};
pub use mapper::{DrawRequest, FrameStats, VolumeMapper};
pub use property::VolumeProperty;
pub use sort::{compare, sort_back_to_front, RenderUnit, SortView};
pub use transfer_function::{ColorTransferFunction, PiecewiseFunction, TransferFunction};
pub use uniforms::{DrawUniforms, TableBindings};
