//! Test harness for volstream.
//!
//! Provides synthetic volumes and a headless frame recorder for end-to-end
//! streaming and ordering tests.

pub mod harness;
pub mod volumes;

pub use harness::{
    check_back_to_front, create_test_camera, HeadlessHarness, RecordedDraw, RecordedFrame,
};
pub use volumes::{constant_volume, ramp_volume, sphere_volume, ARRAY};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("Render error: {0}")]
    Render(#[from] volstream_render::RenderError),
    #[error("Volume error: {0}")]
    Volume(#[from] volstream_core::Error),
    #[error("Frame check failed: {0}")]
    FrameCheck(String),
}

pub type Result<T> = std::result::Result<T, TestError>;
