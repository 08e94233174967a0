//! Depth Frame Library for LiDAR Capture
//!
//! Provides the depth-side data types of the capture pipeline:
//! - Raw depth/disparity buffers as delivered by the sensor
//! - Normalization into the canonical 32-bit float disparity format
//! - Rendering of canonical buffers into 16-bit greyscale depth maps

pub mod buffer;
pub mod convert;
pub mod render;

pub use buffer::{DepthFormat, RawDepthBuffer};
pub use convert::FormatConverter;
pub use render::{render_depth_map, NormalizedDepthImage};

use thiserror::Error;

/// Depth buffer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepthError {
    #[error("Unsupported depth format: {0}")]
    UnsupportedFormat(DepthFormat),

    #[error("Malformed {format} buffer: expected {expected} bytes for {width}x{height}, got {actual}")]
    MalformedBuffer {
        format: DepthFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Depth buffer is {0}, expected canonical disparity")]
    NotCanonical(DepthFormat),

    #[error("Depth buffer has no samples")]
    EmptyImage,
}
