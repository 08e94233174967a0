//! Normalization of depth buffers into canonical disparity

use half::f16;
use tracing::debug;

use crate::{DepthError, DepthFormat, RawDepthBuffer};

/// Converts sensor depth encodings into `DepthFormat::CANONICAL`
pub struct FormatConverter;

impl FormatConverter {
    /// Convert a buffer into 32-bit float disparity.
    ///
    /// Canonical input is handed back untouched. Invalid depth samples
    /// (zero, negative or non-finite) become zero disparity.
    pub fn convert(buffer: RawDepthBuffer) -> Result<RawDepthBuffer, DepthError> {
        let format = buffer.format();
        if format.is_canonical() {
            return Ok(buffer);
        }

        let samples: Vec<f32> = match format {
            DepthFormat::DisparityFloat16 => half_samples(buffer.data()).collect(),
            DepthFormat::DepthFloat32 => float_samples(buffer.data()).map(depth_to_disparity).collect(),
            DepthFormat::DepthFloat16 => half_samples(buffer.data()).map(depth_to_disparity).collect(),
            DepthFormat::DepthMillimeters16 => buffer
                .data()
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .map(|mm| if mm == 0 { 0.0 } else { 1000.0 / mm as f32 })
                .collect(),
            DepthFormat::DisparityFloat32 | DepthFormat::Unknown(_) => {
                return Err(DepthError::UnsupportedFormat(format));
            }
        };

        debug!(
            "Converted {}x{} depth buffer from {} to {}",
            buffer.width(),
            buffer.height(),
            format,
            DepthFormat::CANONICAL
        );

        RawDepthBuffer::from_disparity(buffer.width(), buffer.height(), &samples)
    }
}

fn float_samples(data: &[u8]) -> impl Iterator<Item = f32> + '_ {
    data.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn half_samples(data: &[u8]) -> impl Iterator<Item = f32> + '_ {
    data.chunks_exact(2)
        .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
}

fn depth_to_disparity(depth_m: f32) -> f32 {
    if depth_m.is_finite() && depth_m > 0.0 {
        1.0 / depth_m
    } else {
        0.0
    }
}
