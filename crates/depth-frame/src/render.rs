//! Depth map rendering

use image::{DynamicImage, ImageBuffer, Luma};

use crate::{DepthError, RawDepthBuffer};

/// 16-bit greyscale depth map
pub type DepthMap = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Renderable depth map derived from a canonical disparity buffer.
///
/// Nearer surfaces are brighter. Pixels without a valid disparity are 0,
/// valid pixels span `1..=u16::MAX`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDepthImage {
    map: DepthMap,
}

impl NormalizedDepthImage {
    /// Image width
    pub fn width(&self) -> u32 {
        self.map.width()
    }

    /// Image height
    pub fn height(&self) -> u32 {
        self.map.height()
    }

    /// Check for a zero-sized image
    pub fn is_empty(&self) -> bool {
        self.map.width() == 0 || self.map.height() == 0
    }

    /// Borrow the greyscale raster
    pub fn as_map(&self) -> &DepthMap {
        &self.map
    }

    /// Convert into a dynamic image for encoding
    pub fn into_dynamic(self) -> DynamicImage {
        DynamicImage::ImageLuma16(self.map)
    }
}

/// Render a canonical disparity buffer into a depth map
pub fn render_depth_map(buffer: &RawDepthBuffer) -> Result<NormalizedDepthImage, DepthError> {
    let disparity = buffer.disparity()?;
    if disparity.is_empty() {
        return Err(DepthError::EmptyImage);
    }

    let valid = |d: f32| d.is_finite() && d > 0.0;
    let (min, max) = disparity
        .iter()
        .copied()
        .filter(|d| valid(*d))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| (lo.min(d), hi.max(d)));
    let range = max - min;

    let pixels: Vec<u16> = disparity
        .iter()
        .map(|&d| {
            if !valid(d) {
                0
            } else if range <= f32::EPSILON {
                u16::MAX
            } else {
                let t = (d - min) / range;
                1 + (t * (u16::MAX - 1) as f32).round() as u16
            }
        })
        .collect();

    let map = ImageBuffer::from_raw(buffer.width(), buffer.height(), pixels)
        .ok_or(DepthError::EmptyImage)?;

    Ok(NormalizedDepthImage { map })
}
