//! Aspect-preserving image resizing

use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Scales images to a fixed width, keeping the aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageResizer {
    target_width: u32,
}

impl ImageResizer {
    /// Create a resizer for the given output width
    pub fn new(target_width: u32) -> Self {
        Self { target_width }
    }

    /// Output width
    pub fn target_width(&self) -> u32 {
        self.target_width
    }

    /// Output height for a source of the given size
    pub fn target_height(&self, width: u32, height: u32) -> Option<u32> {
        if width == 0 || height == 0 || self.target_width == 0 {
            return None;
        }
        let scaled = (self.target_width as u64 * height as u64 + width as u64 / 2) / width as u64;
        Some(scaled.clamp(1, u32::MAX as u64) as u32)
    }

    /// Resize a decoded image
    pub fn resize(&self, image: &DynamicImage) -> Option<DynamicImage> {
        let height = self.target_height(image.width(), image.height())?;
        Some(image.resize_exact(self.target_width, height, FilterType::Triangle))
    }

    /// Decode encoded bytes and resize them
    pub fn resize_data(&self, data: &[u8]) -> Option<DynamicImage> {
        match image::load_from_memory(data) {
            Ok(image) => self.resize(&image),
            Err(e) => {
                debug!("Cannot decode image for resizing: {}", e);
                None
            }
        }
    }

    /// Load an image file and resize it
    pub fn resize_path(&self, path: &Path) -> Option<DynamicImage> {
        match image::open(path) {
            Ok(image) => self.resize(&image),
            Err(e) => {
                debug!("Cannot open {} for resizing: {}", path.display(), e);
                None
            }
        }
    }
}

/// Human-readable size of an encoded payload, in megabytes
pub fn size_label(bytes: usize) -> String {
    format!("{:.1} MB", bytes as f64 / 1_000_000.0)
}
