//! Captured Photo Model
//!
//! A photo keeps only the encoded bytes the device delivered. Compressed and
//! thumbnail variants are derived from those bytes on every access.

mod resize;

pub use resize::{size_label, ImageResizer};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use tracing::debug;
use uuid::Uuid;

/// Width of the compressed preview variant
pub const COMPRESSED_WIDTH: u32 = 800;

/// Width of the thumbnail variant
pub const THUMBNAIL_WIDTH: u32 = 100;

/// JPEG quality used for derived variants
pub const DERIVED_JPEG_QUALITY: u8 = 50;

/// A captured still photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    /// Unique photo identifier
    pub id: String,
    /// Encoded bytes as delivered by the device
    pub original_data: Vec<u8>,
}

impl Photo {
    /// Create a photo with a fresh identifier
    pub fn new(original_data: Vec<u8>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), original_data)
    }

    /// Create a photo with a caller-supplied identifier
    pub fn with_id(id: impl Into<String>, original_data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            original_data,
        }
    }

    /// JPEG bytes scaled to `COMPRESSED_WIDTH`
    pub fn compressed_data(&self) -> Option<Vec<u8>> {
        self.derive_jpeg(COMPRESSED_WIDTH)
    }

    /// JPEG bytes scaled to `THUMBNAIL_WIDTH`
    pub fn thumbnail_data(&self) -> Option<Vec<u8>> {
        self.derive_jpeg(THUMBNAIL_WIDTH)
    }

    /// Decoded compressed variant
    pub fn image(&self) -> Option<DynamicImage> {
        self.compressed_data()
            .and_then(|data| image::load_from_memory(&data).ok())
    }

    /// Decoded thumbnail variant
    pub fn thumbnail_image(&self) -> Option<DynamicImage> {
        self.thumbnail_data()
            .and_then(|data| image::load_from_memory(&data).ok())
    }

    fn derive_jpeg(&self, width: u32) -> Option<Vec<u8>> {
        let resized = ImageResizer::new(width).resize_data(&self.original_data)?;
        let rgb = resized.to_rgb8();

        let mut encoded = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut encoded, DERIVED_JPEG_QUALITY);
        match encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8) {
            Ok(()) => Some(encoded),
            Err(e) => {
                debug!("Failed to encode {}px variant of photo {}: {}", width, self.id, e);
                None
            }
        }
    }
}
