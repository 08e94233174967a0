//! Depth map writer

use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use depth_frame::NormalizedDepthImage;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::PersistError;

/// Still-image encoding used for depth maps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthEncoding {
    /// Lossless 16-bit TIFF
    #[default]
    Tiff,
    /// Lossless 16-bit PNG
    Png,
}

impl DepthEncoding {
    /// File extension for this encoding
    pub fn extension(self) -> &'static str {
        match self {
            DepthEncoding::Tiff => "tiff",
            DepthEncoding::Png => "png",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            DepthEncoding::Tiff => ImageFormat::Tiff,
            DepthEncoding::Png => ImageFormat::Png,
        }
    }
}

/// Writes depth maps under fresh unique file names
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthPersistenceWriter {
    encoding: DepthEncoding,
}

impl DepthPersistenceWriter {
    /// Create a writer for the given encoding
    pub fn new(encoding: DepthEncoding) -> Self {
        Self { encoding }
    }

    /// Encoding used by this writer
    pub fn encoding(&self) -> DepthEncoding {
        self.encoding
    }

    /// Encode `image` and commit it into `directory`, returning the final path
    pub fn write(&self, image: NormalizedDepthImage, directory: &Path) -> Result<PathBuf, PersistError> {
        let bytes = self.encode(image)?;

        fs::create_dir_all(directory)?;
        let path = directory.join(format!("{}.{}", Uuid::new_v4(), self.encoding.extension()));
        write_atomic(&path, &bytes)?;

        info!("Depth map saved at {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    fn encode(&self, image: NormalizedDepthImage) -> Result<Vec<u8>, PersistError> {
        if image.is_empty() {
            return Err(PersistError::EncodingFailed("depth map has no pixels".to_string()));
        }

        let mut cursor = Cursor::new(Vec::new());
        image
            .into_dynamic()
            .write_to(&mut cursor, self.encoding.image_format())
            .map_err(|e| PersistError::EncodingFailed(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// Write `bytes` to `path` so that `path` only ever holds the complete file.
///
/// Data goes to a hidden sibling first, is synced, then renamed into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            debug!("No temporary file to clean up at {}: {}", tmp_path.display(), cleanup);
        }
        warn!("Atomic write to {} failed: {}", path.display(), e);
        return Err(e.into());
    }

    Ok(())
}
