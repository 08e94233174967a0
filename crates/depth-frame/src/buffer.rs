//! Raw depth buffer types

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DepthError;

/// Depth sample encoding, tagged by the sensor's four-character code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthFormat {
    /// 32-bit float disparity (1/m), the canonical format
    DisparityFloat32,
    /// 16-bit half float disparity (1/m)
    DisparityFloat16,
    /// 32-bit float depth (m)
    DepthFloat32,
    /// 16-bit half float depth (m)
    DepthFloat16,
    /// 16-bit unsigned depth (mm)
    DepthMillimeters16,
    /// Any other four-character code
    Unknown(u32),
}

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

impl DepthFormat {
    /// Format every consumer of depth data works on
    pub const CANONICAL: DepthFormat = DepthFormat::DisparityFloat32;

    /// Map a four-character code to a format
    pub fn from_fourcc(code: u32) -> Self {
        match code {
            c if c == fourcc(b"fdis") => DepthFormat::DisparityFloat32,
            c if c == fourcc(b"hdis") => DepthFormat::DisparityFloat16,
            c if c == fourcc(b"fdep") => DepthFormat::DepthFloat32,
            c if c == fourcc(b"hdep") => DepthFormat::DepthFloat16,
            c if c == fourcc(b"Z16 ") => DepthFormat::DepthMillimeters16,
            other => DepthFormat::Unknown(other),
        }
    }

    /// Four-character code of this format
    pub fn to_fourcc(self) -> u32 {
        match self {
            DepthFormat::DisparityFloat32 => fourcc(b"fdis"),
            DepthFormat::DisparityFloat16 => fourcc(b"hdis"),
            DepthFormat::DepthFloat32 => fourcc(b"fdep"),
            DepthFormat::DepthFloat16 => fourcc(b"hdep"),
            DepthFormat::DepthMillimeters16 => fourcc(b"Z16 "),
            DepthFormat::Unknown(code) => code,
        }
    }

    /// Bytes per sample, `None` for unknown encodings
    pub fn bytes_per_sample(self) -> Option<usize> {
        match self {
            DepthFormat::DisparityFloat32 | DepthFormat::DepthFloat32 => Some(4),
            DepthFormat::DisparityFloat16
            | DepthFormat::DepthFloat16
            | DepthFormat::DepthMillimeters16 => Some(2),
            DepthFormat::Unknown(_) => None,
        }
    }

    /// Whether this is the canonical format
    pub fn is_canonical(self) -> bool {
        self == Self::CANONICAL
    }
}

impl fmt::Display for DepthFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.to_fourcc().to_be_bytes();
        if code.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            write!(f, "'{}'", String::from_utf8_lossy(&code))
        } else {
            write!(f, "0x{:08X}", self.to_fourcc())
        }
    }
}

/// Per-pixel depth or disparity samples as produced by the sensor.
///
/// Samples are stored row-major and little-endian. A buffer is never mutated
/// after construction; conversion consumes it and yields a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDepthBuffer {
    width: u32,
    height: u32,
    format: DepthFormat,
    data: Vec<u8>,
}

impl RawDepthBuffer {
    /// Wrap sensor bytes, checking the length for known formats
    pub fn new(width: u32, height: u32, format: DepthFormat, data: Vec<u8>) -> Result<Self, DepthError> {
        if let Some(bytes_per_sample) = format.bytes_per_sample() {
            let expected = (width as usize)
                .checked_mul(height as usize)
                .and_then(|n| n.checked_mul(bytes_per_sample))
                .unwrap_or(usize::MAX);
            if data.len() != expected {
                return Err(DepthError::MalformedBuffer {
                    format,
                    width,
                    height,
                    expected,
                    actual: data.len(),
                });
            }
        }

        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Build a canonical buffer from disparity samples
    pub fn from_disparity(width: u32, height: u32, samples: &[f32]) -> Result<Self, DepthError> {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(width, height, DepthFormat::DisparityFloat32, data)
    }

    /// Buffer width in samples
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height in samples
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sample encoding
    pub fn format(&self) -> DepthFormat {
        self.format
    }

    /// Raw sample bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of samples
    pub fn sample_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Decode disparity samples from a canonical buffer
    pub fn disparity(&self) -> Result<Vec<f32>, DepthError> {
        if !self.format.is_canonical() {
            return Err(DepthError::NotCanonical(self.format));
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}
