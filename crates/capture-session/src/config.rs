//! Session configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use storage::DepthEncoding;

/// Capture session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory depth maps are written to
    pub output_dir: PathBuf,

    /// Encoding of persisted depth maps
    pub depth_encoding: DepthEncoding,

    /// Request depth data when the device supports it
    pub depth_delivery: bool,

    /// Start streaming as soon as configuration succeeds
    pub auto_start: bool,

    /// Age after which an unfinished request is reported (seconds)
    pub stale_request_after_secs: u64,

    /// Interval between in-flight request checks (seconds)
    pub leak_check_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("depth-maps"),
            depth_encoding: DepthEncoding::Tiff,
            depth_delivery: true,
            auto_start: true,
            stale_request_after_secs: 30,
            leak_check_interval_secs: 10,
        }
    }
}

impl SessionConfig {
    /// Config writing into the given directory
    pub fn with_output_dir(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Config that never requests depth data
    pub fn photo_only() -> Self {
        Self {
            depth_delivery: false,
            ..Default::default()
        }
    }

    /// Stale request threshold
    pub fn stale_request_after(&self) -> Duration {
        Duration::from_secs(self.stale_request_after_secs)
    }

    /// Leak check interval, never zero
    pub fn leak_check_interval(&self) -> Duration {
        Duration::from_secs(self.leak_check_interval_secs.max(1))
    }
}
