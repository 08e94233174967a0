//! Photo Capture Session
//!
//! Orchestrates a depth-capable camera:
//! - Device configuration and start/stop on a dedicated worker task
//! - Capture requests tracked by id until both terminal callbacks arrive
//! - Depth buffers normalized, rendered and persisted per request
//! - Results pushed to the presentation side over an event channel

pub mod config;
pub mod device;
pub mod processor;
pub mod request;
pub mod session;
pub mod simulated;
pub mod tracker;

pub use config::SessionConfig;
pub use device::{CaptureDevice, CapturedPhoto, DeviceError, DeviceEvent, DeviceEventSender, OutputCapabilities};
pub use request::{CaptureRequest, CaptureSettings, RequestId};
pub use session::{PhotoCaptureSession, SessionEvent, SessionState};
pub use simulated::{DepthDelivery, SimulatedDevice, SimulatedDeviceConfig};
pub use tracker::{CaptureRequestTracker, TrackerError};
pub use storage::DepthEncoding;

use thiserror::Error;

/// Session configuration failures, terminal for the session instance
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No compatible depth camera available: {0}")]
    DeviceUnavailable(String),

    #[error("Session configuration failed: {0}")]
    ConfigurationFailed(String),
}
