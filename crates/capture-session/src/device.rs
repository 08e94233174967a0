//! Capture device boundary

use depth_frame::RawDepthBuffer;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::request::{CaptureSettings, RequestId};

/// Failures reported by the device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No depth camera found")]
    NotFound,

    #[error("Input rejected: {0}")]
    Input(String),

    #[error("Output rejected: {0}")]
    Output(String),

    #[error("Failed to start streaming: {0}")]
    Start(String),

    #[error("Capture failed: {0}")]
    Capture(String),
}

/// Capabilities of the configured photo output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputCapabilities {
    /// Depth data can accompany still captures
    pub depth_delivery_supported: bool,
}

/// Photo produced for a capture request
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    /// Encoded primary image
    pub data: Vec<u8>,
    /// Depth buffer delivered together with the photo
    pub depth: Option<RawDepthBuffer>,
}

/// Callback from the device, keyed by request id.
///
/// Photo and depth events may arrive in either order.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// Photo processing finished
    PhotoProcessed {
        request_id: RequestId,
        result: Result<CapturedPhoto, DeviceError>,
    },
    /// Depth data delivered separately from the photo
    DepthDelivered {
        request_id: RequestId,
        depth: RawDepthBuffer,
    },
    /// The device is done with the capture
    CaptureFinished {
        request_id: RequestId,
        result: Result<(), DeviceError>,
    },
}

impl DeviceEvent {
    /// Request this event belongs to
    pub fn request_id(&self) -> RequestId {
        match self {
            DeviceEvent::PhotoProcessed { request_id, .. }
            | DeviceEvent::DepthDelivered { request_id, .. }
            | DeviceEvent::CaptureFinished { request_id, .. } => *request_id,
        }
    }
}

/// Channel the device reports callbacks on. Never blocks the sender.
pub type DeviceEventSender = mpsc::UnboundedSender<DeviceEvent>;

/// A depth-capable still camera.
///
/// Configuration calls run on the session worker. `capture` must return
/// immediately; results are sent on `events`, possibly from other threads.
pub trait CaptureDevice: Send + 'static {
    /// Locate a compatible depth camera
    fn discover(&mut self) -> Result<String, DeviceError>;

    /// Attach the camera as session input
    fn configure_input(&mut self) -> Result<(), DeviceError>;

    /// Attach the photo output
    fn configure_output(&mut self) -> Result<OutputCapabilities, DeviceError>;

    /// Start streaming frames
    fn start_running(&mut self) -> Result<(), DeviceError>;

    /// Stop streaming frames
    fn stop_running(&mut self);

    /// Issue a still capture
    fn capture(&mut self, request_id: RequestId, settings: CaptureSettings, events: DeviceEventSender);
}
