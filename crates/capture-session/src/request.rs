//! Capture request state

use std::fmt;
use std::time::{Duration, Instant};

use depth_frame::NormalizedDepthImage;

/// Capture request identifier, unique and increasing within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Settings snapshot taken when a capture is issued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Whether the device was asked to deliver depth with this capture
    pub depth_delivery_enabled: bool,
}

/// Per-request processing state, owned by the tracker while in flight
#[derive(Debug)]
pub struct CaptureRequest {
    /// Request identifier
    pub(crate) id: RequestId,
    /// Requested settings
    pub(crate) settings: CaptureSettings,
    /// When the capture was issued
    pub(crate) issued_at: Instant,
    /// Photo processing callback observed
    pub(crate) photo_finished: bool,
    /// Capture finished callback observed
    pub(crate) capture_finished: bool,
    /// A depth buffer was received (converted or not)
    pub(crate) depth_received: bool,
    /// A device callback reported an error
    pub(crate) failed: bool,
    /// Rendered depth map awaiting persistence
    pub(crate) depth_image: Option<NormalizedDepthImage>,
}

impl CaptureRequest {
    /// Create state for a freshly issued capture
    pub fn new(id: RequestId, settings: CaptureSettings) -> Self {
        Self {
            id,
            settings,
            issued_at: Instant::now(),
            photo_finished: false,
            capture_finished: false,
            depth_received: false,
            failed: false,
            depth_image: None,
        }
    }

    /// Both terminal callbacks have been observed
    pub fn is_complete(&self) -> bool {
        self.photo_finished && self.capture_finished
    }

    /// Time since the capture was issued
    pub fn age(&self) -> Duration {
        self.issued_at.elapsed()
    }

    /// Request identifier
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Settings the capture was issued with
    pub fn settings(&self) -> CaptureSettings {
        self.settings
    }

    pub fn photo_finished(&self) -> bool {
        self.photo_finished
    }

    pub fn capture_finished(&self) -> bool {
        self.capture_finished
    }

    pub fn depth_received(&self) -> bool {
        self.depth_received
    }

    /// A device callback reported an error
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Rendered depth map awaiting persistence
    pub fn depth_image(&self) -> Option<&NormalizedDepthImage> {
        self.depth_image.as_ref()
    }
}
