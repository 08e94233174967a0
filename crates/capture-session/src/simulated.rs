//! Simulated depth camera
//!
//! Produces a synthetic scene (a sphere in front of a tilted floor) so the
//! session can run without hardware.

use std::io::Cursor;

use depth_frame::{DepthFormat, RawDepthBuffer};
use half::f16;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::device::{
    CaptureDevice, CapturedPhoto, DeviceError, DeviceEvent, DeviceEventSender, OutputCapabilities,
};
use crate::request::{CaptureSettings, RequestId};

/// How depth data reaches the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthDelivery {
    /// Attached to the photo callback
    #[default]
    Inline,
    /// Separate callback before the photo
    BeforePhoto,
    /// Separate callback after the photo
    AfterPhoto,
}

/// Simulated device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedDeviceConfig {
    /// A depth camera is present
    pub available: bool,
    /// The photo output can be attached
    pub reject_output: bool,
    /// Depth can accompany captures
    pub depth_supported: bool,
    /// Encoding of delivered depth buffers
    pub depth_format: DepthFormat,
    /// Callback layout for depth data
    pub depth_delivery: DepthDelivery,
    /// Every capture reports a device failure
    pub fail_captures: bool,
    /// Photo width
    pub photo_width: u32,
    /// Photo height
    pub photo_height: u32,
    /// Depth buffer width
    pub depth_width: u32,
    /// Depth buffer height
    pub depth_height: u32,
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            available: true,
            reject_output: false,
            depth_supported: true,
            depth_format: DepthFormat::DepthFloat16,
            depth_delivery: DepthDelivery::Inline,
            fail_captures: false,
            photo_width: 640,
            photo_height: 480,
            depth_width: 256,
            depth_height: 192,
        }
    }
}

/// Software depth camera emitting callbacks from spawned tasks
#[derive(Debug, Default)]
pub struct SimulatedDevice {
    config: SimulatedDeviceConfig,
    configured: bool,
    running: bool,
}

impl SimulatedDevice {
    /// Create a simulated device
    pub fn new(config: SimulatedDeviceConfig) -> Self {
        Self {
            config,
            configured: false,
            running: false,
        }
    }

    fn events_for(&self, request_id: RequestId, settings: CaptureSettings) -> Vec<DeviceEvent> {
        if self.config.fail_captures || !self.running {
            let reason = if self.running { "sensor fault" } else { "device is not running" };
            return vec![
                DeviceEvent::PhotoProcessed {
                    request_id,
                    result: Err(DeviceError::Capture(reason.to_string())),
                },
                DeviceEvent::CaptureFinished {
                    request_id,
                    result: Err(DeviceError::Capture(reason.to_string())),
                },
            ];
        }

        let data = synthetic_photo(self.config.photo_width, self.config.photo_height, request_id);
        let depth = if settings.depth_delivery_enabled && self.config.depth_supported {
            synthetic_depth(
                self.config.depth_width,
                self.config.depth_height,
                self.config.depth_format,
            )
        } else {
            None
        };

        let mut events = Vec::with_capacity(3);
        match (depth, self.config.depth_delivery) {
            (Some(depth), DepthDelivery::BeforePhoto) => {
                events.push(DeviceEvent::DepthDelivered { request_id, depth });
                events.push(photo_event(request_id, data, None));
            }
            (Some(depth), DepthDelivery::AfterPhoto) => {
                events.push(photo_event(request_id, data, None));
                events.push(DeviceEvent::DepthDelivered { request_id, depth });
            }
            (depth, _) => events.push(photo_event(request_id, data, depth)),
        }
        events.push(DeviceEvent::CaptureFinished {
            request_id,
            result: Ok(()),
        });
        events
    }
}

impl CaptureDevice for SimulatedDevice {
    fn discover(&mut self) -> Result<String, DeviceError> {
        if !self.config.available {
            return Err(DeviceError::NotFound);
        }
        Ok("Simulated LiDAR depth camera".to_string())
    }

    fn configure_input(&mut self) -> Result<(), DeviceError> {
        self.configured = true;
        Ok(())
    }

    fn configure_output(&mut self) -> Result<OutputCapabilities, DeviceError> {
        if self.config.reject_output {
            return Err(DeviceError::Output("photo output cannot be added".to_string()));
        }
        Ok(OutputCapabilities {
            depth_delivery_supported: self.config.depth_supported,
        })
    }

    fn start_running(&mut self) -> Result<(), DeviceError> {
        if !self.configured {
            return Err(DeviceError::Start("input not configured".to_string()));
        }
        info!("Simulated device streaming");
        self.running = true;
        Ok(())
    }

    fn stop_running(&mut self) {
        self.running = false;
    }

    fn capture(&mut self, request_id: RequestId, settings: CaptureSettings, events: DeviceEventSender) {
        let pending = self.events_for(request_id, settings);
        tokio::spawn(async move {
            for event in pending {
                if events.send(event).is_err() {
                    debug!("Session gone, dropping simulated callbacks for {}", request_id);
                    return;
                }
                tokio::task::yield_now().await;
            }
        });
    }
}

fn photo_event(request_id: RequestId, data: Vec<u8>, depth: Option<RawDepthBuffer>) -> DeviceEvent {
    DeviceEvent::PhotoProcessed {
        request_id,
        result: Ok(CapturedPhoto { data, depth }),
    }
}

fn synthetic_photo(width: u32, height: u32, request_id: RequestId) -> Vec<u8> {
    let tint = (request_id.0 * 37 % 256) as u8;
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            tint,
        ])
    });

    let mut cursor = Cursor::new(Vec::new());
    match DynamicImage::ImageRgb8(img).write_to(&mut cursor, ImageFormat::Jpeg) {
        Ok(()) => cursor.into_inner(),
        Err(e) => {
            debug!("Failed to encode simulated photo: {}", e);
            Vec::new()
        }
    }
}

/// Scene depth in metres at normalized coordinates
fn scene_depth(u: f32, v: f32) -> f32 {
    let floor = 4.5 - 3.5 * v;
    let (dx, dy) = (u - 0.5, v - 0.5);
    let r2 = dx * dx + dy * dy;
    if r2 < 0.04 {
        floor.min(1.0 + r2.sqrt())
    } else {
        floor
    }
}

fn synthetic_depth(width: u32, height: u32, format: DepthFormat) -> Option<RawDepthBuffer> {
    let depths = (0..height).flat_map(|y| {
        (0..width).map(move |x| {
            scene_depth(
                x as f32 / width.max(1) as f32,
                y as f32 / height.max(1) as f32,
            )
        })
    });

    let data: Vec<u8> = match format {
        DepthFormat::DisparityFloat32 => depths.flat_map(|d| (1.0 / d).to_le_bytes()).collect(),
        DepthFormat::DisparityFloat16 => depths.flat_map(|d| f16::from_f32(1.0 / d).to_le_bytes()).collect(),
        DepthFormat::DepthFloat32 => depths.flat_map(|d| d.to_le_bytes()).collect(),
        DepthFormat::DepthFloat16 => depths.flat_map(|d| f16::from_f32(d).to_le_bytes()).collect(),
        DepthFormat::DepthMillimeters16 => depths
            .flat_map(|d| ((d * 1000.0) as u16).to_le_bytes())
            .collect(),
        DepthFormat::Unknown(_) => depths.map(|d| (d * 50.0) as u8).collect(),
    };

    match RawDepthBuffer::new(width, height, format, data) {
        Ok(buffer) => Some(buffer),
        Err(e) => {
            debug!("Failed to build simulated depth buffer: {}", e);
            None
        }
    }
}
