//! Capture event processing
//!
//! Applies device callbacks to the tracked request they belong to. A request
//! is finalized as soon as both its photo and capture callbacks have been seen,
//! whatever the order; depth arriving later than that is dropped.

use std::io::Cursor;

use depth_frame::{render_depth_map, FormatConverter, NormalizedDepthImage, RawDepthBuffer};
use image::ImageReader;
use photo::Photo;
use tracing::{debug, error, warn};

use crate::device::{CapturedPhoto, DeviceEvent};
use crate::request::{CaptureRequest, RequestId};
use crate::tracker::CaptureRequestTracker;

/// Result of applying a device callback
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Primary photo is available
    PhotoReady { request_id: RequestId, photo: Photo },
    /// Depth data for the request could not be used
    DepthDropped { request_id: RequestId, reason: String },
    /// A callback reported a failure
    Failed { request_id: RequestId, reason: String },
    /// The request was finalized; a depth map is handed over for persistence
    Completed {
        request_id: RequestId,
        depth_image: Option<NormalizedDepthImage>,
    },
}

/// Apply one device callback to the tracker
pub fn handle_event(tracker: &mut CaptureRequestTracker, event: DeviceEvent) -> Vec<CaptureOutcome> {
    let request_id = event.request_id();
    let mut outcomes = Vec::new();

    let Some(request) = tracker.get_mut(request_id) else {
        warn!("Dropping callback for unknown capture request {}", request_id);
        return outcomes;
    };

    match event {
        DeviceEvent::PhotoProcessed { result, .. } => {
            if request.photo_finished {
                warn!("Duplicate photo callback for capture request {}", request_id);
                return outcomes;
            }
            request.photo_finished = true;

            match result {
                Ok(CapturedPhoto { data, depth }) => {
                    match probe_photo(&data) {
                        Ok((width, height)) => {
                            debug!("Photo for capture request {}: {}x{}, {} bytes", request_id, width, height, data.len());
                            outcomes.push(CaptureOutcome::PhotoReady {
                                request_id,
                                photo: Photo::new(data),
                            });
                        }
                        Err(reason) => {
                            warn!("Undecodable photo for capture request {}: {}", request_id, reason);
                            outcomes.push(CaptureOutcome::Failed { request_id, reason });
                        }
                    }
                    if let Some(depth) = depth {
                        accept_depth(request, depth, &mut outcomes);
                    }
                }
                Err(e) => {
                    error!("Error capturing photo for request {}: {}", request_id, e);
                    request.failed = true;
                    outcomes.push(CaptureOutcome::Failed {
                        request_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        DeviceEvent::DepthDelivered { depth, .. } => {
            accept_depth(request, depth, &mut outcomes);
        }
        DeviceEvent::CaptureFinished { result, .. } => {
            if request.capture_finished {
                warn!("Duplicate capture-finished callback for request {}", request_id);
                return outcomes;
            }
            request.capture_finished = true;

            if let Err(e) = result {
                error!("Error finishing capture for request {}: {}", request_id, e);
                request.failed = true;
                outcomes.push(CaptureOutcome::Failed {
                    request_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    if request.is_complete() {
        if let Some(mut finished) = tracker.finalize(request_id) {
            let depth_image = if finished.failed {
                if finished.depth_image.take().is_some() {
                    debug!("Discarding depth map of failed capture request {}", request_id);
                }
                None
            } else {
                finished.depth_image.take()
            };
            outcomes.push(CaptureOutcome::Completed { request_id, depth_image });
        }
    }

    outcomes
}

fn accept_depth(request: &mut CaptureRequest, depth: RawDepthBuffer, outcomes: &mut Vec<CaptureOutcome>) {
    let request_id = request.id;
    if !request.settings.depth_delivery_enabled {
        warn!("Ignoring depth data for capture request {} without depth delivery", request_id);
        return;
    }
    if request.depth_received {
        warn!("Duplicate depth data for capture request {}", request_id);
        return;
    }
    request.depth_received = true;

    let format = depth.format();
    match FormatConverter::convert(depth).and_then(|canonical| render_depth_map(&canonical)) {
        Ok(image) => {
            debug!(
                "Rendered {}x{} depth map for capture request {} from {}",
                image.width(),
                image.height(),
                request_id,
                format
            );
            request.depth_image = Some(image);
        }
        Err(e) => {
            warn!("Dropping depth data for capture request {}: {}", request_id, e);
            outcomes.push(CaptureOutcome::DepthDropped {
                request_id,
                reason: e.to_string(),
            });
        }
    }
}

fn probe_photo(data: &[u8]) -> Result<(u32, u32), String> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .into_dimensions()
        .map_err(|e| e.to_string())
}
