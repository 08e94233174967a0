//! LiDAR Capture Application
//!
//! Drives a capture session against the simulated depth camera and acts as
//! the presentation side of the session event channel.

mod settings;

pub use settings::{AppConfig, DEFAULT_CONFIG_FILE};

use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use capture_session::{PhotoCaptureSession, RequestId, SessionEvent, SessionState, SimulatedDevice};
use photo::size_label;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Outcome of a demo run
#[derive(Debug, Default)]
pub struct DemoSummary {
    /// Photos delivered
    pub photos: usize,
    /// Depth maps written
    pub depth_maps: Vec<PathBuf>,
    /// Depth maps discarded
    pub dropped_depth: usize,
    /// Captures the device reported as failed
    pub failed_captures: usize,
    /// Requests still in flight at shutdown
    pub outstanding: Vec<RequestId>,
}

/// Initialize the global tracing subscriber
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let level: Level = level.parse()?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Configure the simulated camera, issue the configured number of captures
/// and collect their results.
pub async fn run_demo(config: AppConfig) -> anyhow::Result<DemoSummary> {
    let device = SimulatedDevice::new(config.device.clone());
    let (session, mut events) = PhotoCaptureSession::spawn(device, config.session.clone());
    let mut summary = DemoSummary::default();

    session.configure();
    loop {
        match events.recv().await {
            Some(SessionEvent::StateChanged(SessionState::Running)) => break,
            Some(SessionEvent::StateChanged(SessionState::Failed(e))) => {
                session.shutdown().await;
                bail!("camera unavailable: {}", e);
            }
            Some(event) => debug!("Session event: {:?}", event),
            None => bail!("capture session ended during configuration"),
        }
    }

    let total = config.demo_captures as usize;
    let period = Duration::from_millis(config.capture_interval_ms.max(1));
    let mut next_capture = tokio::time::interval(period);
    let (mut issued, mut completed) = (0, 0);

    while completed < total {
        tokio::select! {
            _ = next_capture.tick(), if issued < total => {
                session.capture_photo();
                issued += 1;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if matches!(event, SessionEvent::CaptureCompleted { .. }) {
                    completed += 1;
                }
                record(&mut summary, event);
            }
        }
    }

    summary.outstanding = session.shutdown().await;
    // The worker has exited; collect what it emitted while draining writes
    while let Some(event) = events.recv().await {
        record(&mut summary, event);
    }

    info!(
        "Demo finished: {} photos, {} depth maps, {} dropped, {} failed",
        summary.photos,
        summary.depth_maps.len(),
        summary.dropped_depth,
        summary.failed_captures
    );
    Ok(summary)
}

fn record(summary: &mut DemoSummary, event: SessionEvent) {
    match event {
        SessionEvent::PhotoCaptured { request_id, photo } => {
            info!(
                "Photo {} for capture {} ({})",
                photo.id,
                request_id,
                size_label(photo.original_data.len())
            );
            summary.photos += 1;
        }
        SessionEvent::DepthSaved { request_id, path } => {
            info!("Depth map for capture {} saved to {}", request_id, path.display());
            summary.depth_maps.push(path);
        }
        SessionEvent::DepthDropped { request_id, reason } => {
            warn!("Depth map for capture {} dropped: {}", request_id, reason);
            summary.dropped_depth += 1;
        }
        SessionEvent::CaptureFailed { request_id, reason } => {
            warn!("Capture {} failed: {}", request_id, reason);
            summary.failed_captures += 1;
        }
        other => debug!("Session event: {:?}", other),
    }
}
