//! Photo capture session worker
//!
//! All device interaction and every piece of mutable session state lives on
//! one worker task. The handle only sends commands, so calls from the
//! presentation side never block.

use std::path::PathBuf;

use depth_frame::NormalizedDepthImage;
use photo::Photo;
use storage::{DepthPersistenceWriter, PersistError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::device::{CaptureDevice, DeviceEvent, DeviceEventSender, OutputCapabilities};
use crate::processor::{handle_event, CaptureOutcome};
use crate::request::{CaptureRequest, CaptureSettings, RequestId};
use crate::tracker::CaptureRequestTracker;
use crate::SessionError;

/// Session lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Created, `configure` not yet called
    Unconfigured,
    /// Device configuration in progress
    Configuring,
    /// Configured, not streaming
    Ready,
    /// Streaming, captures are served
    Running,
    /// Configuration failed; terminal for this session
    Failed(SessionError),
}

/// Events pushed to the presentation side
#[derive(Debug)]
pub enum SessionEvent {
    /// Lifecycle state changed
    StateChanged(SessionState),
    /// A capture request was issued to the device
    CaptureStarted { request_id: RequestId },
    /// The primary photo of a capture is available
    PhotoCaptured { request_id: RequestId, photo: Photo },
    /// The depth map of a capture was written
    DepthSaved { request_id: RequestId, path: PathBuf },
    /// The depth map of a capture was discarded
    DepthDropped { request_id: RequestId, reason: String },
    /// The device reported a failure for a capture
    CaptureFailed { request_id: RequestId, reason: String },
    /// A capture request was finalized
    CaptureCompleted { request_id: RequestId },
}

enum Command {
    Configure,
    Start,
    Stop,
    Capture,
    InFlight(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<Vec<RequestId>>),
}

/// Handle to a capture session running on its own worker task
pub struct PhotoCaptureSession {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    worker: JoinHandle<()>,
}

impl PhotoCaptureSession {
    /// Spawn the session worker on the current tokio runtime.
    ///
    /// Returns the handle and the receiving end of the event channel. Events
    /// queue until read and are never dropped while the receiver is alive.
    pub fn spawn<D: CaptureDevice>(device: D, config: SessionConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Unconfigured);
        let (device_tx, device_rx) = mpsc::unbounded_channel();

        info!(
            "Creating capture session: output_dir={}, encoding={:?}, depth_delivery={}",
            config.output_dir.display(),
            config.depth_encoding,
            config.depth_delivery
        );

        let worker = SessionWorker {
            writer: DepthPersistenceWriter::new(config.depth_encoding),
            device,
            config,
            tracker: CaptureRequestTracker::new(),
            state: state_tx,
            events: event_tx,
            commands: command_rx,
            device_tx,
            device_rx,
            persist_jobs: JoinSet::new(),
            next_id: 1,
            depth_enabled: false,
        };

        let session = Self {
            commands: command_tx,
            state: state_rx,
            worker: tokio::spawn(worker.run()),
        };
        (session, event_rx)
    }

    /// Configure the device; ignored unless the session is unconfigured
    pub fn configure(&self) {
        self.send(Command::Configure);
    }

    /// Start streaming; only valid once configured
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Stop streaming
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Issue a still capture. Results arrive on the event channel.
    pub fn capture_photo(&self) {
        self.send(Command::Capture);
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watch lifecycle state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Number of capture requests in flight, `None` once the worker is gone
    pub async fn in_flight(&self) -> Option<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::InFlight(tx));
        rx.await.ok()
    }

    /// Stop the device, wait for pending depth writes and end the worker.
    ///
    /// Returns the requests that were still in flight.
    pub async fn shutdown(self) -> Vec<RequestId> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx));
        let outstanding = rx.await.unwrap_or_default();
        if let Err(e) = self.worker.await {
            error!("Capture session worker panicked: {}", e);
        }
        outstanding
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Capture session worker has stopped");
        }
    }
}

type PersistResult = (RequestId, Result<PathBuf, PersistError>);

struct SessionWorker<D> {
    device: D,
    config: SessionConfig,
    writer: DepthPersistenceWriter,
    tracker: CaptureRequestTracker,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    device_tx: DeviceEventSender,
    device_rx: mpsc::UnboundedReceiver<DeviceEvent>,
    persist_jobs: JoinSet<PersistResult>,
    next_id: u64,
    depth_enabled: bool,
}

impl<D: CaptureDevice> SessionWorker<D> {
    async fn run(mut self) {
        info!("Capture session worker started");

        let mut leak_check = tokio::time::interval(self.config.leak_check_interval());
        leak_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        self.shutdown().await;
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Some(event) = self.device_rx.recv() => self.handle_device_event(event),
                Some(joined) = self.persist_jobs.join_next(), if !self.persist_jobs.is_empty() => {
                    self.handle_persisted(joined);
                }
                _ = leak_check.tick() => self.report_stale(),
            }
        }

        info!("Capture session worker stopped");
    }

    /// Returns `false` once the worker should exit
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Configure => self.configure(),
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Capture => self.capture(),
            Command::InFlight(reply) => {
                let _ = reply.send(self.tracker.count());
            }
            Command::Shutdown(reply) => {
                let outstanding = self.shutdown().await;
                let _ = reply.send(outstanding);
                return false;
            }
        }
        true
    }

    fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("Session state: {:?}", state);
        self.state.send_replace(state.clone());
        self.emit(SessionEvent::StateChanged(state));
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.events.send(event) {
            debug!("No event receiver, dropping {:?}", e.0);
        }
    }

    fn configure(&mut self) {
        let state = self.current();
        if state != SessionState::Unconfigured {
            debug!("Ignoring configure in state {:?}", state);
            return;
        }

        self.set_state(SessionState::Configuring);
        match self.configure_device() {
            Ok(capabilities) => {
                self.depth_enabled = capabilities.depth_delivery_supported && self.config.depth_delivery;
                if self.config.depth_delivery && !capabilities.depth_delivery_supported {
                    warn!("Depth delivery not supported by device, capturing photos only");
                }
                info!("Capture session configured (depth delivery: {})", self.depth_enabled);
                self.set_state(SessionState::Ready);

                if self.config.auto_start {
                    self.start();
                }
            }
            Err(e) => {
                error!("Capture session configuration failed: {}", e);
                self.set_state(SessionState::Failed(e));
            }
        }
    }

    fn configure_device(&mut self) -> Result<OutputCapabilities, SessionError> {
        let name = self
            .device
            .discover()
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;
        info!("Using depth camera: {}", name);

        self.device
            .configure_input()
            .map_err(|e| SessionError::ConfigurationFailed(e.to_string()))?;
        self.device
            .configure_output()
            .map_err(|e| SessionError::ConfigurationFailed(e.to_string()))
    }

    fn start(&mut self) {
        match self.current() {
            SessionState::Ready => match self.device.start_running() {
                Ok(()) => {
                    info!("Capture session running");
                    self.set_state(SessionState::Running);
                }
                Err(e) => error!("Failed to start capture session: {}", e),
            },
            SessionState::Running => debug!("Capture session already running"),
            state => warn!("Cannot start capture session in state {:?}", state),
        }
    }

    fn stop(&mut self) {
        if self.current() == SessionState::Running {
            self.device.stop_running();
            info!("Capture session stopped");
            self.set_state(SessionState::Ready);
        }
    }

    fn capture(&mut self) {
        match self.current() {
            SessionState::Failed(_) => {
                debug!("Capture ignored, session failed to configure");
                return;
            }
            SessionState::Unconfigured | SessionState::Configuring => {
                warn!("Capture requested before configuration, ignoring");
                return;
            }
            SessionState::Ready | SessionState::Running => {}
        }

        let request_id = RequestId(self.next_id);
        self.next_id += 1;
        let settings = CaptureSettings {
            depth_delivery_enabled: self.depth_enabled,
        };

        if let Err(e) = self.tracker.register(CaptureRequest::new(request_id, settings)) {
            error!("Cannot issue capture: {}", e);
            return;
        }

        debug!("Issuing capture request {} ({:?})", request_id, settings);
        self.emit(SessionEvent::CaptureStarted { request_id });
        self.device.capture(request_id, settings, self.device_tx.clone());
    }

    fn handle_device_event(&mut self, event: DeviceEvent) {
        for outcome in handle_event(&mut self.tracker, event) {
            match outcome {
                CaptureOutcome::PhotoReady { request_id, photo } => {
                    self.emit(SessionEvent::PhotoCaptured { request_id, photo });
                }
                CaptureOutcome::DepthDropped { request_id, reason } => {
                    metrics::counter!("depth_maps_dropped_total").increment(1);
                    self.emit(SessionEvent::DepthDropped { request_id, reason });
                }
                CaptureOutcome::Failed { request_id, reason } => {
                    metrics::counter!("capture_failures_total").increment(1);
                    self.emit(SessionEvent::CaptureFailed { request_id, reason });
                }
                CaptureOutcome::Completed { request_id, depth_image } => {
                    if let Some(image) = depth_image {
                        self.persist(request_id, image);
                    }
                    self.emit(SessionEvent::CaptureCompleted { request_id });
                }
            }
        }
    }

    fn persist(&mut self, request_id: RequestId, image: NormalizedDepthImage) {
        let writer = self.writer;
        let directory = self.config.output_dir.clone();
        self.persist_jobs
            .spawn_blocking(move || (request_id, writer.write(image, &directory)));
    }

    fn handle_persisted(&mut self, joined: Result<PersistResult, JoinError>) {
        match joined {
            Ok((request_id, Ok(path))) => {
                metrics::counter!("depth_maps_written_total").increment(1);
                self.emit(SessionEvent::DepthSaved { request_id, path });
            }
            Ok((request_id, Err(e))) => {
                error!("Error saving depth map for capture request {}: {}", request_id, e);
                metrics::counter!("depth_maps_dropped_total").increment(1);
                self.emit(SessionEvent::DepthDropped {
                    request_id,
                    reason: e.to_string(),
                });
            }
            Err(e) => error!("Depth map writer task failed: {}", e),
        }
    }

    fn report_stale(&self) {
        let threshold = self.config.stale_request_after();
        for request_id in self.tracker.stale(threshold) {
            warn!("Capture request {} still in flight after {:?}", request_id, threshold);
        }
    }

    async fn shutdown(&mut self) -> Vec<RequestId> {
        self.stop();

        while let Some(joined) = self.persist_jobs.join_next().await {
            self.handle_persisted(joined);
        }

        let outstanding = self.tracker.outstanding();
        if !outstanding.is_empty() {
            warn!("Shutting down with {} capture requests in flight: {:?}", outstanding.len(), outstanding);
        }
        outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CapturedPhoto, DeviceError};
    use crate::simulated::{DepthDelivery, SimulatedDevice, SimulatedDeviceConfig};
    use depth_frame::{DepthFormat, RawDepthBuffer};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    /// Scratch root plus the output directory inside it, created on first write
    fn output_dir() -> (TempDir, PathBuf) {
        let root = tempdir().unwrap();
        let dir = root.path().join("depth-maps");
        (root, dir)
    }

    fn config(dir: &Path) -> SessionConfig {
        SessionConfig::with_output_dir(dir)
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<SessionEvent>, mut pred: F) -> SessionEvent
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        loop {
            let event = next_event(events).await;
            if pred(&event) {
                return event;
            }
        }
    }

    fn is_state(state: SessionState) -> impl FnMut(&SessionEvent) -> bool {
        move |e| matches!(e, SessionEvent::StateChanged(s) if *s == state)
    }

    /// Device whose callbacks are delivered by the test
    #[derive(Clone, Default)]
    struct ManualDevice {
        issued: Arc<Mutex<Vec<(RequestId, CaptureSettings, DeviceEventSender)>>>,
        depth_supported: bool,
    }

    impl ManualDevice {
        fn with_depth() -> Self {
            Self {
                depth_supported: true,
                ..Default::default()
            }
        }

        fn take_issued(&self) -> Vec<(RequestId, CaptureSettings, DeviceEventSender)> {
            std::mem::take(&mut *self.issued.lock().unwrap())
        }
    }

    impl CaptureDevice for ManualDevice {
        fn discover(&mut self) -> Result<String, DeviceError> {
            Ok("manual".to_string())
        }

        fn configure_input(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        fn configure_output(&mut self) -> Result<OutputCapabilities, DeviceError> {
            Ok(OutputCapabilities {
                depth_delivery_supported: self.depth_supported,
            })
        }

        fn start_running(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        fn stop_running(&mut self) {}

        fn capture(&mut self, request_id: RequestId, settings: CaptureSettings, events: DeviceEventSender) {
            self.issued.lock().unwrap().push((request_id, settings, events));
        }
    }

    fn jpeg() -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(16, 12))
            .write_to(&mut cursor, ImageFormat::Jpeg)
            .unwrap();
        cursor.into_inner()
    }

    fn depth() -> RawDepthBuffer {
        let samples: Vec<f32> = (0..48).map(|i| 0.2 + i as f32 * 0.01).collect();
        RawDepthBuffer::from_disparity(8, 6, &samples).unwrap()
    }

    async fn running_manual_session(
        device: ManualDevice,
        dir: &Path,
    ) -> (PhotoCaptureSession, mpsc::UnboundedReceiver<SessionEvent>) {
        let (session, mut events) = PhotoCaptureSession::spawn(device, config(dir));
        session.configure();
        wait_for(&mut events, is_state(SessionState::Running)).await;
        (session, events)
    }

    async fn issue(session: &PhotoCaptureSession, device: &ManualDevice, events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> (RequestId, DeviceEventSender) {
        session.capture_photo();
        wait_for(events, |e| matches!(e, SessionEvent::CaptureStarted { .. })).await;
        let (id, settings, tx) = device.take_issued().pop().unwrap();
        assert!(settings.depth_delivery_enabled == device.depth_supported);
        (id, tx)
    }

    async fn assert_one_file_written(order: Vec<&str>) {
        let (_root, dir) = output_dir();
        let device = ManualDevice::with_depth();
        let (session, mut events) = running_manual_session(device.clone(), &dir).await;
        let (request_id, tx) = issue(&session, &device, &mut events).await;
        assert_eq!(request_id, RequestId(1));

        for step in order {
            let event = match step {
                "photo" => DeviceEvent::PhotoProcessed {
                    request_id,
                    result: Ok(CapturedPhoto { data: jpeg(), depth: None }),
                },
                "depth" => DeviceEvent::DepthDelivered { request_id, depth: depth() },
                _ => DeviceEvent::CaptureFinished { request_id, result: Ok(()) },
            };
            tx.send(event).unwrap();
        }

        let saved = wait_for(&mut events, |e| matches!(e, SessionEvent::DepthSaved { .. })).await;
        let SessionEvent::DepthSaved { request_id: saved_id, path } = saved else {
            unreachable!()
        };
        assert_eq!(saved_id, request_id);
        assert_eq!(session.in_flight().await, Some(0));

        assert!(session.shutdown().await.is_empty());
        assert_eq!(files_in(&dir), vec![path]);
    }

    #[tokio::test]
    async fn test_photo_then_depth_writes_one_file() {
        assert_one_file_written(vec!["photo", "depth", "finished"]).await;
    }

    #[tokio::test]
    async fn test_depth_then_photo_writes_one_file() {
        assert_one_file_written(vec!["depth", "photo", "finished"]).await;
    }

    #[tokio::test]
    async fn test_photo_delivered_without_depth() {
        let (_root, dir) = output_dir();
        let device = ManualDevice::with_depth();
        let (session, mut events) = running_manual_session(device.clone(), &dir).await;
        let (request_id, tx) = issue(&session, &device, &mut events).await;

        tx.send(DeviceEvent::PhotoProcessed {
            request_id,
            result: Ok(CapturedPhoto { data: jpeg(), depth: None }),
        })
        .unwrap();
        let photo = wait_for(&mut events, |e| matches!(e, SessionEvent::PhotoCaptured { .. })).await;
        assert!(matches!(photo, SessionEvent::PhotoCaptured { photo, .. } if photo.image().is_some()));
        assert_eq!(session.in_flight().await, Some(1));

        tx.send(DeviceEvent::CaptureFinished { request_id, result: Ok(()) }).unwrap();
        wait_for(&mut events, |e| matches!(e, SessionEvent::CaptureCompleted { .. })).await;

        assert!(session.shutdown().await.is_empty());
        assert!(files_in(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_unfinished_request_is_reported() {
        let (_root, dir) = output_dir();
        let device = ManualDevice::with_depth();
        let (session, mut events) = running_manual_session(device.clone(), &dir).await;
        let (request_id, _tx) = issue(&session, &device, &mut events).await;

        assert_eq!(session.shutdown().await, vec![request_id]);
    }

    #[tokio::test]
    async fn test_request_ids_increase() {
        let (_root, dir) = output_dir();
        let device = ManualDevice::default();
        let (session, mut events) = running_manual_session(device.clone(), &dir).await;

        let (first, _) = issue(&session, &device, &mut events).await;
        let (second, _) = issue(&session, &device, &mut events).await;
        assert!(second > first);
        assert_eq!(session.in_flight().await, Some(2));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_events_survive_unread_backlog() {
        const CAPTURES: usize = 40;

        let (_root, dir) = output_dir();
        let device = SimulatedDevice::new(SimulatedDeviceConfig {
            photo_width: 32,
            photo_height: 24,
            depth_width: 16,
            depth_height: 12,
            ..Default::default()
        });
        let (session, mut events) = PhotoCaptureSession::spawn(device, config(&dir));
        session.configure();
        for _ in 0..CAPTURES {
            session.capture_photo();
        }

        // Nothing is read until every request has been finalized
        tokio::time::timeout(Duration::from_secs(30), async {
            while session.in_flight().await != Some(0) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("captures did not finish");
        assert!(session.shutdown().await.is_empty());

        let (mut photos, mut saved, mut completed) = (0, 0, 0);
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::PhotoCaptured { .. } => photos += 1,
                SessionEvent::DepthSaved { .. } => saved += 1,
                SessionEvent::CaptureCompleted { .. } => completed += 1,
                _ => {}
            }
        }
        assert_eq!((photos, saved, completed), (CAPTURES, CAPTURES, CAPTURES));
        assert_eq!(files_in(&dir).len(), CAPTURES);
    }

    #[tokio::test]
    async fn test_simulated_capture_without_depth_support() {
        let (_root, dir) = output_dir();
        let device = SimulatedDevice::new(SimulatedDeviceConfig {
            depth_supported: false,
            ..Default::default()
        });
        let (session, mut events) = PhotoCaptureSession::spawn(device, config(&dir));
        session.configure();
        session.capture_photo();

        wait_for(&mut events, |e| matches!(e, SessionEvent::PhotoCaptured { .. })).await;
        wait_for(&mut events, |e| matches!(e, SessionEvent::CaptureCompleted { .. })).await;

        assert_eq!(session.state(), SessionState::Running);
        assert!(session.shutdown().await.is_empty());
        assert!(files_in(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_simulated_capture_each_delivery_order() {
        for delivery in [DepthDelivery::Inline, DepthDelivery::BeforePhoto, DepthDelivery::AfterPhoto] {
            let (_root, dir) = output_dir();
            let device = SimulatedDevice::new(SimulatedDeviceConfig {
                depth_delivery: delivery,
                ..Default::default()
            });
            let (session, mut events) = PhotoCaptureSession::spawn(device, config(&dir));
            session.configure();
            session.capture_photo();
            session.capture_photo();

            for _ in 0..2 {
                wait_for(&mut events, |e| matches!(e, SessionEvent::DepthSaved { .. })).await;
            }
            assert!(session.shutdown().await.is_empty());
            assert_eq!(files_in(&dir).len(), 2, "{:?}", delivery);
            }
    }

    #[tokio::test]
    async fn test_unsupported_depth_format_drops_depth_only() {
        let (_root, dir) = output_dir();
        let device = SimulatedDevice::new(SimulatedDeviceConfig {
            depth_format: DepthFormat::Unknown(u32::from_be_bytes(*b"L008")),
            ..Default::default()
        });
        let (session, mut events) = PhotoCaptureSession::spawn(device, config(&dir));
        session.configure();
        session.capture_photo();

        wait_for(&mut events, |e| matches!(e, SessionEvent::DepthDropped { .. })).await;
        wait_for(&mut events, |e| matches!(e, SessionEvent::CaptureCompleted { .. })).await;
        assert_eq!(session.state(), SessionState::Running);
        assert!(session.shutdown().await.is_empty());
        assert!(files_in(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_session_running() {
        let (_root, dir) = output_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let (session, mut events) = PhotoCaptureSession::spawn(SimulatedDevice::default(), config(&blocker));
        session.configure();
        session.capture_photo();

        wait_for(&mut events, |e| matches!(e, SessionEvent::DepthDropped { .. })).await;
        assert_eq!(session.state(), SessionState::Running);

        session.capture_photo();
        wait_for(&mut events, |e| matches!(e, SessionEvent::CaptureStarted { request_id } if *request_id == RequestId(2))).await;
        assert!(session.shutdown().await.is_empty());
    }

    #[tokio::test]
    async fn test_device_failure_finalizes_request() {
        let (_root, dir) = output_dir();
        let device = SimulatedDevice::new(SimulatedDeviceConfig {
            fail_captures: true,
            ..Default::default()
        });
        let (session, mut events) = PhotoCaptureSession::spawn(device, config(&dir));
        session.configure();
        session.capture_photo();

        wait_for(&mut events, |e| matches!(e, SessionEvent::CaptureFailed { .. })).await;
        wait_for(&mut events, |e| matches!(e, SessionEvent::CaptureCompleted { .. })).await;
        assert_eq!(session.in_flight().await, Some(0));
        assert!(session.shutdown().await.is_empty());
        assert!(files_in(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_missing_device_fails_once() {
        let device = SimulatedDevice::new(SimulatedDeviceConfig {
            available: false,
            ..Default::default()
        });
        let (session, mut events) = PhotoCaptureSession::spawn(device, SessionConfig::default());
        session.configure();

        wait_for(&mut events, is_state(SessionState::Configuring)).await;
        let failed = next_event(&mut events).await;
        assert!(matches!(
            failed,
            SessionEvent::StateChanged(SessionState::Failed(SessionError::DeviceUnavailable(_)))
        ));

        // Terminal: no retry, captures are silent no-ops
        session.configure();
        session.capture_photo();
        session.start();
        assert_eq!(session.in_flight().await, Some(0));
        assert!(events.try_recv().is_err());
        assert!(matches!(session.state(), SessionState::Failed(_)));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_output_is_configuration_failure() {
        let device = SimulatedDevice::new(SimulatedDeviceConfig {
            reject_output: true,
            ..Default::default()
        });
        let (session, mut events) = PhotoCaptureSession::spawn(device, SessionConfig::default());
        session.configure();

        let failed = wait_for(&mut events, |e| matches!(e, SessionEvent::StateChanged(SessionState::Failed(_)))).await;
        assert!(matches!(
            failed,
            SessionEvent::StateChanged(SessionState::Failed(SessionError::ConfigurationFailed(_)))
        ));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_start_and_stop() {
        let (_root, dir) = output_dir();
        let config = SessionConfig {
            auto_start: false,
            ..config(&dir)
        };
        let (session, mut events) = PhotoCaptureSession::spawn(ManualDevice::default(), config);

        session.capture_photo();
        session.configure();
        wait_for(&mut events, is_state(SessionState::Ready)).await;
        // The capture sent before configuring was dropped
        assert_eq!(session.in_flight().await, Some(0));

        session.start();
        wait_for(&mut events, is_state(SessionState::Running)).await;
        session.start();
        session.stop();
        wait_for(&mut events, is_state(SessionState::Ready)).await;
        assert_eq!(session.state(), SessionState::Ready);
        session.shutdown().await;
    }
}
