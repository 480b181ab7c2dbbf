// SPDX-License-Identifier: GPL-3.0-only

//! Virtual RAW sensor backend
//!
//! A software camera that behaves like a platform camera service: opening,
//! session configuration and captures all answer through the callback sink
//! rather than through return values. Frames are synthetic Bayer gradients.
//!
//! Used by the CLI and by tests, which also drive its fault hooks
//! (permission denial, disconnects, submit failures, silent devices).

use super::frame_queue::FrameProducer;
use super::types::*;
use super::{
    CallbackSink, CameraBackend, CameraCallback, CameraDevice, CaptureSession, SessionOutputs,
};
use crate::constants::{FALLBACK_SENSOR_SIZE, sensor, timing};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Order in which a still capture reports its two halves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryOrder {
    /// Completion metadata is posted before the frame lands in the queue
    #[default]
    MetadataFirst,
    /// The frame lands in the queue before the metadata is posted
    FrameFirst,
}

/// Behaviour of the virtual sensor
#[derive(Debug, Clone)]
pub struct VirtualSensorConfig {
    /// Camera identifiers, primary first
    pub camera_ids: Vec<String>,
    /// Reported pixel array; `None` simulates a camera without that key
    pub pixel_array_size: Option<Size>,
    pub cfa_pattern: CfaPattern,
    pub orientation: SensorRotation,
    /// Whether camera permission starts out granted
    pub permission_granted: bool,
    pub delivery_order: DeliveryOrder,
    /// Report every session configuration as failed
    pub fail_session_configuration: bool,
    /// Never answer open requests
    pub silent_open: bool,
    /// Render a repeating preview stream while a session is active
    pub stream_preview: bool,
}

impl Default for VirtualSensorConfig {
    fn default() -> Self {
        Self {
            camera_ids: vec!["0".to_string()],
            pixel_array_size: Some(FALLBACK_SENSOR_SIZE.into()),
            cfa_pattern: CfaPattern::Rggb,
            orientation: SensorRotation::Rotate90,
            permission_granted: true,
            delivery_order: DeliveryOrder::MetadataFirst,
            fail_session_configuration: false,
            silent_open: false,
            stream_preview: true,
        }
    }
}

/// State shared between the backend handle and its devices and sessions
struct SensorShared {
    config: VirtualSensorConfig,
    epoch: Instant,
    permission: AtomicBool,
    permission_requests: AtomicUsize,
    open_devices: AtomicUsize,
    open_sessions: AtomicUsize,
    next_request_id: AtomicU64,
    frame_sequence: AtomicU64,
    /// Open camera and the sink its device callbacks go to
    open_camera: Mutex<Option<(String, CallbackSink)>>,
    /// RAW output of the active session
    active_output: Mutex<Option<FrameProducer>>,
    fail_next_submit: Mutex<Option<BackendError>>,
}

impl SensorShared {
    fn timestamp_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn characteristics(&self, camera_id: &str) -> CameraCharacteristics {
        CameraCharacteristics {
            camera_id: camera_id.to_string(),
            make: "Virtual".to_string(),
            model: "RAW Sensor".to_string(),
            pixel_array_size: self.config.pixel_array_size,
            cfa_pattern: self.config.cfa_pattern,
            black_level: sensor::VIRTUAL_BLACK_LEVEL,
            white_level: sensor::VIRTUAL_WHITE_LEVEL,
            color_matrix: [
                [0.6722, -0.0635, -0.0963],
                [-0.4287, 1.2460, 0.2028],
                [-0.0908, 0.2162, 0.5668],
            ],
            orientation: self.config.orientation,
        }
    }

    /// Build a synthetic Bayer frame: a diagonal ramp with per-channel gain
    fn synthesize(&self, size: Size) -> RawImage {
        let black = sensor::VIRTUAL_BLACK_LEVEL as u32;
        let range = (sensor::VIRTUAL_WHITE_LEVEL - sensor::VIRTUAL_BLACK_LEVEL) as u32;
        let colors = self.config.cfa_pattern.colors();
        let gains = [3u32, 4, 2];
        let sequence = self.frame_sequence.fetch_add(1, Ordering::Relaxed) as u32;
        let span = (size.width + size.height).max(1);

        let mut data = Vec::with_capacity(size.area());
        for y in 0..size.height {
            let row_colors = &colors[((y & 1) * 2) as usize..];
            for x in 0..size.width {
                let channel = row_colors[(x & 1) as usize] as usize;
                let ramp = ((x + y + sequence) % span) * range / span;
                let value = black + ramp * gains[channel] / 4;
                data.push(value.min(black + range) as u16);
            }
        }

        RawImage {
            width: size.width,
            height: size.height,
            data,
            sensor_timestamp_ns: self.timestamp_ns(),
        }
    }
}

/// Software camera service
pub struct VirtualSensorBackend {
    shared: Arc<SensorShared>,
}

impl VirtualSensorBackend {
    pub fn new(config: VirtualSensorConfig) -> Self {
        info!(
            cameras = config.camera_ids.len(),
            pixel_array = ?config.pixel_array_size,
            "Creating virtual sensor backend"
        );
        Self {
            shared: Arc::new(SensorShared {
                permission: AtomicBool::new(config.permission_granted),
                config,
                epoch: Instant::now(),
                permission_requests: AtomicUsize::new(0),
                open_devices: AtomicUsize::new(0),
                open_sessions: AtomicUsize::new(0),
                next_request_id: AtomicU64::new(1),
                frame_sequence: AtomicU64::new(0),
                open_camera: Mutex::new(None),
                active_output: Mutex::new(None),
                fail_next_submit: Mutex::new(None),
            }),
        }
    }

    /// Simulate the user answering the permission dialog
    pub fn set_permission(&self, granted: bool) {
        self.shared.permission.store(granted, Ordering::SeqCst);
    }

    /// How many times permission was requested
    pub fn permission_requests(&self) -> usize {
        self.shared.permission_requests.load(Ordering::SeqCst)
    }

    /// Devices currently open
    pub fn open_devices(&self) -> usize {
        self.shared.open_devices.load(Ordering::SeqCst)
    }

    /// Sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::SeqCst)
    }

    /// Push a frame into the active RAW output without a capture request,
    /// as a frame travelling through the general preview pipeline would
    pub fn inject_frame(&self) -> bool {
        let producer = lock(&self.shared.active_output).clone();
        match producer {
            Some(producer) => producer.deliver(self.shared.synthesize(producer.size())),
            None => {
                warn!("No active session to inject a frame into");
                false
            }
        }
    }

    /// Simulate the camera being unplugged or claimed by another client
    pub fn disconnect(&self) {
        let open = lock(&self.shared.open_camera).clone();
        if let Some((camera_id, callbacks)) = open {
            info!(camera_id = %camera_id, "Virtual camera disconnecting");
            lock(&self.shared.active_output).take();
            callbacks.post(CameraCallback::Disconnected { camera_id });
        }
    }

    /// Make the next capture submission fail with `error`
    pub fn fail_next_submit(&self, error: BackendError) {
        *lock(&self.shared.fail_next_submit) = Some(error);
    }
}

impl CameraBackend for VirtualSensorBackend {
    fn name(&self) -> &str {
        "virtual"
    }

    fn camera_ids(&self) -> BackendResult<Vec<String>> {
        Ok(self.shared.config.camera_ids.clone())
    }

    fn characteristics(&self, camera_id: &str) -> BackendResult<CameraCharacteristics> {
        if !self.shared.config.camera_ids.iter().any(|id| id == camera_id) {
            return Err(BackendError::DeviceNotFound(camera_id.to_string()));
        }
        Ok(self.shared.characteristics(camera_id))
    }

    fn has_camera_permission(&self) -> bool {
        self.shared.permission.load(Ordering::SeqCst)
    }

    fn request_camera_permission(&self) {
        self.shared.permission_requests.fetch_add(1, Ordering::SeqCst);
        debug!("Camera permission requested");
    }

    fn open_camera(&self, camera_id: &str, callbacks: CallbackSink) -> BackendResult<()> {
        if !self.has_camera_permission() {
            return Err(BackendError::PermissionDenied);
        }
        let characteristics = self.characteristics(camera_id)?;

        if self.shared.config.silent_open {
            debug!(camera_id, "Virtual camera ignoring open request");
            return Ok(());
        }

        *lock(&self.shared.open_camera) = Some((camera_id.to_string(), callbacks.clone()));
        self.shared.open_devices.fetch_add(1, Ordering::SeqCst);

        let device = VirtualDevice {
            camera_id: camera_id.to_string(),
            raw_size: characteristics
                .pixel_array_size
                .unwrap_or_else(|| FALLBACK_SENSOR_SIZE.into()),
            shared: Arc::clone(&self.shared),
            closed: false,
        };
        callbacks.post(CameraCallback::Opened(Box::new(device)));
        Ok(())
    }
}

struct VirtualDevice {
    camera_id: String,
    raw_size: Size,
    shared: Arc<SensorShared>,
    closed: bool,
}

impl CameraDevice for VirtualDevice {
    fn id(&self) -> &str {
        &self.camera_id
    }

    fn create_capture_session(
        &mut self,
        outputs: SessionOutputs,
        callbacks: CallbackSink,
    ) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::InvalidState("camera is closed".into()));
        }
        if self.shared.config.fail_session_configuration {
            callbacks.post(CameraCallback::SessionConfigureFailed {
                reason: "virtual sensor configured to reject sessions".into(),
            });
            return Ok(());
        }
        if outputs.raw.size() != self.raw_size {
            callbacks.post(CameraCallback::SessionConfigureFailed {
                reason: format!(
                    "RAW output {} does not match sensor {}",
                    outputs.raw.size(),
                    self.raw_size
                ),
            });
            return Ok(());
        }

        *lock(&self.shared.active_output) = Some(outputs.raw.clone());
        self.shared.open_sessions.fetch_add(1, Ordering::SeqCst);

        let session = VirtualSession {
            shared: Arc::clone(&self.shared),
            outputs,
            preview: None,
            closed: false,
        };
        callbacks.post(CameraCallback::SessionConfigured(Box::new(session)));
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.shared.open_devices.fetch_sub(1, Ordering::SeqCst);
        lock(&self.shared.open_camera).take();
        debug!(camera_id = %self.camera_id, "Virtual camera closed");
        Ok(())
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct VirtualSession {
    shared: Arc<SensorShared>,
    outputs: SessionOutputs,
    preview: Option<PreviewLoop>,
    closed: bool,
}

impl CaptureSession for VirtualSession {
    fn capture(
        &mut self,
        request: CaptureRequest,
        callbacks: CallbackSink,
    ) -> BackendResult<RequestId> {
        if self.closed {
            return Err(BackendError::InvalidState("session is closed".into()));
        }
        if let Some(error) = lock(&self.shared.fail_next_submit).take() {
            return Err(error);
        }

        let request_id = self.shared.next_request_id.fetch_add(1, Ordering::SeqCst);
        let image = request
            .targets_raw()
            .then(|| self.shared.synthesize(self.outputs.raw.size()));
        let result = CaptureResult {
            request_id,
            sensor_timestamp_ns: image
                .as_ref()
                .map(|image| image.sensor_timestamp_ns)
                .unwrap_or_else(|| self.shared.timestamp_ns()),
            exposure_time_ns: Some(timing::VIRTUAL_EXPOSURE_NS),
            sensitivity_iso: Some(sensor::VIRTUAL_ISO),
            ae_mode: request.ae_mode,
            ae_lock: request.ae_lock,
            as_shot_neutral: Some([0.5, 1.0, 0.625]),
            focus_distance: Some(0.0),
        };

        debug!(request_id, order = ?self.shared.config.delivery_order, "Virtual capture");
        match self.shared.config.delivery_order {
            DeliveryOrder::MetadataFirst => {
                callbacks.post(CameraCallback::CaptureCompleted(result));
                if let Some(image) = image {
                    self.outputs.raw.deliver(image);
                }
            }
            DeliveryOrder::FrameFirst => {
                if let Some(image) = image {
                    self.outputs.raw.deliver(image);
                }
                callbacks.post(CameraCallback::CaptureCompleted(result));
            }
        }

        Ok(request_id)
    }

    fn set_repeating_request(&mut self, request: CaptureRequest) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::InvalidState("session is closed".into()));
        }
        if !self.shared.config.stream_preview || request.template != RequestTemplate::Preview {
            return Ok(());
        }
        if self.preview.is_none() {
            self.preview = Some(PreviewLoop::start(self.outputs.preview.clone()));
        }
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(mut preview) = self.preview.take() {
            preview.stop();
        }
        lock(&self.shared.active_output).take();
        self.shared.open_sessions.fetch_sub(1, Ordering::SeqCst);
        debug!("Virtual session closed");
        Ok(())
    }
}

impl Drop for VirtualSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Thread rendering the repeating preview request
struct PreviewLoop {
    stop_signal: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PreviewLoop {
    fn start(surface: PreviewSurface) -> Self {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop_signal);
        let handle = thread::Builder::new()
            .name("virtual-preview".into())
            .spawn(move || {
                while !stop_clone.load(Ordering::SeqCst) {
                    surface.present_frame();
                    thread::sleep(timing::PREVIEW_FRAME_INTERVAL);
                }
            })
            .map_err(|e| warn!(error = %e, "Failed to start virtual preview thread"))
            .ok();
        Self {
            stop_signal,
            handle,
        }
    }

    fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Virtual preview thread panicked");
        }
    }
}

impl Drop for PreviewLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::FrameQueue;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    fn small_config() -> VirtualSensorConfig {
        VirtualSensorConfig {
            pixel_array_size: Some(Size::new(8, 6)),
            stream_preview: false,
            ..Default::default()
        }
    }

    fn sink() -> (CallbackSink, UnboundedReceiver<CameraCallback>) {
        let (tx, rx) = unbounded_channel();
        (CallbackSink::from_sender(tx), rx)
    }

    fn open(
        backend: &VirtualSensorBackend,
    ) -> (
        Box<dyn CameraDevice>,
        CallbackSink,
        UnboundedReceiver<CameraCallback>,
    ) {
        let (callbacks, mut rx) = sink();
        backend.open_camera("0", callbacks.clone()).unwrap();
        match rx.try_recv() {
            Ok(CameraCallback::Opened(device)) => (device, callbacks, rx),
            other => panic!("expected Opened, got {:?}", other),
        }
    }

    #[test]
    fn test_open_requires_permission() {
        let backend = VirtualSensorBackend::new(VirtualSensorConfig {
            permission_granted: false,
            ..small_config()
        });
        let (callbacks, mut rx) = sink();
        assert_eq!(
            backend.open_camera("0", callbacks),
            Err(BackendError::PermissionDenied)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_open_unknown_camera() {
        let backend = VirtualSensorBackend::new(small_config());
        let (callbacks, _rx) = sink();
        assert!(matches!(
            backend.open_camera("7", callbacks),
            Err(BackendError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_capture_delivers_metadata_then_frame() {
        let backend = VirtualSensorBackend::new(small_config());
        let (mut device, callbacks, mut rx) = open(&backend);

        let queue = FrameQueue::new(Size::new(8, 6), 5, callbacks.clone());
        let outputs = SessionOutputs {
            preview: PreviewSurface::new(Size::new(4, 4)),
            raw: queue.producer(),
        };
        device.create_capture_session(outputs, callbacks.clone()).unwrap();
        let mut session = match rx.try_recv() {
            Ok(CameraCallback::SessionConfigured(session)) => session,
            other => panic!("expected SessionConfigured, got {:?}", other),
        };
        assert_eq!(backend.open_sessions(), 1);

        let id = session.capture(CaptureRequest::still_raw(), callbacks).unwrap();
        match rx.try_recv() {
            Ok(CameraCallback::CaptureCompleted(result)) => {
                assert_eq!(result.request_id, id);
                assert_eq!(result.ae_mode, AeMode::On);
                assert!(!result.ae_lock);
            }
            other => panic!("expected CaptureCompleted, got {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Ok(CameraCallback::FrameAvailable)));

        let frame = queue.acquire_latest().unwrap();
        assert_eq!(frame.data().len(), 48);
        assert!(frame.data().iter().all(|&v| {
            (sensor::VIRTUAL_BLACK_LEVEL..=sensor::VIRTUAL_WHITE_LEVEL).contains(&v)
        }));

        session.close().unwrap();
        device.close().unwrap();
        assert_eq!(backend.open_sessions(), 0);
        assert_eq!(backend.open_devices(), 0);
    }

    #[test]
    fn test_frame_first_order() {
        let backend = VirtualSensorBackend::new(VirtualSensorConfig {
            delivery_order: DeliveryOrder::FrameFirst,
            ..small_config()
        });
        let (mut device, callbacks, mut rx) = open(&backend);
        let queue = FrameQueue::new(Size::new(8, 6), 5, callbacks.clone());
        device
            .create_capture_session(
                SessionOutputs {
                    preview: PreviewSurface::new(Size::new(4, 4)),
                    raw: queue.producer(),
                },
                callbacks.clone(),
            )
            .unwrap();
        let Ok(CameraCallback::SessionConfigured(mut session)) = rx.try_recv() else {
            panic!("session not configured");
        };

        session.capture(CaptureRequest::still_raw(), callbacks).unwrap();
        assert!(matches!(rx.try_recv(), Ok(CameraCallback::FrameAvailable)));
        assert!(matches!(rx.try_recv(), Ok(CameraCallback::CaptureCompleted(_))));
    }

    #[test]
    fn test_injected_submit_failure() {
        let backend = VirtualSensorBackend::new(small_config());
        let (mut device, callbacks, mut rx) = open(&backend);
        let queue = FrameQueue::new(Size::new(8, 6), 5, callbacks.clone());
        device
            .create_capture_session(
                SessionOutputs {
                    preview: PreviewSurface::new(Size::new(4, 4)),
                    raw: queue.producer(),
                },
                callbacks.clone(),
            )
            .unwrap();
        let Ok(CameraCallback::SessionConfigured(mut session)) = rx.try_recv() else {
            panic!("session not configured");
        };

        backend.fail_next_submit(BackendError::Disconnected);
        assert_eq!(
            session.capture(CaptureRequest::still_raw(), callbacks.clone()),
            Err(BackendError::Disconnected)
        );
        assert!(session.capture(CaptureRequest::still_raw(), callbacks).is_ok());
    }

    #[test]
    fn test_dropping_device_closes_it() {
        let backend = VirtualSensorBackend::new(small_config());
        let (device, _callbacks, _rx) = open(&backend);
        assert_eq!(backend.open_devices(), 1);
        drop(device);
        assert_eq!(backend.open_devices(), 0);
    }
}
