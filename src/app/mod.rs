// SPDX-License-Identifier: MPL-2.0

//! RAW capture screen
//!
//! [`RawCaptureScreen`] is the UI-facing side of the application. It owns
//! the camera worker while started and forwards user intents to it;
//! everything the worker has to report comes back as [`ScreenEvent`]s.
//!
//! # Architecture
//!
//! - `state`: worker-owned [`CameraContext`], [`Command`], [`ScreenEvent`]
//! - `handlers`: command and camera-callback handlers run on the worker
//!
//! # Lifecycle
//!
//! ```text
//! start() → surface_available() → [permission_result()] → capture()* → stop()
//! ```

mod handlers;
mod state;

pub use state::{CameraContext, Command, ScreenEvent};

use crate::backends::camera::{
    CameraBackend, CameraSessionManager, CameraWorker, PreviewSurface,
};
use crate::config::Config;
use crate::constants::{CAMERA_PREPARING_MESSAGE, CAMERA_WORKER_THREAD, PREVIEW_BUFFER_SIZE};
use crate::errors::{AppError, AppResult, CaptureError};
use crate::pipelines::photo::{CaptureOrchestrator, DngEncoder, PhotoWriter};
use crate::storage::PhotoStorage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};

/// Camera screen: preview plus a single RAW capture action
pub struct RawCaptureScreen {
    config: Config,
    backend: Arc<dyn CameraBackend>,
    storage: PhotoStorage,
    encoder: Arc<dyn DngEncoder>,
    events: UnboundedSender<ScreenEvent>,
    ready: Arc<AtomicBool>,
    worker: Option<CameraWorker<Command>>,
}

impl RawCaptureScreen {
    /// Create a stopped screen and the receiver for its events
    pub fn new(
        config: Config,
        backend: Arc<dyn CameraBackend>,
        storage: PhotoStorage,
        encoder: Arc<dyn DngEncoder>,
    ) -> (Self, UnboundedReceiver<ScreenEvent>) {
        let (events, receiver) = unbounded_channel();
        let screen = Self {
            config,
            backend,
            storage,
            encoder,
            events,
            ready: Arc::new(AtomicBool::new(false)),
            worker: None,
        };
        (screen, receiver)
    }

    /// Preview surface matching the preview buffer size
    pub fn preview_surface() -> PreviewSurface {
        PreviewSurface::new(PREVIEW_BUFFER_SIZE.into())
    }

    /// Start the camera worker
    pub fn start(&mut self) -> AppResult<()> {
        if self.worker.is_some() {
            debug!("Screen already started");
            return Ok(());
        }

        let writer = PhotoWriter::new(self.storage.clone(), Arc::clone(&self.encoder));
        let context = CameraContext::new(
            CameraSessionManager::new(Arc::clone(&self.backend)),
            CaptureOrchestrator::new(writer),
            self.config.camera_id.clone(),
            self.config.timeouts,
            Arc::clone(&self.ready),
            self.events.clone(),
        );
        self.worker = Some(CameraWorker::start(CAMERA_WORKER_THREAD, context)?);
        info!(backend = self.backend.name(), "Screen started");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.worker.is_some()
    }

    /// True while a capture session is configured
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// The preview surface exists; opens the camera
    pub fn surface_available(&self, surface: PreviewSurface) -> AppResult<()> {
        self.send(Command::SurfaceAvailable(surface))
    }

    /// The preview surface is gone; releases the camera
    pub fn surface_destroyed(&self) -> AppResult<()> {
        self.send(Command::SurfaceDestroyed)
    }

    /// Deliver the user's answer to the permission request
    pub fn permission_result(&self, granted: bool) -> AppResult<()> {
        self.send(Command::PermissionResult(granted))
    }

    /// Take one RAW still
    ///
    /// Fails with [`CaptureError::SessionNotReady`] (and a notification
    /// event) while no capture session is configured.
    pub fn capture(&self) -> AppResult<()> {
        if self.worker.is_none() || !self.is_ready() {
            warn!("Capture requested before the camera is ready");
            let notification = ScreenEvent::Notification(CAMERA_PREPARING_MESSAGE.to_string());
            if self.events.send(notification).is_err() {
                debug!("Screen event dropped, receiver is gone");
            }
            return Err(CaptureError::SessionNotReady.into());
        }
        self.send(Command::Capture)
    }

    /// Release the camera and stop the worker
    ///
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            info!("Stopping screen");
            worker.stop();
        }
        self.ready.store(false, Ordering::SeqCst);
    }

    fn send(&self, command: Command) -> AppResult<()> {
        let Some(worker) = &self.worker else {
            return Err(AppError::Worker("screen is not started".into()));
        };
        if worker.send(command) {
            Ok(())
        } else {
            Err(AppError::Worker("camera worker has exited".into()))
        }
    }
}

impl Drop for RawCaptureScreen {
    fn drop(&mut self) {
        self.stop();
    }
}
