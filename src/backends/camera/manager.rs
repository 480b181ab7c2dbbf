// SPDX-License-Identifier: GPL-3.0-only

//! Camera session lifecycle manager
//!
//! Owns the open camera, its capture session and the RAW frame queue, and
//! enforces their ordering rules:
//! - a session is only requested after the camera-open callback,
//! - only one camera (and one session) is open at a time,
//! - teardown releases session, then camera, then frame queue.
//!
//! Lives on the camera worker thread; every method is called from there.

use super::frame_queue::FrameQueue;
use super::types::*;
use super::{CallbackSink, CameraBackend, CameraDevice, CaptureSession, SessionOutputs};
use crate::constants::{FALLBACK_SENSOR_SIZE, FRAME_QUEUE_CAPACITY};
use crate::errors::{AccessError, CameraError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where the manager is in the open → configure lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing open
    Closed,
    /// Open requested, waiting for the camera-open callback
    Opening,
    /// Camera open, waiting for the session-configured callback
    Configuring,
    /// Camera open, session not requested yet
    Open,
    /// Session configured, captures allowed
    Ready,
}

/// Camera session manager
pub struct CameraSessionManager {
    backend: Arc<dyn CameraBackend>,
    state: SessionState,
    camera_id: Option<String>,
    characteristics: Option<CameraCharacteristics>,
    preview: Option<PreviewSurface>,
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CaptureSession>>,
    frame_queue: Option<FrameQueue>,
}

impl CameraSessionManager {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        info!(backend = backend.name(), "Creating camera session manager");
        Self {
            backend,
            state: SessionState::Closed,
            camera_id: None,
            characteristics: None,
            preview: None,
            device: None,
            session: None,
            frame_queue: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once captures may be submitted
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready && self.session.is_some()
    }

    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    pub fn characteristics(&self) -> Option<&CameraCharacteristics> {
        self.characteristics.as_ref()
    }

    pub fn frame_queue(&self) -> Option<&FrameQueue> {
        self.frame_queue.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut (dyn CaptureSession + 'static)> {
        self.session.as_deref_mut()
    }

    /// Start opening a camera
    ///
    /// Uses `camera_id` when given, otherwise the backend's primary camera.
    /// Without camera permission the backend is asked for it and the attempt
    /// fails with [`CameraError::PermissionDenied`]; the caller retries once
    /// permission is granted.
    pub fn open(
        &mut self,
        camera_id: Option<&str>,
        preview: PreviewSurface,
        callbacks: CallbackSink,
    ) -> Result<String, CameraError> {
        if self.state != SessionState::Closed {
            warn!(state = ?self.state, "Camera open requested while a camera is active");
            return Err(CameraError::AlreadyOpen);
        }

        let camera_id = match camera_id {
            Some(id) => id.to_string(),
            None => self
                .backend
                .camera_ids()?
                .into_iter()
                .next()
                .ok_or(CameraError::NoCameraFound)?,
        };
        debug!(camera_id = %camera_id, "Camera selected");

        let characteristics = self.backend.characteristics(&camera_id)?;
        match characteristics.pixel_array_size {
            Some(size) => info!(camera_id = %camera_id, %size, "Camera resolution"),
            None => warn!(camera_id = %camera_id, "Camera does not report its pixel array size"),
        }

        if !self.backend.has_camera_permission() {
            error!("Camera permission not granted, requesting it");
            self.backend.request_camera_permission();
            return Err(CameraError::PermissionDenied);
        }

        info!(camera_id = %camera_id, "Opening camera");
        self.backend.open_camera(&camera_id, callbacks)?;

        self.state = SessionState::Opening;
        self.camera_id = Some(camera_id.clone());
        self.characteristics = Some(characteristics);
        self.preview = Some(preview);
        Ok(camera_id)
    }

    /// Camera-open callback: configure the RAW queue and request the session
    pub fn on_opened(
        &mut self,
        device: Box<dyn CameraDevice>,
        callbacks: CallbackSink,
    ) -> Result<(), CameraError> {
        if self.state != SessionState::Opening {
            warn!(
                camera_id = device.id(),
                state = ?self.state,
                "Camera opened after it was no longer wanted, closing it"
            );
            close_device(device);
            return Ok(());
        }

        info!(camera_id = device.id(), "Camera opened, creating session");
        self.device = Some(device);
        self.state = SessionState::Open;
        let result = self.build_session(callbacks);
        if result.is_err() {
            self.close();
        }
        result
    }

    /// Configure the frame queue and request a session bound to the preview
    /// surface and the queue
    pub fn build_session(&mut self, callbacks: CallbackSink) -> Result<(), CameraError> {
        let Some(device) = self.device.as_mut() else {
            return Err(CameraError::NotOpen);
        };
        let Some(preview) = self.preview.clone() else {
            return Err(CameraError::Config("no preview surface".into()));
        };

        let raw_size = self
            .characteristics
            .as_ref()
            .and_then(|c| c.pixel_array_size)
            .unwrap_or_else(|| FALLBACK_SENSOR_SIZE.into());
        info!(%raw_size, capacity = FRAME_QUEUE_CAPACITY, "Configuring RAW frame queue");

        if let Some(old) = self.frame_queue.take() {
            old.close();
        }
        let queue = FrameQueue::new(raw_size, FRAME_QUEUE_CAPACITY, callbacks.clone());
        let outputs = SessionOutputs {
            preview,
            raw: queue.producer(),
        };
        self.frame_queue = Some(queue);

        debug!("Requesting capture session");
        match device.create_capture_session(outputs, callbacks) {
            Ok(()) => {
                self.state = SessionState::Configuring;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Capture session request rejected");
                self.state = SessionState::Open;
                Err(e.into())
            }
        }
    }

    /// Session-configured callback
    ///
    /// Returns false when the session arrived for a camera that is no
    /// longer open; such a session is closed right away.
    pub fn on_session_configured(&mut self, mut session: Box<dyn CaptureSession>) -> bool {
        if self.state != SessionState::Configuring || self.device.is_none() {
            warn!(state = ?self.state, "Stale capture session configured, closing it");
            if let Err(e) = session.close() {
                warn!(error = %e, "Failed to close stale session");
            }
            return false;
        }

        if let Err(e) = session.set_repeating_request(CaptureRequest::preview()) {
            warn!(error = %e, "Failed to start preview stream");
        }
        self.session = Some(session);
        self.state = SessionState::Ready;
        info!("Capture session configured");
        true
    }

    /// Session-configure-failed callback
    ///
    /// Releases the camera so that a later [`open`](Self::open) can retry.
    pub fn on_session_configure_failed(&mut self, reason: &str) -> CameraError {
        error!(reason, "Capture session configuration failed");
        self.close();
        CameraError::Config(reason.to_string())
    }

    /// Device disconnected or errored: tear everything down
    pub fn on_device_lost(&mut self, error: AccessError) -> CameraError {
        error!(error = %error, "Camera lost");
        self.close();
        CameraError::Access(error)
    }

    /// Release session, camera and frame queue, in that order
    ///
    /// Idempotent. Failures are logged and swallowed so teardown always
    /// completes.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed
            && self.device.is_none()
            && self.session.is_none()
            && self.frame_queue.is_none()
        {
            return;
        }

        if let Some(mut session) = self.session.take()
            && let Err(e) = session.close()
        {
            warn!(error = %e, "Error while closing capture session");
        }
        if let Some(device) = self.device.take() {
            close_device(device);
        }
        if let Some(queue) = self.frame_queue.take() {
            queue.close();
        }

        self.state = SessionState::Closed;
        self.camera_id = None;
        self.characteristics = None;
        self.preview = None;
        info!("Camera and related resources released");
    }
}

impl Drop for CameraSessionManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn close_device(mut device: Box<dyn CameraDevice>) {
    if let Err(e) = device.close() {
        warn!(camera_id = device.id(), error = %e, "Error while closing camera");
    }
}
