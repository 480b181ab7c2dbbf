// SPDX-License-Identifier: GPL-3.0-only

//! Camera lifecycle handlers
//!
//! Handles the preview surface, permission answers, open/configure
//! callbacks, camera loss, teardown and operation timeouts.

use crate::app::state::{CameraContext, ScreenEvent};
use crate::backends::camera::{
    CallbackSink, CameraDevice, CaptureSession, PreviewSurface, SessionState, Size,
};
use crate::constants::{CAMERA_PERMISSION_MESSAGE, FALLBACK_SENSOR_SIZE};
use crate::errors::{AccessError, CameraError, TimedOperation};
use std::time::Instant;
use tracing::{debug, error, info, warn};

impl CameraContext {
    // =========================================================================
    // Surface and Permission Handlers
    // =========================================================================

    pub(crate) fn handle_surface_available(
        &mut self,
        surface: PreviewSurface,
        callbacks: &CallbackSink,
    ) {
        info!(size = %surface.size(), "Preview surface available");
        self.preview = Some(surface);
        self.open_camera(callbacks);
    }

    pub(crate) fn handle_surface_destroyed(&mut self) {
        info!("Preview surface destroyed, releasing camera");
        self.preview = None;
        self.close_camera();
    }

    pub(crate) fn handle_permission_result(&mut self, granted: bool, callbacks: &CallbackSink) {
        if !granted {
            warn!("Camera permission refused");
            self.emit(ScreenEvent::Notification(CAMERA_PERMISSION_MESSAGE.to_string()));
            return;
        }

        info!("Camera permission granted");
        if self.preview.is_some() {
            self.open_camera(callbacks);
        } else {
            debug!("Waiting for preview surface before opening camera");
        }
    }

    fn open_camera(&mut self, callbacks: &CallbackSink) {
        let Some(preview) = self.preview.clone() else {
            return;
        };
        if self.manager.state() != SessionState::Closed {
            debug!(state = ?self.manager.state(), "Camera already open or opening");
            return;
        }

        match self
            .manager
            .open(self.camera_id.as_deref(), preview, callbacks.clone())
        {
            Ok(camera_id) => {
                debug!(camera_id = %camera_id, "Waiting for camera to open");
                self.arm(TimedOperation::Open);
            }
            Err(CameraError::PermissionDenied) => self.emit(ScreenEvent::PermissionRequested),
            Err(e) => {
                error!(error = %e, "Failed to open camera");
                self.emit(ScreenEvent::OpenFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    // =========================================================================
    // Camera Callback Handlers
    // =========================================================================

    pub(crate) fn handle_camera_opened(
        &mut self,
        device: Box<dyn CameraDevice>,
        callbacks: &CallbackSink,
    ) {
        self.disarm(TimedOperation::Open);
        let camera_id = device.id().to_string();
        let expected = self.manager.state() == SessionState::Opening;

        match self.manager.on_opened(device, callbacks.clone()) {
            Ok(()) if expected => {
                let raw_size = self
                    .manager
                    .frame_queue()
                    .map(|queue| queue.size())
                    .unwrap_or_else(|| Size::from(FALLBACK_SENSOR_SIZE));
                self.emit(ScreenEvent::CameraOpened {
                    camera_id,
                    raw_size,
                });
                if self.manager.state() == SessionState::Configuring {
                    self.arm(TimedOperation::Configure);
                }
            }
            Ok(()) => {}
            Err(e) => {
                error!(camera_id = %camera_id, error = %e, "Failed to request capture session");
                self.emit(ScreenEvent::SessionFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    pub(crate) fn handle_session_configured(&mut self, session: Box<dyn CaptureSession>) {
        self.disarm(TimedOperation::Configure);
        if self.manager.on_session_configured(session) {
            self.set_ready(true);
            self.emit(ScreenEvent::SessionConfigured);
        }
    }

    /// The camera is released; a new `SurfaceAvailable` reopens it
    pub(crate) fn handle_session_configure_failed(&mut self, reason: &str) {
        self.deadlines.clear();
        self.orchestrator.reset();
        self.set_ready(false);
        let error = self.manager.on_session_configure_failed(reason);
        self.emit(ScreenEvent::SessionFailed {
            reason: error.to_string(),
        });
    }

    pub(crate) fn handle_camera_lost(&mut self, camera_id: &str, error: AccessError) {
        if self.manager.camera_id() != Some(camera_id) {
            debug!(camera_id, error = %error, "Ignoring loss of a camera that is not open");
            return;
        }
        self.lose_camera(error);
    }

    /// Tear down after the open camera became unusable
    pub(crate) fn lose_camera(&mut self, error: AccessError) {
        self.deadlines.clear();
        self.orchestrator.reset();
        self.set_ready(false);
        let error = self.manager.on_device_lost(error);
        self.emit(ScreenEvent::CameraLost {
            reason: error.to_string(),
        });
    }

    /// Release session, camera and queue
    pub(crate) fn close_camera(&mut self) {
        let was_open = self.manager.state() != SessionState::Closed;
        self.deadlines.clear();
        self.orchestrator.reset();
        self.set_ready(false);
        self.manager.close();
        if was_open {
            self.emit(ScreenEvent::CameraClosed);
        }
    }

    // =========================================================================
    // Timeouts
    // =========================================================================

    pub(crate) fn handle_expired_deadlines(&mut self, now: Instant) {
        let expired: Vec<TimedOperation> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(operation, _)| *operation)
            .collect();

        for operation in expired {
            if self.deadlines.remove(&operation).is_none() {
                continue;
            }
            let error = CameraError::Timeout(operation);
            warn!(error = %error, "Camera operation timed out");
            self.emit(ScreenEvent::Timeout(operation));
            match operation {
                TimedOperation::Open | TimedOperation::Configure => self.close_camera(),
                TimedOperation::Capture => self.orchestrator.reset(),
            }
        }
    }
}
