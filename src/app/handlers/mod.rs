// SPDX-License-Identifier: GPL-3.0-only

//! Worker-side handlers
//!
//! Commands and camera callbacks are dispatched here, on the camera worker
//! thread, to the handlers grouped by domain.

pub mod camera;
pub mod capture;

use crate::app::state::{CameraContext, Command};
use crate::backends::camera::{CallbackSink, CameraCallback, WorkerHandler};
use crate::errors::AccessError;
use std::time::Instant;

impl WorkerHandler for CameraContext {
    type Command = Command;

    fn on_command(&mut self, command: Command, callbacks: &CallbackSink) {
        match command {
            Command::SurfaceAvailable(surface) => self.handle_surface_available(surface, callbacks),
            Command::SurfaceDestroyed => self.handle_surface_destroyed(),
            Command::PermissionResult(granted) => self.handle_permission_result(granted, callbacks),
            Command::Capture => self.handle_capture(callbacks),
        }
    }

    fn on_callback(&mut self, callback: CameraCallback, callbacks: &CallbackSink) {
        match callback {
            CameraCallback::Opened(device) => self.handle_camera_opened(device, callbacks),
            CameraCallback::Disconnected { camera_id } => {
                self.handle_camera_lost(&camera_id, AccessError::Disconnected)
            }
            CameraCallback::Error { camera_id, code } => {
                self.handle_camera_lost(&camera_id, AccessError::Device(code))
            }
            CameraCallback::SessionConfigured(session) => self.handle_session_configured(session),
            CameraCallback::SessionConfigureFailed { reason } => {
                self.handle_session_configure_failed(&reason)
            }
            CameraCallback::CaptureCompleted(result) => self.handle_capture_completed(result),
            CameraCallback::CaptureFailed { request_id, reason } => {
                self.handle_capture_failed(request_id, &reason)
            }
            CameraCallback::FrameAvailable => self.handle_frame_available(),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    fn on_deadline(&mut self, _callbacks: &CallbackSink) {
        self.handle_expired_deadlines(Instant::now());
    }

    fn on_shutdown(&mut self) {
        self.close_camera();
    }
}
