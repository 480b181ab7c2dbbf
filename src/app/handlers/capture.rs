// SPDX-License-Identifier: GPL-3.0-only

//! Capture handlers
//!
//! Handles the capture command and routes completion and frame-ready
//! callbacks through the pairing rule.

use crate::app::state::{CameraContext, ScreenEvent};
use crate::backends::camera::{CallbackSink, CaptureResult, RequestId};
use crate::constants::CAMERA_PREPARING_MESSAGE;
use crate::errors::{AppError, CameraError, CaptureError, TimedOperation};
use crate::pipelines::photo::PairOutcome;
use tracing::{info, warn};

impl CameraContext {
    pub(crate) fn handle_capture(&mut self, callbacks: &CallbackSink) {
        match self
            .orchestrator
            .capture_still(self.manager.session_mut(), callbacks)
        {
            Ok(request_id) => {
                self.arm(TimedOperation::Capture);
                self.emit(ScreenEvent::CaptureStarted { request_id });
            }
            Err(AppError::Capture(CaptureError::SessionNotReady)) => {
                self.emit(ScreenEvent::Notification(
                    CAMERA_PREPARING_MESSAGE.to_string(),
                ));
            }
            Err(AppError::Camera(CameraError::Access(access))) => {
                self.emit(ScreenEvent::CaptureFailed {
                    reason: CaptureError::SubmitFailed(access.to_string()).to_string(),
                });
                self.lose_camera(access);
            }
            Err(e) => {
                self.emit(ScreenEvent::CaptureFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    pub(crate) fn handle_capture_completed(&mut self, result: CaptureResult) {
        let outcome = self.orchestrator.on_capture_completed(
            result,
            self.manager.frame_queue(),
            self.manager.characteristics(),
        );
        self.handle_pair_outcome(outcome);
    }

    pub(crate) fn handle_frame_available(&mut self) {
        let outcome = self
            .orchestrator
            .on_frame_available(self.manager.frame_queue(), self.manager.characteristics());
        self.handle_pair_outcome(outcome);
    }

    pub(crate) fn handle_capture_failed(&mut self, request_id: RequestId, reason: &str) {
        warn!(request_id, reason, "Camera reported capture failure");
        self.disarm(TimedOperation::Capture);
        self.emit(ScreenEvent::CaptureFailed {
            reason: reason.to_string(),
        });
    }

    fn handle_pair_outcome(&mut self, outcome: PairOutcome) {
        match outcome {
            PairOutcome::Saved(photo) => {
                self.disarm(TimedOperation::Capture);
                info!(file = %photo.file_name, "Photo saved");
                self.emit(ScreenEvent::PhotoSaved(photo));
            }
            PairOutcome::Dropped { width, height } => {
                if self.orchestrator.pending().is_empty() {
                    self.disarm(TimedOperation::Capture);
                }
                self.emit(ScreenEvent::FrameDropped { width, height });
            }
            PairOutcome::NoFrame => {
                if self.orchestrator.pending().is_empty() {
                    self.disarm(TimedOperation::Capture);
                }
            }
            PairOutcome::Failed(e) => {
                self.disarm(TimedOperation::Capture);
                self.emit(ScreenEvent::CaptureFailed {
                    reason: e.to_string(),
                });
            }
        }
    }
}
