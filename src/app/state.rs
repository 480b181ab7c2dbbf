// SPDX-License-Identifier: GPL-3.0-only

//! Screen state types
//!
//! [`CameraContext`] is the state owned by the camera worker; [`Command`]
//! is what the screen sends it and [`ScreenEvent`] what it reports back.

use crate::backends::camera::{CameraSessionManager, PreviewSurface, RequestId, Size};
use crate::config::Timeouts;
use crate::errors::TimedOperation;
use crate::pipelines::photo::{CaptureOrchestrator, SavedPhoto};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Notifications for the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    /// Camera permission is missing and was requested
    PermissionRequested,
    /// Opening the camera failed before any callback
    OpenFailed { reason: String },
    /// The camera opened and its RAW queue is configured
    CameraOpened { camera_id: String, raw_size: Size },
    /// The capture session is ready for captures
    SessionConfigured,
    /// The capture session could not be configured
    SessionFailed { reason: String },
    /// Camera and session were released
    CameraClosed,
    /// The camera disconnected or failed
    CameraLost { reason: String },
    /// Short-lived message for the user
    Notification(String),
    /// A still request was submitted
    CaptureStarted { request_id: RequestId },
    /// A DNG reached storage
    PhotoSaved(SavedPhoto),
    /// A RAW frame arrived without capture metadata and was discarded
    FrameDropped { width: u32, height: u32 },
    /// A still capture did not produce a file
    CaptureFailed { reason: String },
    /// A camera operation did not call back in time
    Timeout(TimedOperation),
}

/// Requests from the screen to the camera worker
#[derive(Debug)]
pub enum Command {
    /// The preview surface exists; open the camera
    SurfaceAvailable(PreviewSurface),
    /// The preview surface is gone; release the camera
    SurfaceDestroyed,
    /// Answer to the permission request
    PermissionResult(bool),
    /// Take one RAW still
    Capture,
}

/// State owned by the camera worker thread
pub struct CameraContext {
    pub(crate) manager: CameraSessionManager,
    pub(crate) orchestrator: CaptureOrchestrator,
    pub(crate) camera_id: Option<String>,
    pub(crate) preview: Option<PreviewSurface>,
    pub(crate) timeouts: Timeouts,
    pub(crate) deadlines: HashMap<TimedOperation, Instant>,
    pub(crate) ready: Arc<AtomicBool>,
    events: UnboundedSender<ScreenEvent>,
}

impl CameraContext {
    pub fn new(
        manager: CameraSessionManager,
        orchestrator: CaptureOrchestrator,
        camera_id: Option<String>,
        timeouts: Timeouts,
        ready: Arc<AtomicBool>,
        events: UnboundedSender<ScreenEvent>,
    ) -> Self {
        Self {
            manager,
            orchestrator,
            camera_id,
            preview: None,
            timeouts,
            deadlines: HashMap::new(),
            ready,
            events,
        }
    }

    pub(crate) fn emit(&self, event: ScreenEvent) {
        if self.events.send(event).is_err() {
            debug!("Screen event dropped, receiver is gone");
        }
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Start timing `operation` if a timeout is configured for it
    pub(crate) fn arm(&mut self, operation: TimedOperation) {
        if let Some(timeout) = self.timeouts.get(operation) {
            self.deadlines.insert(operation, Instant::now() + timeout);
        }
    }

    pub(crate) fn disarm(&mut self, operation: TimedOperation) {
        self.deadlines.remove(&operation);
    }
}
