// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! The platform camera service is reached through three traits that mirror
//! its object model: a [`CameraBackend`] opens devices, a [`CameraDevice`]
//! builds capture sessions, and a [`CaptureSession`] accepts requests.
//! Every asynchronous answer (device opened, session configured, capture
//! completed, frame ready) is posted as a [`CameraCallback`] through a
//! [`CallbackSink`] onto the single camera worker thread.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  RawCaptureScreen   │  ← start / stop / capture
//! └──────────┬──────────┘
//!            │ commands
//!            ▼
//! ┌─────────────────────┐      callbacks      ┌──────────────────┐
//! │    CameraWorker     │ ◀────────────────── │  CameraBackend   │
//! │ (serial event loop) │ ──────────────────▶ │ (virtual sensor) │
//! └─────────────────────┘    open / capture   └──────────────────┘
//! ```

pub mod frame_queue;
pub mod manager;
pub mod types;
pub mod virtual_sensor;
pub mod worker;

pub use frame_queue::{FrameProducer, FrameQueue, QueueStats, RawFrame};
pub use manager::{CameraSessionManager, SessionState};
pub use types::*;
pub use virtual_sensor::{DeliveryOrder, VirtualSensorBackend, VirtualSensorConfig};
pub use worker::{CameraWorker, WorkerHandler, WorkerMessage};

use std::sync::Arc;
use tracing::debug;

/// Platform camera service
///
/// Shared between the UI thread (enumeration) and the camera worker
/// (open), so implementations must be thread-safe.
pub trait CameraBackend: Send + Sync {
    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    /// Identifiers of all cameras, primary camera first
    fn camera_ids(&self) -> BackendResult<Vec<String>>;

    /// Static properties of a camera
    fn characteristics(&self, camera_id: &str) -> BackendResult<CameraCharacteristics>;

    /// Whether camera access has been granted
    fn has_camera_permission(&self) -> bool;

    /// Ask the user for camera access; the answer arrives out of band
    fn request_camera_permission(&self);

    /// Start opening a camera
    ///
    /// Returns once the request is accepted. The outcome is posted later as
    /// [`CameraCallback::Opened`], [`CameraCallback::Disconnected`] or
    /// [`CameraCallback::Error`].
    fn open_camera(&self, camera_id: &str, callbacks: CallbackSink) -> BackendResult<()>;
}

/// An open camera
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    /// Start configuring a session bound to `outputs`
    ///
    /// The outcome is posted as [`CameraCallback::SessionConfigured`] or
    /// [`CameraCallback::SessionConfigureFailed`].
    fn create_capture_session(
        &mut self,
        outputs: SessionOutputs,
        callbacks: CallbackSink,
    ) -> BackendResult<()>;

    fn close(&mut self) -> BackendResult<()>;
}

/// A configured capture session
pub trait CaptureSession: Send {
    /// Submit a one-shot request
    ///
    /// Completion is posted as [`CameraCallback::CaptureCompleted`] or
    /// [`CameraCallback::CaptureFailed`].
    fn capture(
        &mut self,
        request: CaptureRequest,
        callbacks: CallbackSink,
    ) -> BackendResult<RequestId>;

    /// Start a repeating request (preview stream)
    fn set_repeating_request(&mut self, request: CaptureRequest) -> BackendResult<()>;

    fn close(&mut self) -> BackendResult<()>;
}

/// Outputs a session is bound to
#[derive(Debug, Clone)]
pub struct SessionOutputs {
    pub preview: PreviewSurface,
    pub raw: FrameProducer,
}

/// Asynchronous notifications from the camera service
pub enum CameraCallback {
    /// The camera finished opening
    Opened(Box<dyn CameraDevice>),
    /// The camera was disconnected
    Disconnected { camera_id: String },
    /// The camera reported a fatal error
    Error { camera_id: String, code: i32 },
    /// The session is ready for requests
    SessionConfigured(Box<dyn CaptureSession>),
    /// The session could not bind its outputs
    SessionConfigureFailed { reason: String },
    /// A request completed with metadata
    CaptureCompleted(CaptureResult),
    /// A request failed inside the camera
    CaptureFailed { request_id: RequestId, reason: String },
    /// A new frame is waiting in the RAW queue
    FrameAvailable,
}

impl std::fmt::Debug for CameraCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraCallback::Opened(device) => write!(f, "Opened({})", device.id()),
            CameraCallback::Disconnected { camera_id } => write!(f, "Disconnected({})", camera_id),
            CameraCallback::Error { camera_id, code } => {
                write!(f, "Error({}, code {})", camera_id, code)
            }
            CameraCallback::SessionConfigured(_) => write!(f, "SessionConfigured"),
            CameraCallback::SessionConfigureFailed { reason } => {
                write!(f, "SessionConfigureFailed({})", reason)
            }
            CameraCallback::CaptureCompleted(result) => {
                write!(f, "CaptureCompleted(request {})", result.request_id)
            }
            CameraCallback::CaptureFailed { request_id, reason } => {
                write!(f, "CaptureFailed(request {}: {})", request_id, reason)
            }
            CameraCallback::FrameAvailable => write!(f, "FrameAvailable"),
        }
    }
}

/// Where backends post their callbacks
///
/// Cheap to clone. Posting after the receiver is gone drops the callback,
/// which in turn drops (and closes) any device or session it carries.
#[derive(Clone)]
pub struct CallbackSink {
    post: Arc<dyn Fn(CameraCallback) -> bool + Send + Sync>,
}

impl CallbackSink {
    pub fn new<F>(post: F) -> Self
    where
        F: Fn(CameraCallback) -> bool + Send + Sync + 'static,
    {
        Self {
            post: Arc::new(post),
        }
    }

    /// Sink feeding a plain callback channel
    pub fn from_sender(sender: tokio::sync::mpsc::UnboundedSender<CameraCallback>) -> Self {
        Self::new(move |callback| sender.send(callback).is_ok())
    }

    /// Post a callback; returns false when nobody is listening any more
    pub fn post(&self, callback: CameraCallback) -> bool {
        let delivered = (self.post)(callback);
        if !delivered {
            debug!("Camera callback discarded, worker is gone");
        }
        delivered
    }
}

impl std::fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}
