// SPDX-License-Identifier: MPL-2.0

//! Error types for the RAW capture application

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Camera-related errors
    Camera(CameraError),
    /// Capture and DNG writing errors
    Capture(CaptureError),
    /// Configuration errors
    Config(String),
    /// Background worker errors
    Worker(String),
}

/// Why the camera hardware is not reachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The camera was disconnected or taken over by another client
    Disconnected,
    /// The device reported an error code
    Device(i32),
    /// The camera service refused access
    Unavailable(String),
}

/// Camera lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// Camera access permission has not been granted
    PermissionDenied,
    /// The backend reports no cameras
    NoCameraFound,
    /// Camera hardware unavailable or lost
    Access(AccessError),
    /// Session could not bind the requested outputs
    Config(String),
    /// A camera is already open or opening
    AlreadyOpen,
    /// Operation needs an open camera
    NotOpen,
    /// An asynchronous camera operation did not call back in time
    Timeout(TimedOperation),
}

/// Asynchronous camera operations that can be bounded by a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimedOperation {
    /// Waiting for the camera-open callback
    Open,
    /// Waiting for the session-configured callback
    Configure,
    /// Waiting for a still capture to complete
    Capture,
}

/// Still capture and persistence errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Capture attempted before a session exists
    SessionNotReady,
    /// The capture request could not be submitted
    SubmitFailed(String),
    /// The DNG encoder failed
    Encode(String),
    /// Writing to storage failed
    Io(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Worker(msg) => write!(f, "Worker error: {}", msg),
        }
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::Disconnected => write!(f, "camera disconnected"),
            AccessError::Device(code) => write!(f, "device error code {}", code),
            AccessError::Unavailable(msg) => write!(f, "camera unavailable: {}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::PermissionDenied => write!(f, "Camera permission not granted"),
            CameraError::NoCameraFound => write!(f, "No camera devices found"),
            CameraError::Access(e) => write!(f, "Camera access failed: {}", e),
            CameraError::Config(msg) => write!(f, "Session configuration failed: {}", msg),
            CameraError::AlreadyOpen => write!(f, "A camera is already open"),
            CameraError::NotOpen => write!(f, "No camera is open"),
            CameraError::Timeout(op) => write!(f, "Timed out waiting for {}", op),
        }
    }
}

impl fmt::Display for TimedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimedOperation::Open => write!(f, "camera open"),
            TimedOperation::Configure => write!(f, "session configuration"),
            TimedOperation::Capture => write!(f, "capture completion"),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::SessionNotReady => write!(f, "Capture session is not ready"),
            CaptureError::SubmitFailed(msg) => write!(f, "Failed to submit capture: {}", msg),
            CaptureError::Encode(msg) => write!(f, "DNG encoding failed: {}", msg),
            CaptureError::Io(msg) => write!(f, "Save failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for AccessError {}
impl std::error::Error for CameraError {}
impl std::error::Error for CaptureError {}

impl CameraError {
    /// True when the camera is gone and has to be reopened by the UI layer
    pub fn is_camera_lost(&self) -> bool {
        matches!(
            self,
            CameraError::Access(AccessError::Disconnected | AccessError::Device(_))
        )
    }
}

// Conversions from sub-errors to AppError
impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<AccessError> for CameraError {
    fn from(err: AccessError) -> Self {
        CameraError::Access(err)
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}
