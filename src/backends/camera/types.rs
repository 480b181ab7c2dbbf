// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use crate::errors::{AccessError, CameraError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pixel dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by this size
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sensor rotation in degrees (clockwise)
///
/// Camera sensors may be physically mounted at various angles relative to the device.
/// This is common on mobile devices where sensors are rotated 90° or 270° relative
/// to the display orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorRotation {
    /// No rotation (sensor is oriented correctly)
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl SensorRotation {
    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            SensorRotation::None => 0,
            SensorRotation::Rotate90 => 90,
            SensorRotation::Rotate180 => 180,
            SensorRotation::Rotate270 => 270,
        }
    }

    /// TIFF/EXIF `Orientation` value that displays the image upright
    pub fn tiff_orientation(&self) -> u16 {
        match self {
            SensorRotation::None => 1,
            SensorRotation::Rotate90 => 6,
            SensorRotation::Rotate180 => 3,
            SensorRotation::Rotate270 => 8,
        }
    }
}

impl std::fmt::Display for SensorRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Colour filter array arrangement of the sensor's top-left 2x2 block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CfaPattern {
    /// Row 0: R G, Row 1: G B
    #[default]
    Rggb,
    /// Row 0: B G, Row 1: G R
    Bggr,
    /// Row 0: G R, Row 1: B G
    Grbg,
    /// Row 0: G B, Row 1: R G
    Gbrg,
}

impl CfaPattern {
    /// CFA colour indices (0 = red, 1 = green, 2 = blue) in row-major order
    pub fn colors(&self) -> [u8; 4] {
        match self {
            CfaPattern::Rggb => [0, 1, 1, 2],
            CfaPattern::Bggr => [2, 1, 1, 0],
            CfaPattern::Grbg => [1, 0, 2, 1],
            CfaPattern::Gbrg => [1, 2, 0, 1],
        }
    }
}

/// Static camera properties, queried once per camera open
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCharacteristics {
    /// Backend identifier of the camera
    pub camera_id: String,
    /// Manufacturer name
    pub make: String,
    /// Model name
    pub model: String,
    /// Full pixel array of the sensor, if the camera reports it
    pub pixel_array_size: Option<Size>,
    /// Bayer arrangement of the RAW output
    pub cfa_pattern: CfaPattern,
    /// Sensor black level in RAW units
    pub black_level: u16,
    /// Sensor saturation level in RAW units
    pub white_level: u16,
    /// XYZ (D65) to camera colour matrix, row-major
    pub color_matrix: [[f32; 3]; 3],
    /// Mounting rotation of the sensor
    pub orientation: SensorRotation,
}

impl CameraCharacteristics {
    /// Name written to the DNG `UniqueCameraModel` tag
    pub fn unique_model(&self) -> String {
        format!("{} {}", self.make, self.model)
    }
}

/// Auto-exposure mode of a capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AeMode {
    Off,
    #[default]
    On,
}

/// Capture request template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    /// Repeating preview stream
    Preview,
    /// Single full-quality still
    StillCapture,
}

/// Output a capture request writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamTarget {
    /// The preview surface
    Preview,
    /// The RAW frame queue
    RawQueue,
}

/// Identifier assigned by the session to each submitted request
pub type RequestId = u64;

/// Capture request sent to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<StreamTarget>,
    pub ae_mode: AeMode,
    pub ae_lock: bool,
}

impl CaptureRequest {
    /// Single RAW still: RAW queue only, auto-exposure on and unlocked
    pub fn still_raw() -> Self {
        Self {
            template: RequestTemplate::StillCapture,
            targets: vec![StreamTarget::RawQueue],
            ae_mode: AeMode::On,
            ae_lock: false,
        }
    }

    /// Repeating preview request targeting the preview surface only
    pub fn preview() -> Self {
        Self {
            template: RequestTemplate::Preview,
            targets: vec![StreamTarget::Preview],
            ae_mode: AeMode::On,
            ae_lock: false,
        }
    }

    pub fn targets_raw(&self) -> bool {
        self.targets.contains(&StreamTarget::RawQueue)
    }
}

/// Per-shot metadata delivered when a capture request completes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureResult {
    /// Request this result belongs to
    pub request_id: RequestId,
    /// Start of exposure (nanoseconds, sensor clock)
    pub sensor_timestamp_ns: u64,
    /// Exposure time applied (nanoseconds)
    pub exposure_time_ns: Option<u64>,
    /// ISO sensitivity applied
    pub sensitivity_iso: Option<u32>,
    /// Auto-exposure mode the request ran with
    pub ae_mode: AeMode,
    /// Whether auto-exposure was locked
    pub ae_lock: bool,
    /// White balance neutral in camera RGB
    pub as_shot_neutral: Option<[f32; 3]>,
    /// Lens focus distance (diopters)
    pub focus_distance: Option<f32>,
}

/// One RAW16 sensor image as produced by the camera
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// Row-major CFA samples, one `u16` per photosite
    pub data: Vec<u16>,
    /// Start of exposure (nanoseconds, sensor clock)
    pub sensor_timestamp_ns: u64,
}

impl RawImage {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Preview destination of the capture session
///
/// Only tracks what was presented; compositing belongs to the UI toolkit.
#[derive(Debug, Clone)]
pub struct PreviewSurface {
    size: Size,
    presented: Arc<AtomicU64>,
}

impl PreviewSurface {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            presented: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Called by the camera for every preview frame it renders
    pub fn present_frame(&self) {
        self.presented.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of preview frames rendered so far
    pub fn frames_presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Camera permission missing
    PermissionDenied,
    /// Camera device not found
    DeviceNotFound(String),
    /// Camera disconnected
    Disconnected,
    /// Operation called in the wrong state (e.g. on a closed session)
    InvalidState(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::PermissionDenied => write!(f, "Camera permission denied"),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::Disconnected => write!(f, "Camera disconnected"),
            BackendError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for CameraError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied => CameraError::PermissionDenied,
            BackendError::DeviceNotFound(_) => CameraError::NoCameraFound,
            BackendError::Disconnected => CameraError::Access(AccessError::Disconnected),
            BackendError::InvalidState(msg) | BackendError::Other(msg) => {
                CameraError::Access(AccessError::Unavailable(msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_still_request_targets_raw_only() {
        let request = CaptureRequest::still_raw();
        assert_eq!(request.template, RequestTemplate::StillCapture);
        assert_eq!(request.targets, vec![StreamTarget::RawQueue]);
        assert_eq!(request.ae_mode, AeMode::On);
        assert!(!request.ae_lock);
        assert!(!CaptureRequest::preview().targets_raw());
    }

    #[test]
    fn test_orientation_codes() {
        assert_eq!(SensorRotation::None.tiff_orientation(), 1);
        assert_eq!(SensorRotation::Rotate90.tiff_orientation(), 6);
        assert_eq!(SensorRotation::Rotate180.tiff_orientation(), 3);
        assert_eq!(SensorRotation::Rotate270.tiff_orientation(), 8);
        assert_eq!(SensorRotation::Rotate270.to_string(), "270°");
    }

    #[test]
    fn test_cfa_colors() {
        assert_eq!(CfaPattern::Rggb.colors(), [0, 1, 1, 2]);
        assert_eq!(CfaPattern::Gbrg.colors(), [1, 2, 0, 1]);
    }

    #[test]
    fn test_backend_error_mapping() {
        assert_eq!(
            CameraError::from(BackendError::Disconnected),
            CameraError::Access(AccessError::Disconnected)
        );
        assert_eq!(
            CameraError::from(BackendError::PermissionDenied),
            CameraError::PermissionDenied
        );
        assert_eq!(
            CameraError::from(BackendError::DeviceNotFound("3".into())),
            CameraError::NoCameraFound
        );
        assert!(matches!(
            CameraError::from(BackendError::InvalidState("closed".into())),
            CameraError::Access(AccessError::Unavailable(_))
        ));
    }

    #[test]
    fn test_preview_surface_counts_frames() {
        let surface = PreviewSurface::new(Size::new(1920, 1080));
        let clone = surface.clone();
        clone.present_frame();
        clone.present_frame();
        assert_eq!(surface.frames_presented(), 2);
    }
}
