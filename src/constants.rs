// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Number of RAW buffers the frame queue may hand out at once
///
/// Frames that are neither queued nor released count against this limit.
/// Deliveries beyond it are skipped until the consumer releases a buffer.
pub const FRAME_QUEUE_CAPACITY: usize = 5;

/// Sensor size used for the RAW queue when the camera does not report
/// its pixel array size
pub const FALLBACK_SENSOR_SIZE: (u32, u32) = (4000, 3000);

/// Default buffer size of the preview surface
pub const PREVIEW_BUFFER_SIZE: (u32, u32) = (1920, 1080);

/// MIME type registered for DNG files in the media catalog
pub const DNG_MIME_TYPE: &str = "image/x-adobe-dng";

/// File extension for saved captures
pub const DNG_EXTENSION: &str = "dng";

/// Prefix of every saved capture file name
pub const RAW_FILE_PREFIX: &str = "raw_image";

/// Album (sub-directory) captures are stored under
pub const DEFAULT_ALBUM: &str = "RawCapture";

/// Top-level pictures collection used for catalog relative paths
pub const PICTURES_COLLECTION: &str = "Pictures";

/// Message shown when capture is requested before the session is configured
pub const CAMERA_PREPARING_MESSAGE: &str = "Camera is still preparing. Try again in a moment.";

/// Message shown when camera permission is refused
pub const CAMERA_PERMISSION_MESSAGE: &str = "Camera permission is required to take photos.";

/// Name of the background thread that receives all camera callbacks
pub const CAMERA_WORKER_THREAD: &str = "CameraBackground";

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame interval of the virtual sensor's repeating preview stream (~30fps)
    pub const PREVIEW_FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Exposure time reported by the virtual sensor (1/60s in nanoseconds)
    pub const VIRTUAL_EXPOSURE_NS: u64 = 16_666_667;

    /// How long the CLI waits for the session to become ready
    pub const CLI_SESSION_WAIT: Duration = Duration::from_secs(5);

    /// How long the CLI waits for a capture to be written
    pub const CLI_CAPTURE_WAIT: Duration = Duration::from_secs(10);
}

/// Sensor constants reported by the virtual sensor
pub mod sensor {
    /// ISO sensitivity reported for every virtual capture
    pub const VIRTUAL_ISO: u32 = 100;

    /// Black level of the simulated 10-bit sensor
    pub const VIRTUAL_BLACK_LEVEL: u16 = 64;

    /// White level of the simulated 10-bit sensor
    pub const VIRTUAL_WHITE_LEVEL: u16 = 1023;

    /// D65 calibration illuminant (EXIF LightSource value)
    pub const ILLUMINANT_D65: u16 = 21;
}
