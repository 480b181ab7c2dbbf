// SPDX-License-Identifier: MPL-2.0

//! RAW photo pipeline
//!
//! ```text
//! Still request → CaptureResult ─┐
//!                                ├─ pair → DNG encode → storage
//! RAW queue     → RawFrame ──────┘
//! ```
//!
//! 1. **Capture**: submit the still request and pair its metadata with the
//!    next RAW frame ([`capture`])
//! 2. **Encoding**: serialize frame and metadata to DNG ([`encoding`])
//! 3. **Storage**: write through a scoped output stream ([`crate::storage`])

pub mod capture;
pub mod encoding;

pub use capture::{CaptureOrchestrator, PairOutcome, PendingCaptureResult};
pub use encoding::{DngCreator, DngEncoder, RawSamples};

use crate::backends::camera::{CameraCharacteristics, CaptureResult, RawFrame, Size};
use crate::constants::{DNG_EXTENSION, RAW_FILE_PREFIX};
use crate::errors::CaptureError;
use crate::storage::{OutputTarget, PhotoStorage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// A DNG that reached storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPhoto {
    pub file_name: String,
    pub target: OutputTarget,
    /// Filesystem path, when the destination has one
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
    pub sensor_timestamp_ns: u64,
}

/// Writes paired frames as DNG files
pub struct PhotoWriter {
    storage: PhotoStorage,
    encoder: Arc<dyn DngEncoder>,
}

impl PhotoWriter {
    pub fn new(storage: PhotoStorage, encoder: Arc<dyn DngEncoder>) -> Self {
        Self { storage, encoder }
    }

    /// `raw_image_{width}x{height}_{epoch_millis}.dng`
    pub fn file_name(size: Size, epoch_millis: i64) -> String {
        format!(
            "{}_{}x{}_{}.{}",
            RAW_FILE_PREFIX, size.width, size.height, epoch_millis, DNG_EXTENSION
        )
    }

    /// Encode `frame` with `result` and store it
    ///
    /// The output is committed only after the encoder succeeded; on any
    /// failure it is aborted and nothing is left behind.
    pub fn write(
        &self,
        frame: &RawFrame,
        result: &CaptureResult,
        characteristics: &CameraCharacteristics,
    ) -> Result<SavedPhoto, CaptureError> {
        let size = frame.size();
        let timestamp = frame.sensor_timestamp_ns();
        let requested = Self::file_name(size, chrono::Utc::now().timestamp_millis());
        let mut stream = self.storage.open(&requested).map_err(|e| {
            error!(%size, timestamp, error = %e, "Failed to open output");
            CaptureError::from(e)
        })?;

        if let Err(e) =
            self.encoder
                .write_dng(RawSamples::from(frame), result, characteristics, &mut stream)
        {
            error!(%size, timestamp, error = %e, "Failed to write DNG");
            stream.abort();
            return Err(e);
        }

        let stored = stream.commit().map_err(|e| {
            error!(%size, timestamp, error = %e, "Failed to commit DNG");
            CaptureError::from(e)
        })?;

        // Storage may have suffixed the name to avoid a clash
        let file_name = stored
            .path
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or(requested);

        info!(
            file = %file_name,
            target = %stored.target,
            bytes = stored.bytes,
            "DNG saved"
        );
        Ok(SavedPhoto {
            file_name,
            target: stored.target,
            path: stored.path,
            width: size.width,
            height: size.height,
            bytes: stored.bytes,
            sensor_timestamp_ns: timestamp,
        })
    }
}
