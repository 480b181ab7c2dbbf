// SPDX-License-Identifier: MPL-2.0

//! Still capture and frame/metadata pairing
//!
//! A still request produces two independent answers: the completion
//! metadata ([`CaptureResult`]) and a RAW frame in the queue. They can
//! arrive in either order, so both paths apply the same rule: a frame is
//! only persisted when a completed result with the same sensor timestamp is
//! pending, and pairing takes that result out of the slot.

use super::{PhotoWriter, SavedPhoto};
use crate::backends::camera::{
    CallbackSink, CameraCharacteristics, CaptureRequest, CaptureResult, CaptureSession,
    FrameQueue, RawFrame, RequestId,
};
use crate::errors::{AppError, AppResult, CameraError, CaptureError};
use tracing::{debug, error, info, warn};

/// Single-slot holder for the latest completed capture result
///
/// Last write wins.
#[derive(Debug, Default)]
pub struct PendingCaptureResult {
    slot: Option<CaptureResult>,
}

impl PendingCaptureResult {
    /// Store `result`, returning the one it replaces
    pub fn store(&mut self, result: CaptureResult) -> Option<CaptureResult> {
        self.slot.replace(result)
    }

    pub fn take(&mut self) -> Option<CaptureResult> {
        self.slot.take()
    }

    pub fn peek(&self) -> Option<&CaptureResult> {
        self.slot.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

/// What happened to a frame-ready or completion event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// Frame and metadata were written
    Saved(SavedPhoto),
    /// A frame arrived with no pending result and was released
    Dropped { width: u32, height: u32 },
    /// No frame was waiting in the queue
    NoFrame,
    /// Pairing happened but writing failed
    Failed(CaptureError),
}

/// Submits still requests and pairs their results with RAW frames
pub struct CaptureOrchestrator {
    pending: PendingCaptureResult,
    writer: PhotoWriter,
}

impl CaptureOrchestrator {
    pub fn new(writer: PhotoWriter) -> Self {
        Self {
            pending: PendingCaptureResult::default(),
            writer,
        }
    }

    pub fn pending(&self) -> &PendingCaptureResult {
        &self.pending
    }

    /// Submit one RAW still request
    ///
    /// Fails fast with [`CaptureError::SessionNotReady`] when there is no
    /// session; the frame queue and the encoder are not touched. A submit
    /// failure caused by a lost camera is reported as that camera error,
    /// any other as [`CaptureError::SubmitFailed`].
    pub fn capture_still(
        &mut self,
        session: Option<&mut (dyn CaptureSession + 'static)>,
        callbacks: &CallbackSink,
    ) -> AppResult<RequestId> {
        let Some(session) = session else {
            warn!("Capture requested before the session is ready");
            return Err(CaptureError::SessionNotReady.into());
        };

        let request = CaptureRequest::still_raw();
        match session.capture(request, callbacks.clone()) {
            Ok(request_id) => {
                info!(request_id, "Still capture submitted");
                Ok(request_id)
            }
            Err(e) => {
                error!(error = %e, "Failed to submit still capture");
                let camera_error = CameraError::from(e.clone());
                if camera_error.is_camera_lost() {
                    Err(AppError::Camera(camera_error))
                } else {
                    Err(CaptureError::SubmitFailed(e.to_string()).into())
                }
            }
        }
    }

    /// Completion path: remember the result, then try the newest frame
    pub fn on_capture_completed(
        &mut self,
        result: CaptureResult,
        queue: Option<&FrameQueue>,
        characteristics: Option<&CameraCharacteristics>,
    ) -> PairOutcome {
        debug!(
            request_id = result.request_id,
            timestamp = result.sensor_timestamp_ns,
            "Capture completed"
        );
        if let Some(replaced) = self.pending.store(result) {
            debug!(request_id = replaced.request_id, "Unpaired capture result replaced");
        }

        match queue.and_then(FrameQueue::acquire_latest) {
            Some(frame) => self.pair(frame, characteristics),
            None => {
                debug!("No frame yet, waiting for frame-ready");
                PairOutcome::NoFrame
            }
        }
    }

    /// Frame-ready path
    pub fn on_frame_available(
        &mut self,
        queue: Option<&FrameQueue>,
        characteristics: Option<&CameraCharacteristics>,
    ) -> PairOutcome {
        let Some(frame) = queue.and_then(FrameQueue::acquire_latest) else {
            return PairOutcome::NoFrame;
        };

        if self.pending.is_empty() {
            let (width, height) = (frame.width(), frame.height());
            warn!(
                width,
                height,
                timestamp = frame.sensor_timestamp_ns(),
                "Frame arrived without capture result, dropping"
            );
            frame.release();
            return PairOutcome::Dropped { width, height };
        }

        self.pair(frame, characteristics)
    }

    /// Forget any pending result (camera closed)
    pub fn reset(&mut self) {
        if self.pending.take().is_some() {
            debug!("Discarded pending capture result");
        }
    }

    fn pair(
        &mut self,
        frame: RawFrame,
        characteristics: Option<&CameraCharacteristics>,
    ) -> PairOutcome {
        let Some(result) = self.pending.take() else {
            frame.release();
            return PairOutcome::NoFrame;
        };
        if result.sensor_timestamp_ns != frame.sensor_timestamp_ns() {
            let (width, height) = (frame.width(), frame.height());
            if frame.sensor_timestamp_ns() < result.sensor_timestamp_ns {
                debug!(
                    request_id = result.request_id,
                    frame_timestamp = frame.sensor_timestamp_ns(),
                    "Frame predates pending result, dropping frame"
                );
                self.pending.store(result);
            } else {
                // Frames arrive in sensor order; this result's frame is gone
                warn!(
                    request_id = result.request_id,
                    result_timestamp = result.sensor_timestamp_ns,
                    frame_timestamp = frame.sensor_timestamp_ns(),
                    "Pending result has no frame, discarding both"
                );
            }
            frame.release();
            return PairOutcome::Dropped { width, height };
        }
        let Some(characteristics) = characteristics else {
            error!("Camera characteristics unavailable, cannot write DNG");
            return PairOutcome::Failed(CaptureError::Encode(
                "camera characteristics unavailable".into(),
            ));
        };

        debug!(
            request_id = result.request_id,
            width = frame.width(),
            height = frame.height(),
            "Pairing frame with capture result"
        );
        let outcome = match self.writer.write(&frame, &result, characteristics) {
            Ok(saved) => PairOutcome::Saved(saved),
            Err(e) => PairOutcome::Failed(e),
        };
        frame.release();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{RawImage, Size};
    use crate::pipelines::photo::{DngEncoder, RawSamples};
    use crate::storage::PhotoStorage;
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Encoder that records calls and writes a fixed payload
    #[derive(Default)]
    struct RecordingEncoder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl DngEncoder for RecordingEncoder {
        fn write_dng(
            &self,
            samples: RawSamples<'_>,
            _result: &CaptureResult,
            _characteristics: &CameraCharacteristics,
            out: &mut dyn Write,
        ) -> Result<u64, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                out.write_all(b"partial")?;
                return Err(CaptureError::Encode("forced".into()));
            }
            let payload = format!("{}x{}", samples.width, samples.height);
            out.write_all(payload.as_bytes())?;
            Ok(payload.len() as u64)
        }
    }

    struct Fixture {
        _tmp: TempDir,
        dir: std::path::PathBuf,
        encoder: Arc<RecordingEncoder>,
        orchestrator: CaptureOrchestrator,
        queue: FrameQueue,
    }

    fn fixture(fail: bool) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("out");
        let encoder = Arc::new(RecordingEncoder {
            fail,
            ..Default::default()
        });
        let writer = PhotoWriter::new(PhotoStorage::direct(dir.clone()), encoder.clone());
        Fixture {
            _tmp: tmp,
            dir,
            encoder,
            orchestrator: CaptureOrchestrator::new(writer),
            queue: FrameQueue::new(Size::new(4, 2), 5, CallbackSink::new(|_| true)),
        }
    }

    fn characteristics() -> CameraCharacteristics {
        CameraCharacteristics {
            camera_id: "0".into(),
            make: "Test".into(),
            model: "Sensor".into(),
            pixel_array_size: Some(Size::new(4, 2)),
            cfa_pattern: Default::default(),
            black_level: 0,
            white_level: 1023,
            color_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            orientation: Default::default(),
        }
    }

    fn deliver(queue: &FrameQueue, timestamp: u64) {
        assert!(queue.producer().deliver(RawImage {
            width: 4,
            height: 2,
            data: vec![0; 8],
            sensor_timestamp_ns: timestamp,
        }));
    }

    fn result(request_id: RequestId, timestamp: u64) -> CaptureResult {
        CaptureResult {
            request_id,
            sensor_timestamp_ns: timestamp,
            ..Default::default()
        }
    }

    fn files(dir: &std::path::Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_capture_without_session_fails_fast() {
        let mut f = fixture(false);
        let sink = CallbackSink::new(|_| true);
        assert_eq!(
            f.orchestrator.capture_still(None, &sink),
            Err(AppError::Capture(CaptureError::SessionNotReady))
        );
        assert_eq!(f.queue.stats().acquired, 0);
        assert_eq!(f.encoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_completion_pairs_with_waiting_frame() {
        let mut f = fixture(false);
        let chars = characteristics();
        deliver(&f.queue, 10);

        let outcome = f
            .orchestrator
            .on_capture_completed(result(1, 10), Some(&f.queue), Some(&chars));
        let PairOutcome::Saved(saved) = outcome else {
            panic!("expected a saved photo, got {:?}", outcome);
        };
        assert_eq!(saved.width, 4);
        assert!(saved.file_name.starts_with("raw_image_4x2_"));
        assert!(f.orchestrator.pending().is_empty());
        assert_eq!(f.queue.stats().outstanding, 0);
        assert_eq!(files(&f.dir).len(), 1);
    }

    #[test]
    fn test_frame_path_uses_most_recent_result() {
        let mut f = fixture(false);
        let chars = characteristics();

        assert_eq!(
            f.orchestrator
                .on_capture_completed(result(1, 10), Some(&f.queue), Some(&chars)),
            PairOutcome::NoFrame
        );
        assert_eq!(
            f.orchestrator
                .on_capture_completed(result(2, 20), Some(&f.queue), Some(&chars)),
            PairOutcome::NoFrame
        );
        assert_eq!(f.orchestrator.pending().peek().unwrap().request_id, 2);

        deliver(&f.queue, 20);
        assert!(matches!(
            f.orchestrator.on_frame_available(Some(&f.queue), Some(&chars)),
            PairOutcome::Saved(_)
        ));
        assert!(f.orchestrator.pending().is_empty());
    }

    #[test]
    fn test_orphan_frame_is_released() {
        let mut f = fixture(false);
        deliver(&f.queue, 5);
        assert_eq!(
            f.orchestrator
                .on_frame_available(Some(&f.queue), Some(&characteristics())),
            PairOutcome::Dropped {
                width: 4,
                height: 2
            }
        );
        assert_eq!(f.queue.stats().outstanding, 0);
        assert_eq!(f.encoder.calls.load(Ordering::SeqCst), 0);
        assert!(files(&f.dir).is_empty());
    }

    #[test]
    fn test_result_used_for_one_frame_only() {
        let mut f = fixture(false);
        let chars = characteristics();
        deliver(&f.queue, 1);
        f.orchestrator
            .on_capture_completed(result(1, 1), Some(&f.queue), Some(&chars));

        deliver(&f.queue, 2);
        assert!(matches!(
            f.orchestrator.on_frame_available(Some(&f.queue), Some(&chars)),
            PairOutcome::Dropped { .. }
        ));
        assert_eq!(f.encoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_result_is_not_paired_with_next_frame() {
        let mut f = fixture(false);
        let chars = characteristics();

        // First shot: frame lands before its metadata
        deliver(&f.queue, 100);
        assert!(matches!(
            f.orchestrator.on_frame_available(Some(&f.queue), Some(&chars)),
            PairOutcome::Dropped { .. }
        ));
        assert_eq!(
            f.orchestrator
                .on_capture_completed(result(1, 100), Some(&f.queue), Some(&chars)),
            PairOutcome::NoFrame
        );

        // Second shot's frame must not inherit the first shot's metadata
        deliver(&f.queue, 200);
        assert!(matches!(
            f.orchestrator.on_frame_available(Some(&f.queue), Some(&chars)),
            PairOutcome::Dropped { .. }
        ));
        assert_eq!(f.encoder.calls.load(Ordering::SeqCst), 0);
        assert!(f.orchestrator.pending().is_empty());
        assert_eq!(f.queue.stats().outstanding, 0);
        assert!(files(&f.dir).is_empty());
    }

    #[test]
    fn test_older_frame_keeps_result_pending() {
        let mut f = fixture(false);
        let chars = characteristics();

        deliver(&f.queue, 40);
        assert!(matches!(
            f.orchestrator
                .on_capture_completed(result(3, 50), Some(&f.queue), Some(&chars)),
            PairOutcome::Dropped { .. }
        ));
        assert_eq!(f.orchestrator.pending().peek().unwrap().request_id, 3);

        deliver(&f.queue, 50);
        let outcome = f.orchestrator.on_frame_available(Some(&f.queue), Some(&chars));
        let PairOutcome::Saved(saved) = outcome else {
            panic!("expected a saved photo, got {:?}", outcome);
        };
        assert_eq!(saved.sensor_timestamp_ns, 50);
    }

    #[test]
    fn test_encode_failure_releases_frame_and_leaves_no_file() {
        let mut f = fixture(true);
        deliver(&f.queue, 1);
        let outcome =
            f.orchestrator
                .on_capture_completed(result(1, 1), Some(&f.queue), Some(&characteristics()));

        assert_eq!(
            outcome,
            PairOutcome::Failed(CaptureError::Encode("forced".into()))
        );
        assert_eq!(f.queue.stats().outstanding, 0);
        assert!(files(&f.dir).is_empty());
    }

    #[test]
    fn test_storage_failure_releases_frame_and_clears_pending() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let writer = PhotoWriter::new(PhotoStorage::direct(blocker.clone()), encoder.clone());
        let mut orchestrator = CaptureOrchestrator::new(writer);
        let queue = FrameQueue::new(Size::new(4, 2), 5, CallbackSink::new(|_| true));

        deliver(&queue, 7);
        let outcome =
            orchestrator.on_capture_completed(result(1, 7), Some(&queue), Some(&characteristics()));

        assert!(matches!(outcome, PairOutcome::Failed(CaptureError::Io(_))));
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.stats().outstanding, 0);
        assert!(orchestrator.pending().is_empty());
        assert_eq!(std::fs::read(&blocker).unwrap(), b"x");
    }

    #[test]
    fn test_reset_clears_pending() {
        let mut f = fixture(false);
        f.orchestrator.on_capture_completed(result(1, 1), None, None);
        assert!(!f.orchestrator.pending().is_empty());
        f.orchestrator.reset();
        assert!(f.orchestrator.pending().is_empty());
    }
}
