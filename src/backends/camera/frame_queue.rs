// SPDX-License-Identifier: GPL-3.0-only

//! Bounded RAW frame queue
//!
//! The camera writes finished RAW images through a [`FrameProducer`]; the
//! worker pulls them with [`FrameQueue::acquire_latest`]. At most `capacity`
//! buffers may be outstanding (queued or held by the consumer). While the
//! pool is exhausted further deliveries are skipped.
//!
//! A [`RawFrame`] returns its slot to the pool when it is dropped, so every
//! acquired buffer is released exactly once.

use super::types::{RawImage, Size};
use super::{CallbackSink, CameraCallback};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Delivery and release counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Frames accepted into the queue
    pub delivered: u64,
    /// Frames refused because the pool was full or the queue closed
    pub skipped: u64,
    /// Frames handed to the consumer
    pub acquired: u64,
    /// Buffers returned to the pool (consumed or discarded)
    pub released: u64,
    /// Buffers currently queued or held by the consumer
    pub outstanding: usize,
}

struct QueueState {
    queued: VecDeque<RawImage>,
    closed: bool,
    stats: QueueStats,
}

struct QueueShared {
    size: Size,
    capacity: usize,
    state: Mutex<QueueState>,
    listener: CallbackSink,
}

impl QueueShared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panicking holder cannot leave the counters half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release_slot(&self) {
        let mut state = self.lock();
        state.stats.outstanding = state.stats.outstanding.saturating_sub(1);
        state.stats.released += 1;
    }
}

/// Consumer side of the RAW queue, owned by the camera worker
pub struct FrameQueue {
    shared: Arc<QueueShared>,
}

impl FrameQueue {
    /// Create a queue for RAW16 frames of `size`
    ///
    /// `listener` receives [`CameraCallback::FrameAvailable`] after every
    /// accepted delivery.
    pub fn new(size: Size, capacity: usize, listener: CallbackSink) -> Self {
        debug!(%size, capacity, "Creating RAW frame queue");
        Self {
            shared: Arc::new(QueueShared {
                size,
                capacity: capacity.max(1),
                state: Mutex::new(QueueState {
                    queued: VecDeque::with_capacity(capacity),
                    closed: false,
                    stats: QueueStats::default(),
                }),
                listener,
            }),
        }
    }

    pub fn size(&self) -> Size {
        self.shared.size
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Handle the camera writes into
    pub fn producer(&self) -> FrameProducer {
        FrameProducer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Take the newest queued frame, releasing every older one
    pub fn acquire_latest(&self) -> Option<RawFrame> {
        let mut state = self.shared.lock();
        if state.closed {
            return None;
        }

        let latest = state.queued.pop_back()?;
        let stale = state.queued.len();
        state.queued.clear();
        state.stats.outstanding -= stale;
        state.stats.released += stale as u64;
        state.stats.acquired += 1;
        drop(state);

        if stale > 0 {
            debug!(stale, "Discarded older queued frames");
        }

        Some(RawFrame {
            image: latest,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Stop accepting frames and release everything still queued
    ///
    /// Frames already held by the consumer stay valid until dropped.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let queued = state.queued.len();
        state.queued.clear();
        state.stats.outstanding -= queued;
        state.stats.released += queued as u64;
        debug!(released = queued, "RAW frame queue closed");
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.lock().stats
    }
}

impl Drop for FrameQueue {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("size", &self.shared.size)
            .field("capacity", &self.shared.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Producer side of the RAW queue, handed to the capture session
#[derive(Clone)]
pub struct FrameProducer {
    shared: Arc<QueueShared>,
}

impl FrameProducer {
    /// Size every delivered frame must have
    pub fn size(&self) -> Size {
        self.shared.size
    }

    /// Deliver a finished frame
    ///
    /// Returns false when the frame was skipped (pool exhausted, wrong size,
    /// or queue closed).
    pub fn deliver(&self, image: RawImage) -> bool {
        {
            let mut state = self.shared.lock();
            if state.closed {
                state.stats.skipped += 1;
                debug!("Frame delivered to a closed queue, dropping");
                return false;
            }
            if image.size() != self.shared.size {
                state.stats.skipped += 1;
                warn!(
                    expected = %self.shared.size,
                    actual = %image.size(),
                    "Frame size does not match queue configuration, dropping"
                );
                return false;
            }
            if state.stats.outstanding >= self.shared.capacity {
                state.stats.skipped += 1;
                warn!(
                    capacity = self.shared.capacity,
                    "RAW buffer pool exhausted, skipping frame"
                );
                return false;
            }
            state.queued.push_back(image);
            state.stats.outstanding += 1;
            state.stats.delivered += 1;
        }

        self.shared.listener.post(CameraCallback::FrameAvailable);
        true
    }
}

impl std::fmt::Debug for FrameProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameProducer")
            .field("size", &self.shared.size)
            .finish()
    }
}

/// One acquired RAW buffer
///
/// The buffer slot returns to the queue when this value is dropped or
/// explicitly [released](RawFrame::release).
pub struct RawFrame {
    image: RawImage,
    shared: Arc<QueueShared>,
}

impl RawFrame {
    pub fn width(&self) -> u32 {
        self.image.width
    }

    pub fn height(&self) -> u32 {
        self.image.height
    }

    pub fn size(&self) -> Size {
        self.image.size()
    }

    /// Row-major RAW16 samples
    pub fn data(&self) -> &[u16] {
        &self.image.data
    }

    pub fn sensor_timestamp_ns(&self) -> u64 {
        self.image.sensor_timestamp_ns
    }

    /// Return the buffer to the queue
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.shared.release_slot();
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("size", &self.image.size())
            .field("sensor_timestamp_ns", &self.image.sensor_timestamp_ns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn image(width: u32, height: u32, timestamp: u64) -> RawImage {
        RawImage {
            width,
            height,
            data: vec![0; (width * height) as usize],
            sensor_timestamp_ns: timestamp,
        }
    }

    fn counting_sink() -> (CallbackSink, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let sink = CallbackSink::new(move |callback| {
            if matches!(callback, CameraCallback::FrameAvailable) {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
            true
        });
        (sink, count)
    }

    #[test]
    fn test_acquire_latest_discards_older_frames() {
        let (sink, notified) = counting_sink();
        let queue = FrameQueue::new(Size::new(4, 2), 5, sink);
        let producer = queue.producer();

        assert!(producer.deliver(image(4, 2, 1)));
        assert!(producer.deliver(image(4, 2, 2)));
        assert!(producer.deliver(image(4, 2, 3)));
        assert_eq!(notified.load(Ordering::SeqCst), 3);

        let frame = queue.acquire_latest().unwrap();
        assert_eq!(frame.sensor_timestamp_ns(), 3);
        assert_eq!(queue.stats().released, 2);
        assert_eq!(queue.stats().outstanding, 1);

        frame.release();
        let stats = queue.stats();
        assert_eq!(stats.released, 3);
        assert_eq!(stats.outstanding, 0);
        assert!(queue.acquire_latest().is_none());
    }

    #[test]
    fn test_unreleased_frames_exhaust_pool() {
        let (sink, _) = counting_sink();
        let queue = FrameQueue::new(Size::new(2, 2), 5, sink);
        let producer = queue.producer();

        let mut held = Vec::new();
        for ts in 0..5 {
            assert!(producer.deliver(image(2, 2, ts)));
            held.push(queue.acquire_latest().unwrap());
        }

        // Sixth delivery stalls while five buffers are held
        assert!(!producer.deliver(image(2, 2, 5)));
        assert_eq!(queue.stats().skipped, 1);

        held.pop();
        assert!(producer.deliver(image(2, 2, 6)));
    }

    #[test]
    fn test_each_frame_released_once() {
        let (sink, _) = counting_sink();
        let queue = FrameQueue::new(Size::new(2, 2), 5, sink);
        let producer = queue.producer();

        producer.deliver(image(2, 2, 1));
        let frame = queue.acquire_latest().unwrap();
        drop(frame);
        producer.deliver(image(2, 2, 2));
        queue.acquire_latest().unwrap().release();

        let stats = queue.stats();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.released, 2);
        assert_eq!(stats.outstanding, 0);
    }

    #[test]
    fn test_close_releases_queued_and_refuses_delivery() {
        let (sink, notified) = counting_sink();
        let queue = FrameQueue::new(Size::new(2, 2), 5, sink);
        let producer = queue.producer();

        producer.deliver(image(2, 2, 1));
        producer.deliver(image(2, 2, 2));
        queue.close();
        queue.close();

        let stats = queue.stats();
        assert_eq!(stats.released, 2);
        assert_eq!(stats.outstanding, 0);
        assert!(!producer.deliver(image(2, 2, 3)));
        assert!(queue.acquire_latest().is_none());
        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_frame_outliving_queue_close_still_releases() {
        let (sink, _) = counting_sink();
        let queue = FrameQueue::new(Size::new(2, 2), 5, sink);
        queue.producer().deliver(image(2, 2, 1));
        let frame = queue.acquire_latest().unwrap();
        queue.close();
        assert_eq!(queue.stats().outstanding, 1);
        drop(frame);
        assert_eq!(queue.stats().outstanding, 0);
    }

    #[test]
    fn test_wrong_size_is_skipped() {
        let (sink, notified) = counting_sink();
        let queue = FrameQueue::new(Size::new(4, 4), 5, sink);
        assert!(!queue.producer().deliver(image(2, 2, 1)));
        assert_eq!(queue.stats().skipped, 1);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }
}
