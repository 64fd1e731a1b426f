//! Transfer queue between the listener thread and the control loop
//!
//! A bounded single-producer single-consumer ringbuffer of [`Frame`]s built on
//! `rtrb`. The listener thread owns the [`FrameProducer`], the control loop
//! owns the [`FrameConsumer`]. Both sides are wait-free: enqueue never blocks
//! and dequeue returns `None` when nothing is pending.
//!
//! # Overflow
//!
//! Capacity is fixed at [`MAX_IN_FLIGHT`] frames. When the control loop falls
//! that far behind, the newest frame is dropped and counted rather than
//! growing the buffer. See [`FrameConsumer::dropped_frames`].

use crate::frame::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum number of frames waiting for the control loop
pub const MAX_IN_FLIGHT: usize = 64;

/// Create a transfer queue with [`MAX_IN_FLIGHT`] capacity
pub fn frame_queue() -> (FrameProducer, FrameConsumer) {
    frame_queue_with_capacity(MAX_IN_FLIGHT)
}

/// Create a transfer queue with an explicit capacity
pub fn frame_queue_with_capacity(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        FrameProducer {
            producer,
            dropped: dropped.clone(),
        },
        FrameConsumer { consumer, dropped },
    )
}

/// Send side, owned by the listener thread
pub struct FrameProducer {
    producer: rtrb::Producer<Frame>,
    dropped: Arc<AtomicU64>,
}

impl FrameProducer {
    /// Queue a frame (non-blocking)
    ///
    /// Returns `false` if the queue was full and the frame was dropped.
    pub fn enqueue(&mut self, frame: Frame) -> bool {
        match self.producer.push(frame) {
            Ok(()) => true,
            Err(rtrb::PushError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Free slots left before frames start being dropped
    pub fn free_slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Receive side, owned by the control loop
pub struct FrameConsumer {
    consumer: rtrb::Consumer<Frame>,
    dropped: Arc<AtomicU64>,
}

impl FrameConsumer {
    /// Take the oldest pending frame, if any (non-blocking)
    pub fn try_dequeue(&mut self) -> Option<Frame> {
        self.consumer.pop().ok()
    }

    /// Number of frames currently waiting
    pub fn pending(&self) -> usize {
        self.consumer.slots()
    }

    /// Discard everything currently queued, returning how many frames were dropped
    pub fn discard_pending(&mut self) -> usize {
        let mut count = 0;
        while self.consumer.pop().is_ok() {
            count += 1;
        }
        count
    }

    /// Total frames dropped on overflow since the queue was created
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
