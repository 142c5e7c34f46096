//! Bounded drop-oldest queue for agent audio on its way into the room.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::base::{OutboundStats, TransportError, TransportResult};
use crate::core::codec::AudioFrame;

/// Default number of frames held before eviction starts.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 50;

/// Single-consumer queue between the relay and the room publisher task.
///
/// `push` never waits. When the queue is full the oldest frame is evicted so
/// the most recent agent speech is always the next thing published.
#[derive(Debug)]
pub struct OutboundAudioQueue {
    frames: Mutex<VecDeque<AudioFrame>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    failure: Mutex<Option<TransportError>>,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    sent: AtomicU64,
}

impl OutboundAudioQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            failure: Mutex::new(None),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            sent: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame, evicting the oldest one if the queue is full.
    pub fn push(&self, frame: AudioFrame) -> TransportResult<()> {
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        {
            let mut frames = self.frames.lock();
            if frames.len() >= self.capacity
                && let Some(evicted) = frames.pop_front()
            {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    sequence = evicted.sequence(),
                    capacity = self.capacity,
                    "Outbound audio queue full, dropped oldest frame"
                );
            }
            frames.push_back(frame);
        }

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next frame. Returns `None` once the queue is closed.
    ///
    /// Frames still queued at close time are discarded.
    pub async fn pop(&self) -> Option<AudioFrame> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(frame) = self.frames.lock().pop_front() {
                self.sent.fetch_add(1, Ordering::Relaxed);
                return Some(frame);
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting frames and wake the consumer.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.frames.lock().clear();
            self.notify.notify_one();
        }
    }

    /// Record a publish failure; later pushes return it.
    pub fn fail(&self, err: TransportError) {
        self.failure.lock().get_or_insert(err);
        self.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> OutboundStats {
        OutboundStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            depth: self.len(),
        }
    }
}

impl Default for OutboundAudioQueue {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_CAPACITY)
    }
}
