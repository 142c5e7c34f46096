//! Unbounded channels with depth monitoring.
//!
//! Event queues between relay stages are unbounded because events arrive at a
//! low rate compared to audio. Each queue still tracks its depth and logs once
//! when it crosses a high-water mark, then again only after it has drained
//! below half of that mark.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug)]
struct QueueGauge {
    name: String,
    depth: AtomicUsize,
    high_water: usize,
    warned: AtomicBool,
}

impl QueueGauge {
    fn on_push(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if self.high_water > 0
            && depth >= self.high_water
            && !self.warned.swap(true, Ordering::Relaxed)
        {
            warn!(
                queue = %self.name,
                depth,
                high_water = self.high_water,
                "Queue depth crossed high-water mark"
            );
        }
    }

    fn on_pop(&self) {
        let previous = self.depth.fetch_sub(1, Ordering::Relaxed);
        if previous.saturating_sub(1) < self.high_water / 2 {
            self.warned.store(false, Ordering::Relaxed);
        }
    }
}

/// Sending half of a monitored queue.
#[derive(Debug)]
pub struct MonitoredSender<T> {
    inner: mpsc::UnboundedSender<T>,
    gauge: Arc<QueueGauge>,
}

impl<T> Clone for MonitoredSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gauge: self.gauge.clone(),
        }
    }
}

impl<T> MonitoredSender<T> {
    /// Enqueue a value. Fails only when the receiver has been dropped.
    pub fn send(&self, value: T) -> Result<(), mpsc::error::SendError<T>> {
        self.gauge.on_push();
        self.inner.send(value).inspect_err(|_| {
            self.gauge.depth.fetch_sub(1, Ordering::Relaxed);
        })
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Number of values sent but not yet received.
    pub fn depth(&self) -> usize {
        self.gauge.depth.load(Ordering::Relaxed)
    }
}

/// Receiving half of a monitored queue.
#[derive(Debug)]
pub struct MonitoredReceiver<T> {
    inner: mpsc::UnboundedReceiver<T>,
    gauge: Arc<QueueGauge>,
}

impl<T> MonitoredReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        let value = self.inner.recv().await?;
        self.gauge.on_pop();
        Some(value)
    }

    pub fn try_recv(&mut self) -> Result<T, mpsc::error::TryRecvError> {
        let value = self.inner.try_recv()?;
        self.gauge.on_pop();
        Ok(value)
    }

    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn depth(&self) -> usize {
        self.gauge.depth.load(Ordering::Relaxed)
    }
}

/// Create a monitored unbounded queue named `name`.
///
/// A `high_water` of zero disables the depth warning.
pub fn monitored_channel<T>(
    name: impl Into<String>,
    high_water: usize,
) -> (MonitoredSender<T>, MonitoredReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let gauge = Arc::new(QueueGauge {
        name: name.into(),
        depth: AtomicUsize::new(0),
        high_water,
        warned: AtomicBool::new(false),
    });
    (
        MonitoredSender {
            inner: tx,
            gauge: gauge.clone(),
        },
        MonitoredReceiver { inner: rx, gauge },
    )
}
