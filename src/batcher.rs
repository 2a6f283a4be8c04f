//! Pending-event queue with a fixed drain cadence.
//!
//! Notification bursts (a zip extracting into Downloads, a browser writing
//! several files) are queued as they arrive and released in bounded batches
//! no more often than `batch_interval`. Duplicate notifications are kept;
//! later stages tolerate them.

use crate::config::BatchingConfig;
use crate::event::WatchEvent;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// FIFO of watch events drained in bounded batches.
#[derive(Debug)]
pub struct EventBatcher {
    queue: VecDeque<WatchEvent>,
    batch_interval: Duration,
    max_pending: usize,
    last_drain: Instant,
}

impl EventBatcher {
    /// Creates an empty batcher. The first drain becomes due one
    /// `batch_interval` after creation.
    pub fn new(batch_interval: Duration, max_pending: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            batch_interval,
            max_pending: max_pending.max(1),
            last_drain: Instant::now(),
        }
    }

    pub fn from_config(config: &BatchingConfig) -> Self {
        Self::new(config.batch_interval(), config.max_pending)
    }

    /// Appends an event. Never blocks and never drops.
    pub fn enqueue(&mut self, event: WatchEvent) {
        self.queue.push_back(event);
    }

    /// Number of queued events.
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// True if a drain at `now` would release events.
    pub fn is_due_at(&self, now: Instant) -> bool {
        !self.queue.is_empty() && now.saturating_duration_since(self.last_drain) >= self.batch_interval
    }

    pub fn is_due(&self) -> bool {
        self.is_due_at(Instant::now())
    }

    /// Releases up to `max_pending` events from the head of the queue if a
    /// drain is due, otherwise returns an empty batch.
    pub fn drain_due_at(&mut self, now: Instant) -> Vec<WatchEvent> {
        if !self.is_due_at(now) {
            return Vec::new();
        }

        let take = self.queue.len().min(self.max_pending);
        let batch: Vec<WatchEvent> = self.queue.drain(..take).collect();
        self.last_drain = now;
        tracing::debug!(
            released = batch.len(),
            remaining = self.queue.len(),
            "drained pending events"
        );
        batch
    }

    pub fn drain_due(&mut self) -> Vec<WatchEvent> {
        self.drain_due_at(Instant::now())
    }
}
