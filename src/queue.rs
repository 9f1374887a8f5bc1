//! Bounded queue bridging the control and transmit contexts.
//!
//! The queue is the only data path between the two contexts. [`channel`]
//! returns a producer half for the control context and a consumer half for the
//! transmit context; every observation either side makes of the other goes
//! through these halves, and each operation takes the queue lock for its whole
//! duration so the caller never sees a partially updated occupancy.
//!
//! Either half may hold the queue in reset. While any reset level is asserted
//! the queue is empty and every push or pop is rejected, so a reset that lands
//! in the same cycle as a push or pop always wins.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::config::QueueConfig;
use crate::types::QueueEntry;

/// Rejected push. The entry is handed back untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    #[error("queue is full")]
    Full(QueueEntry),
    #[error("queue is held in reset")]
    Reset(QueueEntry),
}

impl PushError {
    pub fn into_entry(self) -> QueueEntry {
        match self {
            PushError::Full(entry) | PushError::Reset(entry) => entry,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    #[error("queue is empty")]
    Empty,
    #[error("queue is held in reset")]
    Reset,
}

/// Queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub pushed: u64,
    pub popped: u64,
    /// Pushes rejected because the queue was full.
    pub overflow_attempts: u64,
    /// Pushes and pops rejected because the queue was in reset.
    pub reset_rejections: u64,
    pub high_water: usize,
}

#[derive(Debug)]
struct Ring {
    entries: VecDeque<QueueEntry>,
    producer_reset: bool,
    consumer_reset: bool,
    stats: QueueStats,
}

impl Ring {
    fn in_reset(&self) -> bool {
        self.producer_reset || self.consumer_reset
    }
}

#[derive(Debug)]
struct Shared {
    ring: Mutex<Ring>,
    capacity: usize,
    almost_full_at: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Ring> {
        // every mutation is a single VecDeque call plus counter updates
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a queue, returning its producer and consumer halves.
pub fn channel(config: &QueueConfig) -> (QueueProducer, QueueConsumer) {
    let capacity = config.capacity.max(1);
    let threshold = config.almost_full_threshold.min(capacity);
    let shared = Arc::new(Shared {
        ring: Mutex::new(Ring {
            entries: VecDeque::with_capacity(capacity),
            producer_reset: false,
            consumer_reset: false,
            stats: QueueStats::default(),
        }),
        capacity,
        almost_full_at: capacity - threshold,
    });

    (QueueProducer { shared: Arc::clone(&shared) }, QueueConsumer { shared })
}

/// Control-context half of the queue.
#[derive(Debug)]
pub struct QueueProducer {
    shared: Arc<Shared>,
}

impl QueueProducer {
    /// Append `entry` at the tail.
    pub fn push(&self, entry: QueueEntry) -> Result<(), PushError> {
        let mut ring = self.shared.lock();
        if ring.in_reset() {
            ring.stats.reset_rejections += 1;
            return Err(PushError::Reset(entry));
        }
        if ring.entries.len() >= self.shared.capacity {
            ring.stats.overflow_attempts += 1;
            return Err(PushError::Full(entry));
        }

        ring.entries.push_back(entry);
        ring.stats.pushed += 1;
        ring.stats.high_water = ring.stats.high_water.max(ring.entries.len());
        Ok(())
    }

    /// Early back-pressure flag: occupancy has reached `capacity - threshold`.
    pub fn almost_full(&self) -> bool {
        self.shared.lock().entries.len() >= self.shared.almost_full_at
    }

    pub fn is_full(&self) -> bool {
        self.shared.lock().entries.len() >= self.shared.capacity
    }

    /// True while either half holds the queue in reset.
    pub fn in_reset(&self) -> bool {
        self.shared.lock().in_reset()
    }

    /// Drive the producer-side reset level. Asserting it clears the queue.
    pub fn set_reset(&self, asserted: bool) {
        let mut ring = self.shared.lock();
        ring.producer_reset = asserted;
        if asserted {
            ring.entries.clear();
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.lock().stats
    }
}

/// Transmit-context half of the queue.
#[derive(Debug)]
pub struct QueueConsumer {
    shared: Arc<Shared>,
}

impl QueueConsumer {
    /// Remove the entry at the head.
    pub fn pop(&self) -> Result<QueueEntry, PopError> {
        let mut ring = self.shared.lock();
        if ring.in_reset() {
            ring.stats.reset_rejections += 1;
            return Err(PopError::Reset);
        }
        let entry = ring.entries.pop_front().ok_or(PopError::Empty)?;
        ring.stats.popped += 1;
        Ok(entry)
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().entries.is_empty()
    }

    pub fn in_reset(&self) -> bool {
        self.shared.lock().in_reset()
    }

    /// Drive the consumer-side reset level. Asserting it clears the queue.
    pub fn set_reset(&self, asserted: bool) {
        let mut ring = self.shared.lock();
        ring.consumer_reset = asserted;
        if asserted {
            ring.entries.clear();
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.lock().stats
    }
}
