//! Staged signal crossings between the two execution contexts.
//!
//! A value is published by its source context through a `watch` channel and
//! sampled by the destination context through a chain of register stages, one
//! shift per destination cycle. The destination therefore sees a value only
//! after `stages` of its own cycles, and always sees a whole value.
//!
//! Events cross as a running count rather than a pulse. However many events
//! land inside one destination sampling window, the count moves and the
//! destination reports how far.

use tokio::sync::watch;

/// Create a crossing for `T` with `stages` register stages (at least two).
pub fn staged<T: Copy>(initial: T, stages: usize) -> (StagedSender<T>, StagedReceiver<T>) {
    let (tx, rx) = watch::channel(initial);
    let stages = vec![initial; stages.max(2)];
    (StagedSender { tx }, StagedReceiver { rx, stages })
}

/// Create a level crossing with `stages` register stages.
pub fn level(initial: bool, stages: usize) -> (LevelSender, LevelReceiver) {
    staged(initial, stages)
}

/// Create an event-count crossing with `stages` register stages.
pub fn counter(stages: usize) -> (CountSender, CountReceiver) {
    let (tx, rx) = staged(0u64, stages);
    (CountSender { level: tx, count: 0 }, CountReceiver { level: rx, seen: 0 })
}

pub type LevelSender = StagedSender<bool>;
pub type LevelReceiver = StagedReceiver<bool>;

/// Source side of a staged crossing.
#[derive(Debug)]
pub struct StagedSender<T> {
    tx: watch::Sender<T>,
}

impl<T> StagedSender<T> {
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }
}

/// Destination side of a staged crossing.
#[derive(Debug)]
pub struct StagedReceiver<T> {
    rx: watch::Receiver<T>,
    stages: Vec<T>,
}

impl<T: Copy> StagedReceiver<T> {
    /// Shift the chain by one destination cycle and return the last stage.
    pub fn sample(&mut self) -> T {
        self.stages.rotate_right(1);
        self.stages[0] = *self.rx.borrow();
        self.current()
    }

    /// Last stage without advancing the chain.
    pub fn current(&self) -> T {
        self.stages[self.stages.len() - 1]
    }

    pub fn depth(&self) -> usize {
        self.stages.len()
    }
}

#[derive(Debug)]
pub struct CountSender {
    level: StagedSender<u64>,
    count: u64,
}

impl CountSender {
    /// Record one event.
    pub fn bump(&mut self) {
        self.count = self.count.wrapping_add(1);
        self.level.set(self.count);
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

#[derive(Debug)]
pub struct CountReceiver {
    level: StagedReceiver<u64>,
    seen: u64,
}

impl CountReceiver {
    /// Advance one destination cycle; returns the events that arrived.
    pub fn sample(&mut self) -> u64 {
        let now = self.level.sample();
        let arrived = now.wrapping_sub(self.seen);
        self.seen = now;
        arrived
    }
}
