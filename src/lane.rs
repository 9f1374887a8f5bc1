//! Serial lane seen by the transmit context.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use crate::drain::LaneCycle;

/// Lane sink sampled once per transmit cycle.
pub trait Lane: Send + 'static {
    /// `ready` level for transmit cycle `cycle`.
    fn ready(&mut self, cycle: u64) -> bool;

    /// Lane outputs the drain engine produced this cycle.
    fn transmit(&mut self, cycle: &LaneCycle);
}

/// When a scripted lane asserts `ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadyPattern {
    #[default]
    Always,
    Never,
    /// Ready on every `every`-th cycle.
    Periodic { every: u64 },
    /// Ready except for cycles in `from..until`.
    WithheldBetween { from: u64, until: u64 },
}

impl ReadyPattern {
    pub fn is_ready(&self, cycle: u64) -> bool {
        match *self {
            ReadyPattern::Always => true,
            ReadyPattern::Never => false,
            ReadyPattern::Periodic { every } => every <= 1 || cycle % every == 0,
            ReadyPattern::WithheldBetween { from, until } => !(from..until).contains(&cycle),
        }
    }
}

/// Lane that forwards every accepted unit into an unbounded channel.
#[derive(Debug)]
pub struct ChannelLane {
    pattern: ReadyPattern,
    units: mpsc::UnboundedSender<u8>,
    clock_cycles: u64,
}

impl ChannelLane {
    pub fn new(pattern: ReadyPattern) -> (Self, mpsc::UnboundedReceiver<u8>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { pattern, units: tx, clock_cycles: 0 }, rx)
    }

    /// Cycles the clock lane has been requested.
    pub fn clock_cycles(&self) -> u64 {
        self.clock_cycles
    }
}

impl Lane for ChannelLane {
    fn ready(&mut self, cycle: u64) -> bool {
        self.pattern.is_ready(cycle)
    }

    fn transmit(&mut self, cycle: &LaneCycle) {
        if cycle.clock_request {
            self.clock_cycles += 1;
        }
        if let Some(unit) = cycle.sent {
            if self.units.send(unit).is_err() {
                trace!("Lane receiver dropped, discarding unit {:#04x}", unit);
            }
        }
    }
}
