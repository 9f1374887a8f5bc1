//! Pacing of an execution context

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How fast an execution context advances its cycle counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClockRate {
    /// Free-running: one cycle per scheduler turn.
    #[default]
    Native,

    /// At most this many cycles per second.
    Hz(u32),
}

impl ClockRate {
    /// Cycle period, or `None` when free-running.
    pub fn period(self) -> Option<Duration> {
        match self {
            ClockRate::Native => None,
            ClockRate::Hz(0) => None,
            ClockRate::Hz(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }

    /// Check if the rate is usable.
    pub fn is_valid(self) -> bool {
        !matches!(self, ClockRate::Hz(0))
    }
}
