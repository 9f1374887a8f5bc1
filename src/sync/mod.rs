//! Synchronization controller: reset sequencing, soft-reset propagation and
//! status fusion between the control and transmit contexts.
//!
//! [`handshake`] returns the two halves. [`SyncController`] lives in the
//! control context and owns the state machine; [`TransmitPort`] lives in the
//! transmit context and only samples and publishes staged signals.
//!
//! ```text
//!  control context                         transmit context
//!  ---------------                         ----------------
//!  transmit reset  ──level, N stages──►    drain + queue reset
//!  soft request    ──level, N stages──►    drain + queue soft reset
//!  acknowledge     ◄──level, N stages──    soft request seen
//!  drain idle      ◄──level, N stages──    DrainEngine::is_idle
//!  lane timeouts   ◄──count, N stages──    DrainOutput::timeout
//!  timing          ──watch channel───►     applied when the drain is idle
//! ```
//!
//! Soft reset is a four-phase handshake: raise the request, wait for the
//! acknowledge, drop the request, then wait for the acknowledge to drop and
//! both engines to report idle. Requests arriving before that completes are
//! coalesced into the one in progress.

pub mod crossing;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{TimingConfig, TransmitterConfig};
use crate::types::InterruptFlags;
use crossing::{CountReceiver, CountSender, LevelReceiver, LevelSender};

/// Synchronization controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncState {
    #[default]
    ResetHeld,
    Settling,
    Running,
    SoftResetPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SoftResetPhase {
    AwaitAck,
    AwaitRelease,
}

/// Control-context inputs for one controller cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlInputs {
    /// Control-context reset level.
    pub reset: bool,
    /// Soft-reset trigger pulse from the register front end.
    pub soft_reset: bool,
    pub builder_idle: bool,
    /// Interrupt causes the packet builder raised this cycle.
    pub builder_raised: InterruptFlags,
}

/// What the control context must do this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlDirectives {
    /// Hold the packet builder in `Idle` and deassert `accept`.
    pub hold_builder: bool,
    /// Assert the producer-side queue reset.
    pub flush_queue: bool,
}

/// Status surfaced to the register front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FusedStatus {
    pub state: SyncState,
    /// Both engines idle while the controller is running.
    pub idle: bool,
    /// Sticky fused interrupt.
    pub interrupt: bool,
    pub causes: InterruptFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncStats {
    pub resets: u64,
    pub soft_resets: u64,
    /// Soft-reset requests folded into one already in progress.
    pub coalesced: u64,
}

/// Create the controller and its transmit-context port.
pub fn handshake(config: &TransmitterConfig) -> (SyncController, TransmitPort) {
    let stages = config.sync.stages;
    let (reset_tx, reset_rx) = crossing::level(true, stages);
    let (soft_tx, soft_rx) = crossing::level(false, stages);
    let (ack_tx, ack_rx) = crossing::level(false, stages);
    let (idle_tx, idle_rx) = crossing::level(true, stages);
    let (irq_tx, irq_rx) = crossing::counter(stages);
    let (timing_tx, timing_rx) = watch::channel(config.timing);

    let controller = SyncController {
        state: SyncState::ResetHeld,
        phase: SoftResetPhase::AwaitAck,
        settle_remaining: 0,
        clock_delay: config.timing.clock_delay,
        transmit_reset: reset_tx,
        soft_request: soft_tx,
        ack: ack_rx,
        drain_idle: idle_rx,
        drain_timeouts: irq_rx,
        timing: timing_tx,
        causes: InterruptFlags::NONE,
        builder_idle: true,
        drain_idle_seen: true,
        stats: SyncStats::default(),
    };

    let port = TransmitPort {
        reset: reset_rx,
        soft_request: soft_rx,
        ack: ack_tx,
        idle: idle_tx,
        timeouts: irq_tx,
        timing: timing_rx,
        soft_seen: false,
    };

    (controller, port)
}

/// Control-context half of the synchronization controller.
#[derive(Debug)]
pub struct SyncController {
    state: SyncState,
    phase: SoftResetPhase,
    settle_remaining: u32,
    clock_delay: u32,
    transmit_reset: LevelSender,
    soft_request: LevelSender,
    ack: LevelReceiver,
    drain_idle: LevelReceiver,
    drain_timeouts: CountReceiver,
    timing: watch::Sender<TimingConfig>,
    causes: InterruptFlags,
    builder_idle: bool,
    drain_idle_seen: bool,
    stats: SyncStats,
}

impl SyncController {
    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Fused idle: both engines report idle and no reset is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == SyncState::Running && self.builder_idle && self.drain_idle_seen
    }

    pub fn status(&self) -> FusedStatus {
        FusedStatus {
            state: self.state,
            idle: self.is_idle(),
            interrupt: !self.causes.is_empty(),
            causes: self.causes,
        }
    }

    /// Record the packet builder's idle level after its cycle has run.
    pub fn observe_builder(&mut self, idle: bool) {
        self.builder_idle = idle;
    }

    /// Clear the sticky causes in `mask`; returns the causes that were cleared.
    pub fn acknowledge(&mut self, mask: InterruptFlags) -> InterruptFlags {
        let cleared = self.causes.clear(mask);
        if !cleared.is_empty() {
            debug!("Interrupt causes {:#x} acknowledged", cleared.value());
        }
        cleared
    }

    /// Publish new timing to the transmit context. `clock_delay` applies from
    /// the next reset sequence.
    pub fn stage_timing(&mut self, timing: TimingConfig) {
        self.clock_delay = timing.clock_delay;
        self.timing.send_replace(timing);
    }

    /// Advance one control cycle.
    pub fn tick(&mut self, inputs: ControlInputs) -> ControlDirectives {
        let ack = self.ack.sample();
        self.drain_idle_seen = self.drain_idle.sample();
        let timeouts = self.drain_timeouts.sample();
        if timeouts > 0 {
            debug!("{} lane timeout episodes crossed", timeouts);
            self.causes |= InterruptFlags::LANE_TIMEOUT;
        }
        self.causes |= inputs.builder_raised;
        self.builder_idle = inputs.builder_idle;

        if inputs.reset {
            self.hold_reset();
        } else {
            self.advance(inputs.soft_reset, ack);
        }

        ControlDirectives {
            hold_builder: self.state != SyncState::Running,
            flush_queue: inputs.reset || self.state == SyncState::SoftResetPending,
        }
    }

    fn hold_reset(&mut self) {
        if self.state != SyncState::ResetHeld {
            info!("Control reset asserted in {:?}, holding transmit context", self.state);
            self.stats.resets += 1;
            self.state = SyncState::ResetHeld;
        }
        self.transmit_reset.set(true);
        self.soft_request.set(false);
    }

    fn advance(&mut self, soft_reset: bool, ack: bool) {
        match self.state {
            SyncState::ResetHeld => {
                debug!("Control reset cleared, settling for {} cycles", self.clock_delay);
                self.settle_remaining = self.clock_delay;
                self.state = SyncState::Settling;
                if self.settle_remaining == 0 {
                    self.release();
                }
                self.coalesce(soft_reset);
            }
            SyncState::Settling => {
                self.settle_remaining = self.settle_remaining.saturating_sub(1);
                if self.settle_remaining == 0 {
                    self.release();
                }
                self.coalesce(soft_reset);
            }
            SyncState::Running => {
                if soft_reset {
                    self.stats.soft_resets += 1;
                    self.soft_request.set(true);
                    self.phase = SoftResetPhase::AwaitAck;
                    self.state = SyncState::SoftResetPending;
                    info!("Soft reset requested");
                }
            }
            SyncState::SoftResetPending => {
                self.coalesce(soft_reset);
                match self.phase {
                    SoftResetPhase::AwaitAck => {
                        if ack {
                            self.soft_request.set(false);
                            self.phase = SoftResetPhase::AwaitRelease;
                        }
                    }
                    SoftResetPhase::AwaitRelease => {
                        if !ack && self.drain_idle_seen && self.builder_idle {
                            self.state = SyncState::Running;
                            info!("Soft reset complete");
                        }
                    }
                }
            }
        }
    }

    fn release(&mut self) {
        self.transmit_reset.set(false);
        self.state = SyncState::Running;
        info!("Transmit context released");
    }

    fn coalesce(&mut self, soft_reset: bool) {
        if soft_reset {
            self.stats.coalesced += 1;
            debug!("Soft reset request coalesced into {:?}", self.state);
        }
    }
}

/// What the transmit context must do this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransmitDirectives {
    pub reset: bool,
    pub soft_reset: bool,
    /// Timing written since the last cycle.
    pub timing: Option<TimingConfig>,
}

impl TransmitDirectives {
    /// The drain engine and consumer side of the queue must be held.
    pub fn hold(&self) -> bool {
        self.reset || self.soft_reset
    }
}

/// Transmit-context half of the synchronization controller.
#[derive(Debug)]
pub struct TransmitPort {
    reset: LevelReceiver,
    soft_request: LevelReceiver,
    ack: LevelSender,
    idle: LevelSender,
    timeouts: CountSender,
    timing: watch::Receiver<TimingConfig>,
    soft_seen: bool,
}

impl TransmitPort {
    /// Sample the staged control signals at the start of a transmit cycle.
    pub fn sample(&mut self) -> TransmitDirectives {
        let reset = self.reset.sample();
        let soft_reset = self.soft_request.sample();
        self.soft_seen = soft_reset;

        let timing = match self.timing.has_changed() {
            Ok(true) => Some(*self.timing.borrow_and_update()),
            _ => None,
        };

        TransmitDirectives { reset, soft_reset, timing }
    }

    /// Publish this cycle's drain status at the end of a transmit cycle.
    pub fn publish(&mut self, drain_idle: bool, timeout: bool) {
        self.ack.set(self.soft_seen);
        self.idle.set(drain_idle);
        if timeout {
            self.timeouts.bump();
        }
    }
}
