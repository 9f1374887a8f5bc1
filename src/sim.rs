//! Deterministic lockstep simulation of both execution contexts.
//!
//! The simulation advances a base tick counter. The control context steps on
//! every `control_period`-th tick and the transmit context on every
//! `transmit_period`-th tick, control first when both fall on one tick. The
//! periods set the relative clock rates, so `(1, 3)` runs the control context
//! three times as fast as the transmit context.

use tracing::debug;

use crate::config::TransmitterConfig;
use crate::context::{self, ControlContext, RegisterCommand, Status, TransmitContext, TransmitStatus};
use crate::drain::LaneCycle;
use crate::lane::ReadyPattern;
use crate::source::ScriptedSource;
use crate::sync::SyncState;
use crate::types::PixelEvent;

#[derive(Debug)]
pub struct Simulation {
    control: ControlContext,
    transmit: TransmitContext,
    source: ScriptedSource,
    ready: ReadyPattern,
    control_period: u64,
    transmit_period: u64,
    ticks: u64,
    transmit_cycles: u64,
    lane: Vec<u8>,
    trace: Vec<LaneCycle>,
    timeouts: u64,
}

impl Simulation {
    pub fn new(config: &TransmitterConfig) -> Self {
        let (control, transmit) = context::contexts(config);
        Self {
            control,
            transmit,
            source: ScriptedSource::new([]),
            ready: ReadyPattern::Always,
            control_period: 1,
            transmit_period: 1,
            ticks: 0,
            transmit_cycles: 0,
            lane: Vec::new(),
            trace: Vec::new(),
            timeouts: 0,
        }
    }

    /// Base ticks per control cycle and per transmit cycle (each at least one).
    pub fn with_periods(mut self, control: u64, transmit: u64) -> Self {
        self.control_period = control.max(1);
        self.transmit_period = transmit.max(1);
        self
    }

    pub fn with_ready(mut self, ready: ReadyPattern) -> Self {
        self.ready = ready;
        self
    }

    pub fn with_source(mut self, source: ScriptedSource) -> Self {
        self.source = source;
        self
    }

    /// Replace the pixel source with one replaying `events` under back-pressure.
    pub fn feed(&mut self, events: impl IntoIterator<Item = PixelEvent>) {
        self.source = ScriptedSource::new(events);
    }

    pub fn set_source(&mut self, source: ScriptedSource) {
        self.source = source;
    }

    pub fn set_ready(&mut self, ready: ReadyPattern) {
        self.ready = ready;
    }

    pub fn command(&mut self, command: RegisterCommand) {
        self.control.apply(command);
    }

    pub fn control(&self) -> &ControlContext {
        &self.control
    }

    pub fn transmit(&self) -> &TransmitContext {
        &self.transmit
    }

    pub fn status(&self) -> Status {
        self.control.status()
    }

    pub fn transmit_status(&self) -> TransmitStatus {
        self.transmit.status()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Units the lane has accepted so far.
    pub fn lane_bytes(&self) -> &[u8] {
        &self.lane
    }

    pub fn take_lane_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.lane)
    }

    /// Every transmit cycle's lane outputs.
    pub fn lane_trace(&self) -> &[LaneCycle] {
        &self.trace
    }

    /// Lane timeouts reported by the drain engine.
    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    /// Advance one base tick.
    pub fn step(&mut self) {
        if self.ticks % self.control_period == 0 {
            let event = self.source.poll(self.control.accept());
            self.control.step(event);
        }

        if self.ticks % self.transmit_period == 0 {
            let ready = self.ready.is_ready(self.transmit_cycles);
            let output = self.transmit.step(ready);
            self.lane.extend(output.lane.sent);
            self.timeouts += u64::from(output.timeout);
            self.trace.push(output.lane);
            self.transmit_cycles += 1;
        }

        self.ticks += 1;
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Step until `predicate` holds, for at most `max_ticks`. Returns the ticks
    /// taken, or `None` if the predicate never held.
    pub fn run_until<F>(&mut self, max_ticks: u64, mut predicate: F) -> Option<u64>
    where
        F: FnMut(&Simulation) -> bool,
    {
        for taken in 0..max_ticks {
            if predicate(self) {
                return Some(taken);
            }
            self.step();
        }
        predicate(self).then_some(max_ticks)
    }

    /// Step until the controller is running and the transmit context released.
    pub fn settle(&mut self, max_ticks: u64) -> Option<u64> {
        let taken = self.run_until(max_ticks, |sim| {
            sim.status().state == SyncState::Running && !sim.transmit.status().held
        });
        debug!("Simulation settled after {:?} ticks", taken);
        taken
    }

    /// True when every event has been consumed and every entry sent.
    pub fn is_drained(&self) -> bool {
        let builder = self.control.builder();
        self.source.remaining() == 0
            && builder.is_idle()
            && builder.pending() == 0
            && self.transmit.queue_is_empty()
            && self.transmit.drain().is_idle()
            && self.status().idle
    }

    /// Step until [`is_drained`](Self::is_drained) holds.
    pub fn run_until_drained(&mut self, max_ticks: u64) -> Option<u64> {
        self.run_until(max_ticks, Simulation::is_drained)
    }
}
