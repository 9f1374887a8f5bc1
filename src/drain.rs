//! Drain engine: serializes queue entries onto the lane.
//!
//! Runs in the transmit context, one [`DrainEngine::tick`] per transmit cycle.
//! A burst starts when the queue is non-empty, waits `pre_delay` cycles, then
//! pops entries and presents their units one per cycle under the lane's
//! `ready` handshake, with `line_delay_reg` idle cycles between units of one
//! entry. When the queue runs dry the engine waits `post_delay` cycles and
//! returns to `Idle`.
//!
//! A unit that waits `ready_timeout` cycles for `ready` is abandoned together
//! with the rest of its entry. The timeout is reported once per stall episode;
//! the episode ends the first cycle the lane asserts `ready` again.

use tracing::{debug, trace, warn};

use crate::config::TimingConfig;
use crate::queue::QueueConsumer;
use crate::types::QueueEntry;

/// Drain engine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainState {
    #[default]
    Idle,
    PreDelay,
    Sending,
    PostDelay,
}

/// Lane-facing outputs of one transmit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneCycle {
    /// Unit presented this cycle; meaningful only while `request` is set.
    pub data: u8,
    /// Per-unit request strobe.
    pub request: bool,
    /// Clock-lane request, asserted whenever the engine is active.
    pub clock_request: bool,
    /// Unit the lane accepted this cycle (`request` and `ready` both high).
    pub sent: Option<u8>,
}

/// Outputs of one drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainOutput {
    pub lane: LaneCycle,
    /// A new stall episode exceeded the ready timeout this cycle.
    pub timeout: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainStats {
    pub entries: u64,
    pub units_sent: u64,
    pub units_abandoned: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone, Copy)]
struct Burst {
    units: [u8; QueueEntry::MAX_UNITS],
    len: usize,
    index: usize,
    gap: u32,
    stalled: u32,
}

impl Burst {
    fn new(entry: QueueEntry) -> Self {
        let mut units = [0u8; QueueEntry::MAX_UNITS];
        let mut len = 0;
        for (slot, unit) in units.iter_mut().zip(entry.units()) {
            *slot = unit;
            len += 1;
        }
        Self { units, len, index: 0, gap: 0, stalled: 0 }
    }

    fn remaining(&self) -> usize {
        self.len - self.index
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    PreDelay { remaining: u32 },
    Sending(Burst),
    PostDelay { remaining: u32 },
}

#[derive(Debug)]
pub struct DrainEngine {
    phase: Phase,
    timing: TimingConfig,
    staged_timing: Option<TimingConfig>,
    stall_reported: bool,
    stats: DrainStats,
}

impl DrainEngine {
    pub fn new(timing: TimingConfig) -> Self {
        Self {
            phase: Phase::Idle,
            timing,
            staged_timing: None,
            stall_reported: false,
            stats: DrainStats::default(),
        }
    }

    pub fn state(&self) -> DrainState {
        match self.phase {
            Phase::Idle => DrainState::Idle,
            Phase::PreDelay { .. } => DrainState::PreDelay,
            Phase::Sending(_) => DrainState::Sending,
            Phase::PostDelay { .. } => DrainState::PostDelay,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    pub fn timing(&self) -> TimingConfig {
        self.timing
    }

    pub fn stats(&self) -> DrainStats {
        self.stats
    }

    /// Stage new timing; it takes effect the next time the engine is idle.
    pub fn stage_timing(&mut self, timing: TimingConfig) {
        self.staged_timing = Some(timing);
        if self.is_idle() {
            self.apply_staged_timing();
        }
    }

    /// Abort any burst, dropping the partially sent entry, and return to `Idle`.
    pub fn soft_reset(&mut self) {
        if let Phase::Sending(burst) = self.phase {
            debug!("Drain engine soft reset drops {} unsent units", burst.remaining());
            self.stats.units_abandoned += burst.remaining() as u64;
        }
        self.phase = Phase::Idle;
        self.stall_reported = false;
        self.apply_staged_timing();
    }

    /// Advance one transmit cycle.
    pub fn tick(&mut self, ready: bool, queue: &QueueConsumer) -> DrainOutput {
        let mut out = DrainOutput::default();
        if ready {
            self.stall_reported = false;
        }

        self.phase = match self.phase {
            Phase::Idle => {
                if queue.is_empty() {
                    Phase::Idle
                } else if self.timing.pre_delay == 0 {
                    self.next_entry(queue)
                } else {
                    Phase::PreDelay { remaining: self.timing.pre_delay }
                }
            }
            Phase::PreDelay { remaining } => {
                if remaining > 1 {
                    Phase::PreDelay { remaining: remaining - 1 }
                } else {
                    self.next_entry(queue)
                }
            }
            Phase::Sending(burst) => self.send(burst, ready, queue, &mut out),
            Phase::PostDelay { remaining } => {
                if remaining > 1 {
                    Phase::PostDelay { remaining: remaining - 1 }
                } else {
                    Phase::Idle
                }
            }
        };

        if self.is_idle() {
            self.apply_staged_timing();
        }
        out.lane.clock_request = !self.is_idle();
        out
    }

    fn send(
        &mut self,
        mut burst: Burst,
        ready: bool,
        queue: &QueueConsumer,
        out: &mut DrainOutput,
    ) -> Phase {
        if burst.gap > 0 {
            burst.gap -= 1;
            return Phase::Sending(burst);
        }

        let unit = burst.units[burst.index];
        out.lane.data = unit;
        out.lane.request = true;

        if ready {
            self.stats.units_sent += 1;
            out.lane.sent = Some(unit);
            trace!("Drain engine sent unit {:#04x}", unit);

            burst.index += 1;
            burst.stalled = 0;
            if burst.index < burst.len {
                burst.gap = self.timing.line_delay_reg;
                return Phase::Sending(burst);
            }
            return self.next_entry(queue);
        }

        burst.stalled += 1;
        if burst.stalled < self.timing.ready_timeout {
            return Phase::Sending(burst);
        }

        self.stats.units_abandoned += burst.remaining() as u64;
        if !self.stall_reported {
            self.stall_reported = true;
            self.stats.timeouts += 1;
            out.timeout = true;
            warn!(
                "Lane withheld ready for {} cycles, abandoning {} units",
                burst.stalled,
                burst.remaining()
            );
        }
        self.next_entry(queue)
    }

    /// Pop the next entry, or start the post-amble when the queue is dry.
    fn next_entry(&mut self, queue: &QueueConsumer) -> Phase {
        match queue.pop() {
            Ok(entry) => {
                self.stats.entries += 1;
                trace!("Drain engine popped {:?}", entry);
                Phase::Sending(Burst::new(entry))
            }
            Err(_) if self.timing.post_delay == 0 => Phase::Idle,
            Err(_) => Phase::PostDelay { remaining: self.timing.post_delay },
        }
    }

    fn apply_staged_timing(&mut self) {
        if let Some(timing) = self.staged_timing.take() {
            debug!("Drain engine applying timing {:?}", timing);
            self.timing = timing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::queue::{QueueProducer, channel};

    fn timing(pre: u32, post: u32, gap: u32, timeout: u32) -> TimingConfig {
        TimingConfig {
            pre_delay: pre,
            post_delay: post,
            line_delay_reg: gap,
            ready_timeout: timeout,
            ..TimingConfig::default()
        }
    }

    fn setup(timing: TimingConfig) -> (DrainEngine, QueueProducer, QueueConsumer) {
        let (tx, rx) = channel(&QueueConfig::default());
        (DrainEngine::new(timing), tx, rx)
    }

    /// Tick until idle, returning every cycle's output.
    fn drain(engine: &mut DrainEngine, rx: &QueueConsumer, mut ready: impl FnMut(usize) -> bool) -> Vec<DrainOutput> {
        let mut outputs = Vec::new();
        for cycle in 0..10_000 {
            outputs.push(engine.tick(ready(cycle), rx));
            if engine.is_idle() && rx.is_empty() {
                break;
            }
        }
        outputs
    }

    fn sent(outputs: &[DrainOutput]) -> Vec<u8> {
        outputs.iter().filter_map(|o| o.lane.sent).collect()
    }

    #[test]
    fn walks_through_all_states() {
        let (mut engine, tx, rx) = setup(timing(2, 2, 0, 8));
        tx.push(QueueEntry::control(0x0403_0201)).unwrap();

        let mut states = Vec::new();
        for _ in 0..12 {
            engine.tick(true, &rx);
            states.push(engine.state());
        }

        assert_eq!(
            &states[..9],
            &[
                DrainState::PreDelay,
                DrainState::PreDelay,
                DrainState::Sending,
                DrainState::Sending,
                DrainState::Sending,
                DrainState::Sending,
                DrainState::PostDelay,
                DrainState::PostDelay,
                DrainState::Idle,
            ]
        );
        assert!(engine.is_idle());
        assert_eq!(engine.stats().units_sent, 4);
    }

    #[test]
    fn sends_units_in_entry_order_back_to_back() {
        let (mut engine, tx, rx) = setup(timing(1, 1, 0, 8));
        tx.push(QueueEntry::control(0x0403_0201)).unwrap();
        tx.push(QueueEntry::data(0x0C0B_0A09_0807_0605)).unwrap();

        let outputs = drain(&mut engine, &rx, |_| true);
        assert_eq!(sent(&outputs), (1..=12).collect::<Vec<u8>>());
        assert_eq!(engine.stats().entries, 2);

        // no idle cycle between the two entries
        let first = outputs.iter().position(|o| o.lane.sent.is_some()).unwrap();
        assert!(outputs[first..first + 12].iter().all(|o| o.lane.sent.is_some()));
    }

    #[test]
    fn unit_is_held_until_ready() {
        let (mut engine, tx, rx) = setup(timing(0, 0, 0, 100));
        tx.push(QueueEntry::control(0xDDCC_BBAA)).unwrap();

        let outputs = drain(&mut engine, &rx, |cycle| cycle % 3 == 0);
        assert_eq!(sent(&outputs), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert!(outputs.iter().all(|o| !o.timeout));

        // a presented but unaccepted unit keeps its request raised
        let held = outputs.iter().filter(|o| o.lane.request && o.lane.sent.is_none()).count();
        assert!(held > 0);
    }

    #[test]
    fn line_delay_inserts_gaps_between_units() {
        let (mut engine, tx, rx) = setup(timing(0, 0, 2, 8));
        tx.push(QueueEntry::control(0x0403_0201)).unwrap();

        let outputs = drain(&mut engine, &rx, |_| true);
        let strobes: Vec<bool> = outputs.iter().map(|o| o.lane.request).collect();
        let first = strobes.iter().position(|s| *s).unwrap();

        assert_eq!(
            &strobes[first..first + 10],
            &[true, false, false, true, false, false, true, false, false, true]
        );
        assert_eq!(sent(&outputs), vec![1, 2, 3, 4]);
    }

    #[test]
    fn timeout_fires_once_per_stall_episode_and_resumes() {
        let (mut engine, tx, rx) = setup(timing(0, 0, 0, 4));
        tx.push(QueueEntry::control(0x0403_0201)).unwrap();
        tx.push(QueueEntry::control(0x0807_0605)).unwrap();
        tx.push(QueueEntry::control(0x0C0B_0A09)).unwrap();

        // ready withheld long enough to abandon the first two entries
        let outputs = drain(&mut engine, &rx, |cycle| cycle >= 9);

        assert_eq!(outputs.iter().filter(|o| o.timeout).count(), 1);
        assert_eq!(engine.stats().timeouts, 1);
        assert_eq!(engine.stats().units_abandoned, 8);
        assert_eq!(sent(&outputs), vec![9, 10, 11, 12]);
    }

    #[test]
    fn separate_stalls_each_raise_a_timeout() {
        let (mut engine, tx, rx) = setup(timing(0, 0, 0, 2));
        tx.push(QueueEntry::control(0x0403_0201)).unwrap();
        tx.push(QueueEntry::control(0x0807_0605)).unwrap();

        // stall, one ready cycle (ends the episode), stall again
        let pattern = [false, false, false, true, false, false];
        let outputs = drain(&mut engine, &rx, |cycle| pattern.get(cycle).copied().unwrap_or(true));
        assert_eq!(outputs.iter().filter(|o| o.timeout).count(), 2);
    }

    #[test]
    fn soft_reset_drops_in_flight_entry() {
        let (mut engine, tx, rx) = setup(timing(0, 4, 0, 8));
        tx.push(QueueEntry::data(u64::MAX)).unwrap();

        engine.tick(true, &rx);
        engine.tick(true, &rx);
        engine.tick(true, &rx);
        assert_eq!(engine.state(), DrainState::Sending);

        engine.soft_reset();
        assert!(engine.is_idle());
        assert_eq!(engine.stats().units_abandoned, 6);

        let out = engine.tick(false, &rx);
        assert!(!out.lane.request);
        assert!(!out.lane.clock_request);
    }

    #[test]
    fn clock_request_covers_the_whole_burst() {
        let (mut engine, tx, rx) = setup(timing(2, 2, 0, 8));
        tx.push(QueueEntry::control(1)).unwrap();

        let mut cycles = Vec::new();
        for _ in 0..16 {
            let out = engine.tick(true, &rx);
            cycles.push((out.lane.clock_request, engine.state()));
        }

        // raised on the cycle the engine leaves Idle, dropped on the cycle it returns
        assert_eq!(cycles[0], (true, DrainState::PreDelay));
        assert!(cycles.iter().all(|(clock, state)| *clock == (*state != DrainState::Idle)));
        assert!(cycles.iter().any(|(_, state)| *state == DrainState::PostDelay));
        assert_eq!(cycles.last(), Some(&(false, DrainState::Idle)));
    }

    #[test]
    fn staged_timing_waits_for_idle() {
        let (mut engine, tx, rx) = setup(timing(0, 0, 0, 8));
        tx.push(QueueEntry::control(1)).unwrap();
        engine.tick(true, &rx);
        assert!(!engine.is_idle());

        engine.stage_timing(timing(3, 3, 1, 16));
        assert_eq!(engine.timing().pre_delay, 0);

        drain(&mut engine, &rx, |_| true);
        engine.tick(true, &rx);
        assert_eq!(engine.timing().pre_delay, 3);
    }
}
