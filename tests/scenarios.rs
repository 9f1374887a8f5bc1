//! End-to-end scenarios run through the lockstep simulation
//!
//! Every test settles the transmitter out of power-on reset, feeds a pixel
//! stream, and checks what reached the lane against the reference
//! packetization.

use lanetx::context::{self, RegisterCommand};
use lanetx::{
    BuilderState, DrainState, InterruptFlags, PacketCodes, PixelEvent, QueueConfig, ReadyPattern,
    RuntimeRegisters, ScriptedSource, Simulation, SyncState, TimingConfig, TransmitterConfig,
    lane_bytes, packetize,
};
use proptest::prelude::*;

const SETTLE_TICKS: u64 = 1_000;
const DRAIN_TICKS: u64 = 200_000;

fn frame(lines: usize, pixels: usize) -> Vec<PixelEvent> {
    let mut events = vec![PixelEvent::frame_start()];
    for line in 0..lines {
        events.push(PixelEvent::line_start());
        for pixel in 0..pixels {
            events.push(PixelEvent::pixel(((line as u64) << 32) | pixel as u64 | 0x5A00));
        }
        events.push(PixelEvent::line_end());
    }
    events.push(PixelEvent::frame_end());
    events
}

fn expected(events: &[PixelEvent], codes: &PacketCodes) -> Vec<u8> {
    lane_bytes(&packetize(events, codes).unwrap())
}

fn settled(config: &TransmitterConfig) -> Simulation {
    let _ = tracing_subscriber::fmt::try_init();
    let mut sim = Simulation::new(config);
    sim.settle(SETTLE_TICKS).expect("transmitter never left reset");
    sim
}

#[test]
fn one_line_of_four_pixels() {
    let config = TransmitterConfig::default();
    let mut sim = settled(&config);

    let events = vec![
        PixelEvent::frame_start(),
        PixelEvent::first_pixel(0x1111),
        PixelEvent::pixel(0x2222),
        PixelEvent::pixel(0x3333),
        PixelEvent::last_pixel(0x4444),
        PixelEvent::frame_end(),
    ];
    sim.feed(events.clone());
    sim.run_until_drained(DRAIN_TICKS).expect("never drained");

    let bytes = sim.lane_bytes();
    assert_eq!(bytes, expected(&events, &config.codes).as_slice());

    // frame start, header, 4 words, footer, frame end
    assert_eq!(bytes.len(), 4 + 4 + 4 * 8 + 4 + 4);
    assert_eq!(&bytes[..4], &config.codes.frame_start.to_le_bytes());
    let header = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    assert_eq!(header & 0xFFFF, u32::from(config.codes.line_header));
    assert_eq!(header >> 16, 1);
    assert_eq!(&bytes[8..16], &0x1111u64.to_le_bytes());
    let footer = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]);
    assert_eq!(footer >> 16, 4);
    assert_eq!(&bytes[44..], &config.codes.frame_end.to_le_bytes());

    let status = sim.status();
    assert!(!status.interrupt);
    assert!(status.idle);
    assert_eq!(status.builder_stats.lines, 1);
}

#[test]
fn several_frames_stay_in_order() {
    let config = TransmitterConfig::default();
    let mut sim = settled(&config);

    let mut events = frame(3, 5);
    events.extend(frame(0, 0));
    events.extend(frame(2, 1));
    sim.feed(events.clone());
    sim.run_until_drained(DRAIN_TICKS).expect("never drained");

    assert_eq!(sim.lane_bytes(), expected(&events, &config.codes).as_slice());
    assert_eq!(sim.status().builder_stats.frames, 3);
}

#[test]
fn accept_drops_before_the_queue_is_full() {
    let mut config = TransmitterConfig::default();
    config.queue = QueueConfig { capacity: 8, almost_full_threshold: 2 };
    config.timing.ready_timeout = 1_000_000;

    // lane never ready, so nothing drains and the queue must stop the source
    let mut sim = settled(&config).with_ready(ReadyPattern::Never);
    sim.feed(frame(1, 64));
    sim.run(500);

    let status = sim.status();
    assert!(!status.accept);
    assert!(status.queue.high_water <= 8);
    assert_eq!(status.queue.overflow_attempts, 0);
    assert_eq!(status.builder_stats.dropped, 0);
    assert!(!status.causes.contains(InterruptFlags::QUEUE_OVERFLOW));
}

#[test]
fn source_ignoring_accept_for_one_cycle_is_absorbed() {
    let config = TransmitterConfig::default();
    let (mut control, _transmit) = context::contexts(&config);
    for _ in 0..32 {
        control.step(None);
    }
    assert_eq!(control.status().state, SyncState::Running);

    // nothing drains: keep presenting while accept is high, then once more
    let mut events = frame(1, 64).into_iter();
    while control.accept() {
        control.step(events.next());
    }
    let status = control.step(events.next());

    assert_eq!(status.queue.overflow_attempts, 0);
    assert_eq!(status.builder_stats.dropped, 0);
    assert!(status.queue.high_water <= config.queue.capacity);
    for _ in 0..8 {
        control.step(None);
    }
    assert!(!control.status().causes.contains(InterruptFlags::QUEUE_OVERFLOW));
}

#[test]
fn withheld_ready_raises_one_interrupt_per_episode() {
    let mut config = TransmitterConfig::default();
    config.timing.ready_timeout = 8;
    let mut sim = settled(&config);

    let start = sim.transmit_status().cycles;
    sim.set_ready(ReadyPattern::WithheldBetween { from: start + 10, until: start + 60 });
    sim.feed(frame(1, 32));

    sim.run_until(DRAIN_TICKS, |sim| sim.transmit_status().cycles > start + 60)
        .expect("withheld window never passed");
    assert_eq!(sim.timeouts(), 1);

    sim.run_until_drained(DRAIN_TICKS).expect("never resumed");
    let status = sim.status();
    assert!(status.interrupt);
    assert_eq!(status.causes, InterruptFlags::LANE_TIMEOUT);

    let drain = sim.transmit_status().stats;
    assert_eq!(drain.timeouts, 1);
    assert!(drain.units_abandoned > 0);
    assert!(drain.units_sent > 0);

    // sticky until acknowledged
    sim.run(100);
    assert!(sim.status().interrupt);
    sim.command(RegisterCommand::Acknowledge(InterruptFlags::LANE_TIMEOUT));
    assert!(!sim.status().interrupt);
}

#[test]
fn fast_transmit_clock_never_loses_a_lane_timeout() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut runs_with_timeouts = 0;

    for pre_delay in 40..60 {
        let mut config = TransmitterConfig::default();
        config.timing.ready_timeout = 1;
        config.timing.pre_delay = pre_delay;

        // twenty transmit cycles per control cycle
        let mut sim = Simulation::new(&config)
            .with_periods(20, 1)
            .with_ready(ReadyPattern::Periodic { every: 2 });
        sim.settle(SETTLE_TICKS * 20).expect("transmitter never left reset");
        sim.feed([PixelEvent::frame_start(), PixelEvent::frame_end()]);
        sim.run_until_drained(DRAIN_TICKS).expect("never drained");
        sim.run(20 * 8);

        if sim.timeouts() > 0 {
            runs_with_timeouts += 1;
            assert!(
                sim.status().causes.contains(InterruptFlags::LANE_TIMEOUT),
                "pre_delay {pre_delay}: {} lane timeouts never raised the interrupt",
                sim.timeouts()
            );
        }
    }
    assert!(runs_with_timeouts > 0);
}

#[test]
fn fused_idle_never_runs_ahead_of_the_builder() {
    let config = TransmitterConfig::default();
    let mut sim = settled(&config);
    sim.feed(frame(2, 6));

    let mut busy = 0;
    for _ in 0..DRAIN_TICKS {
        sim.step();
        let status = sim.status();
        busy += usize::from(status.builder != BuilderState::Idle);
        assert!(
            !status.idle || status.builder == BuilderState::Idle,
            "fused idle with builder {:?} on control cycle {}",
            status.builder,
            status.cycles
        );
        if sim.is_drained() {
            break;
        }
    }
    assert!(sim.is_drained());
    assert!(busy > 0);
}

#[test]
fn open_line_keeps_fused_idle_low() {
    let config = TransmitterConfig::default();
    let mut sim = settled(&config);
    sim.feed([PixelEvent::frame_start(), PixelEvent::line_start(), PixelEvent::pixel(7)]);

    sim.run_until(DRAIN_TICKS, |sim| sim.status().builder != BuilderState::Idle)
        .expect("builder never left Idle");
    for _ in 0..200 {
        sim.step();
        let status = sim.status();
        assert_ne!(status.builder, BuilderState::Idle);
        assert!(!status.idle, "fused idle during an open line on cycle {}", status.cycles);
    }
}

#[test]
fn soft_reset_while_sending_drops_in_flight_work() {
    let mut config = TransmitterConfig::default();
    config.timing.ready_timeout = 1_000_000;

    // a lane that never takes a unit pins the drain engine in SENDING
    let mut sim = settled(&config).with_ready(ReadyPattern::Never);
    sim.feed(frame(4, 32));
    sim.run_until(DRAIN_TICKS, |sim| sim.transmit_status().state == DrainState::Sending)
        .expect("drain never started");
    sim.run(20);
    assert_eq!(sim.transmit_status().state, DrainState::Sending);

    sim.command(RegisterCommand::SoftReset);
    sim.set_source(ScriptedSource::new([]));
    sim.step();
    assert_eq!(sim.status().state, SyncState::SoftResetPending);
    assert!(!sim.status().idle);

    let ticks = sim
        .run_until(DRAIN_TICKS, |sim| {
            let status = sim.status();
            if status.idle {
                // fused idle never runs ahead of either engine
                assert!(sim.control().builder().is_idle());
                assert!(sim.transmit().drain().is_idle());
            }
            status.idle
        })
        .expect("never returned to idle");
    assert!(ticks > 0);

    let status = sim.status();
    assert_eq!(status.state, SyncState::Running);
    assert_eq!(status.sync.soft_resets, 1);
    assert!(!status.interrupt);

    // the frame-start entry was in flight and never reached the lane
    let drain = sim.transmit_status();
    assert_eq!(drain.state, DrainState::Idle);
    assert_eq!(drain.stats.units_abandoned, 4);
    assert!(sim.lane_bytes().is_empty());
    assert!(sim.transmit().queue_is_empty());

    // back in service: a fresh frame goes through intact
    sim.set_ready(ReadyPattern::Always);
    let events = frame(1, 3);
    sim.feed(events.clone());
    sim.run_until_drained(DRAIN_TICKS).expect("never drained after soft reset");
    assert_eq!(sim.lane_bytes(), expected(&events, &config.codes).as_slice());
}

#[test]
fn double_soft_reset_looks_like_one() {
    let config = TransmitterConfig::default();
    let mut once = settled(&config);
    let mut twice = settled(&config);
    once.feed(frame(2, 16));
    twice.feed(frame(2, 16));
    once.run(40);
    twice.run(40);

    once.command(RegisterCommand::SoftReset);
    twice.command(RegisterCommand::SoftReset);
    once.step();
    twice.step();
    twice.command(RegisterCommand::SoftReset);

    for _ in 0..400 {
        once.step();
        twice.step();
        let (a, b) = (once.status(), twice.status());
        assert_eq!((a.state, a.idle, a.interrupt, a.causes), (b.state, b.idle, b.interrupt, b.causes));
    }
    assert_eq!(twice.status().sync.soft_resets, 1);
    assert_eq!(twice.status().sync.coalesced, 1);
}

#[test]
fn full_reset_returns_to_service() {
    let config = TransmitterConfig::default();
    let mut sim = settled(&config);
    sim.feed(frame(2, 8));
    sim.run(30);

    sim.command(RegisterCommand::Reset);
    sim.step();
    assert_eq!(sim.status().state, SyncState::ResetHeld);
    sim.set_source(ScriptedSource::new([]));

    sim.settle(SETTLE_TICKS).expect("never left reset");
    sim.run_until(DRAIN_TICKS, |sim| sim.status().idle).expect("never idle");
    assert_eq!(sim.status().sync.resets, 1);

    let sent_before = sim.lane_bytes().len();
    let events = frame(1, 2);
    sim.feed(events.clone());
    sim.run_until_drained(DRAIN_TICKS).expect("never drained after reset");
    assert_eq!(&sim.lane_bytes()[sent_before..], expected(&events, &config.codes).as_slice());
}

#[test]
fn malformed_markers_are_skipped_and_reported() {
    let config = TransmitterConfig::default();
    let mut sim = settled(&config);

    let mut events = frame(1, 2);
    events.insert(1, PixelEvent::line_end());
    events.insert(0, PixelEvent::pixel(7));
    sim.feed(events);
    sim.run_until_drained(DRAIN_TICKS).expect("never drained");

    assert_eq!(sim.lane_bytes(), expected(&frame(1, 2), &config.codes).as_slice());
    let status = sim.status();
    assert_eq!(status.causes, InterruptFlags::MALFORMED_BOUNDARY);
    assert_eq!(status.builder_stats.malformed, 2);
}

#[test]
fn register_writes_apply_at_the_next_frame() {
    let config = TransmitterConfig::default();
    let mut sim = settled(&config);

    let first = frame(2, 4);
    let second = frame(1, 4);
    let mut events = first.clone();
    events.extend(second.clone());
    sim.feed(events);
    sim.run(3);

    let codes = PacketCodes { frame_start: 0xF5F5_0001, frame_end: 0xF5F5_0002, line_header: 0x0077 };
    let timing = TimingConfig { pre_delay: 1, post_delay: 1, line_delay_reg: 1, ..config.timing };
    sim.command(RegisterCommand::Write(RuntimeRegisters { codes, timing }));
    sim.run_until_drained(DRAIN_TICKS).expect("never drained");

    let mut wanted = expected(&first, &config.codes);
    wanted.extend(expected(&second, &codes));
    assert_eq!(sim.lane_bytes(), wanted.as_slice());
    assert_eq!(sim.transmit().drain().timing(), timing);
}

#[test]
fn line_delay_spaces_units_on_the_lane() {
    let mut config = TransmitterConfig::default();
    config.timing.line_delay_reg = 3;
    let mut sim = settled(&config);
    sim.feed([PixelEvent::frame_start()]);
    sim.run_until(DRAIN_TICKS, |sim| sim.lane_bytes().len() == 4).expect("never sent");

    let strobes: Vec<usize> = sim
        .lane_trace()
        .iter()
        .enumerate()
        .filter(|(_, cycle)| cycle.sent.is_some())
        .map(|(index, _)| index)
        .collect();
    assert!(strobes.windows(2).all(|pair| pair[1] - pair[0] == 4));
}

#[derive(Debug, Clone)]
struct Stream {
    frames: Vec<Vec<Vec<u64>>>,
    blanking: usize,
}

fn arb_stream() -> impl Strategy<Value = Stream> {
    let line = prop::collection::vec(any::<u64>(), 0..6);
    let frame = prop::collection::vec(line, 0..4);
    (prop::collection::vec(frame, 1..3), 0usize..3)
        .prop_map(|(frames, blanking)| Stream { frames, blanking })
}

impl Stream {
    fn events(&self) -> Vec<PixelEvent> {
        let mut events = Vec::new();
        let mut push = |event: PixelEvent| {
            events.push(event);
            events.extend(std::iter::repeat_n(PixelEvent::blank(), self.blanking));
        };
        for frame in &self.frames {
            push(PixelEvent::frame_start());
            for line in frame {
                match line.as_slice() {
                    [] => {
                        push(PixelEvent::line_start());
                        push(PixelEvent::line_end());
                    }
                    [only] => {
                        push(PixelEvent::first_pixel(*only));
                        push(PixelEvent::line_end());
                    }
                    [first, middle @ .., last] => {
                        push(PixelEvent::first_pixel(*first));
                        middle.iter().for_each(|p| push(PixelEvent::pixel(*p)));
                        push(PixelEvent::last_pixel(*last));
                    }
                }
            }
            push(PixelEvent::frame_end());
        }
        events
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_lane_matches_reference_packetization(
        stream in arb_stream(),
        control_period in 1u64..4,
        transmit_period in 1u64..4,
        every in 1u64..4,
        frame_start in any::<u32>(),
        frame_end in any::<u32>(),
        line_header in any::<u16>(),
        gap in 0u32..3,
    ) {
        let mut config = TransmitterConfig::default();
        config.codes = PacketCodes { frame_start, frame_end, line_header };
        config.timing.line_delay_reg = gap;
        config.timing.pre_delay = 2;
        config.timing.post_delay = 1;

        let mut sim = Simulation::new(&config)
            .with_periods(control_period, transmit_period)
            .with_ready(ReadyPattern::Periodic { every });
        prop_assert!(sim.settle(SETTLE_TICKS).is_some());

        let events = stream.events();
        let wanted = expected(&events, &config.codes);
        sim.feed(events);
        prop_assert!(sim.run_until_drained(DRAIN_TICKS).is_some());

        prop_assert_eq!(sim.lane_bytes(), wanted.as_slice());
        let status = sim.status();
        prop_assert!(!status.interrupt);
        prop_assert!(status.queue.high_water <= config.queue.capacity);
        prop_assert_eq!(status.queue.overflow_attempts, 0);
    }
}
