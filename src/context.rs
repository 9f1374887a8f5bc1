//! The two execution contexts, each advanced one cycle at a time.
//!
//! [`ControlContext`] owns the packet builder, the producer half of the queue
//! and the synchronization controller. [`TransmitContext`] owns the drain
//! engine, the consumer half and the transmit port. The two share nothing
//! except the queue and the staged crossings, so they can be stepped from
//! separate tasks or in lockstep from one thread.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::builder::{BuilderState, BuilderStats, PacketBuilder};
use crate::config::{RuntimeRegisters, TransmitterConfig};
use crate::drain::{DrainEngine, DrainOutput, DrainState, DrainStats};
use crate::queue::{self, QueueConsumer, QueueProducer, QueueStats};
use crate::sync::{self, ControlInputs, SyncController, SyncState, SyncStats, TransmitPort};
use crate::types::{InterruptFlags, PixelEvent};

/// Cycles the control reset is held after construction.
const POWER_ON_RESET_CYCLES: u32 = 1;

/// Register front-end commands delivered to the control context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterCommand {
    SoftReset,
    /// Assert the control reset for one cycle.
    Reset,
    /// Clear the sticky interrupt causes in the mask.
    Acknowledge(InterruptFlags),
    Write(RuntimeRegisters),
}

/// Control-context status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    pub state: SyncState,
    /// Both engines idle and no reset in progress.
    pub idle: bool,
    /// Sticky fused interrupt.
    pub interrupt: bool,
    pub causes: InterruptFlags,
    /// Level presented to the pixel source for the next cycle.
    pub accept: bool,
    pub builder: BuilderState,
    pub cycles: u64,
    pub builder_stats: BuilderStats,
    pub queue: QueueStats,
    pub sync: SyncStats,
}

/// Transmit-context status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransmitStatus {
    pub state: DrainState,
    /// Transmit context is holding the drain engine in reset.
    pub held: bool,
    pub cycles: u64,
    pub stats: DrainStats,
}

/// Build both contexts from one configuration.
pub fn contexts(config: &TransmitterConfig) -> (ControlContext, TransmitContext) {
    let (producer, consumer) = queue::channel(&config.queue);
    let (controller, port) = sync::handshake(config);

    let control = ControlContext {
        builder: PacketBuilder::new(config.codes),
        producer,
        sync: controller,
        power_on_remaining: POWER_ON_RESET_CYCLES,
        pending_reset: false,
        pending_soft_reset: false,
        last_raised: InterruptFlags::NONE,
        accept: false,
        cycles: 0,
    };

    let transmit = TransmitContext {
        drain: DrainEngine::new(config.timing),
        consumer,
        port,
        held: true,
        cycles: 0,
    };

    (control, transmit)
}

#[derive(Debug)]
pub struct ControlContext {
    builder: PacketBuilder,
    producer: QueueProducer,
    sync: SyncController,
    power_on_remaining: u32,
    pending_reset: bool,
    pending_soft_reset: bool,
    last_raised: InterruptFlags,
    accept: bool,
    cycles: u64,
}

impl ControlContext {
    /// Back-pressure level the pixel source sees this cycle.
    pub fn accept(&self) -> bool {
        self.accept
    }

    pub fn builder(&self) -> &PacketBuilder {
        &self.builder
    }

    pub fn sync(&self) -> &SyncController {
        &self.sync
    }

    /// Apply a register command. Resets are latched and take effect on the
    /// next [`step`](Self::step).
    pub fn apply(&mut self, command: RegisterCommand) {
        debug!("Register command {:?}", command);
        match command {
            RegisterCommand::SoftReset => self.pending_soft_reset = true,
            RegisterCommand::Reset => self.pending_reset = true,
            RegisterCommand::Acknowledge(mask) => {
                self.sync.acknowledge(mask);
            }
            RegisterCommand::Write(registers) => self.write_registers(registers),
        }
    }

    /// Stage new codes in the builder and new timing for the drain engine.
    pub fn write_registers(&mut self, registers: RuntimeRegisters) {
        self.builder.stage_codes(registers.codes);
        self.sync.stage_timing(registers.timing);
    }

    /// Advance one control cycle with the event the source presented.
    pub fn step(&mut self, event: Option<PixelEvent>) -> Status {
        self.cycles += 1;

        let reset = self.power_on_remaining > 0 || std::mem::take(&mut self.pending_reset);
        self.power_on_remaining = self.power_on_remaining.saturating_sub(1);

        let directives = self.sync.tick(ControlInputs {
            reset,
            soft_reset: std::mem::take(&mut self.pending_soft_reset),
            builder_idle: self.builder.is_idle(),
            builder_raised: std::mem::take(&mut self.last_raised),
        });

        self.producer.set_reset(directives.flush_queue);

        if directives.hold_builder {
            if let Some(event) = event.filter(|e| !e.is_blank()) {
                trace!("Dropping pixel event {:?} while builder is held", event);
            }
            self.builder.soft_reset();
            self.accept = false;
        } else {
            let output = self.builder.tick(event, &self.producer);
            self.last_raised = output.raised;
            self.accept = output.accept;
        }
        self.sync.observe_builder(self.builder.is_idle());

        self.status()
    }

    pub fn status(&self) -> Status {
        let fused = self.sync.status();
        Status {
            state: fused.state,
            idle: fused.idle,
            interrupt: fused.interrupt,
            causes: fused.causes,
            accept: self.accept,
            builder: self.builder.state(),
            cycles: self.cycles,
            builder_stats: self.builder.stats(),
            queue: self.producer.stats(),
            sync: self.sync.stats(),
        }
    }
}

#[derive(Debug)]
pub struct TransmitContext {
    drain: DrainEngine,
    consumer: QueueConsumer,
    port: TransmitPort,
    held: bool,
    cycles: u64,
}

impl TransmitContext {
    pub fn drain(&self) -> &DrainEngine {
        &self.drain
    }

    pub fn queue_is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Advance one transmit cycle with the lane's `ready` level.
    pub fn step(&mut self, ready: bool) -> DrainOutput {
        self.cycles += 1;

        let directives = self.port.sample();
        if let Some(timing) = directives.timing {
            self.drain.stage_timing(timing);
        }

        let hold = directives.hold();
        if hold != self.held {
            debug!("Transmit context {}", if hold { "held" } else { "released" });
            self.held = hold;
        }
        self.consumer.set_reset(hold);

        let output = if hold {
            self.drain.soft_reset();
            DrainOutput::default()
        } else {
            self.drain.tick(ready, &self.consumer)
        };

        self.port.publish(self.drain.is_idle(), output.timeout);
        output
    }

    pub fn status(&self) -> TransmitStatus {
        TransmitStatus {
            state: self.drain.state(),
            held: self.held,
            cycles: self.cycles,
            stats: self.drain.stats(),
        }
    }
}
