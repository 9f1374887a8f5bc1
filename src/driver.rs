//! Driver spawns and manages the two execution-context tasks

use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::TransmitterConfig;
use crate::context::{self, ControlContext, RegisterCommand, Status, TransmitContext, TransmitStatus};
use crate::lane::Lane;
use crate::source::PixelSource;
use crate::types::ClockRate;

/// Consecutive source failures after which the control task stops.
const MAX_ERRORS: u32 = 10;

/// Result of spawning driver tasks
pub struct DriverChannels {
    /// Control-context status, updated every control cycle
    pub status: watch::Receiver<Status>,
    /// Transmit-context status, updated every transmit cycle
    pub transmit: watch::Receiver<TransmitStatus>,
    /// Register commands for the control context
    pub commands: mpsc::UnboundedSender<RegisterCommand>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
}

/// Driver spawns and manages the control and transmit tasks
///
/// The control task owns the pixel source and the control context. The
/// transmit task owns the lane and the transmit context. Each is paced by
/// its own [`ClockRate`], so the two advance independently and only meet
/// at the queue and the staged crossings.
pub struct Driver;

impl Driver {
    /// Spawn both tasks. Must be called from within a tokio runtime.
    pub fn spawn<S, L>(config: &TransmitterConfig, source: S, lane: L) -> DriverChannels
    where
        S: PixelSource,
        L: Lane,
    {
        let (control, transmit) = context::contexts(config);

        let (status_tx, status_rx) = watch::channel(control.status());
        let (transmit_tx, transmit_rx) = watch::channel(transmit.status());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let cancel_control = cancel.clone();
        let control_rate = config.clocks.control;
        tokio::spawn(async move {
            Self::control_task(control, source, command_rx, status_tx, control_rate, cancel_control)
                .await;
        });

        let cancel_transmit = cancel.clone();
        let transmit_rate = config.clocks.transmit;
        tokio::spawn(async move {
            Self::transmit_task(transmit, lane, transmit_tx, transmit_rate, cancel_transmit).await;
        });

        DriverChannels { status: status_rx, transmit: transmit_rx, commands: command_tx, cancel }
    }

    /// Control task - samples the source and steps the control context
    async fn control_task<S>(
        mut context: ControlContext,
        mut source: S,
        mut commands: mpsc::UnboundedReceiver<RegisterCommand>,
        status_tx: watch::Sender<Status>,
        rate: ClockRate,
        cancel: CancellationToken,
    ) where
        S: PixelSource,
    {
        info!("Control task started ({:?})", rate);
        let mut clock = CycleClock::new(rate);
        let mut error_count = 0u32;
        let mut exhausted = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Control task cancelled");
                    break;
                }
                _ = clock.tick() => {}
            }

            while let Ok(command) = commands.try_recv() {
                context.apply(command);
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Control task cancelled while sampling source");
                    break;
                }
                result = source.next_event(context.accept()) => result,
            };

            let event = match result {
                Ok(event) => {
                    error_count = 0;
                    event
                }
                Err(e) => {
                    error_count += 1;
                    error!("Pixel source error ({}/{}): {}", error_count, MAX_ERRORS, e);
                    if error_count >= MAX_ERRORS {
                        error!("Too many pixel source errors, stopping control task");
                        break;
                    }
                    None
                }
            };

            if !exhausted && source.is_exhausted() {
                exhausted = true;
                debug!("Pixel source exhausted after {} control cycles", context.status().cycles);
            }

            let status = context.step(event);
            trace!("Control cycle {}: {:?}", status.cycles, status.state);
            status_tx.send_replace(status);
        }

        info!("Control task ended after {} cycles", context.status().cycles);
    }

    /// Transmit task - samples the lane and steps the transmit context
    async fn transmit_task<L>(
        mut context: TransmitContext,
        mut lane: L,
        status_tx: watch::Sender<TransmitStatus>,
        rate: ClockRate,
        cancel: CancellationToken,
    ) where
        L: Lane,
    {
        info!("Transmit task started ({:?})", rate);
        let mut clock = CycleClock::new(rate);
        let mut cycle = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Transmit task cancelled");
                    break;
                }
                _ = clock.tick() => {}
            }

            let ready = lane.ready(cycle);
            let output = context.step(ready);
            lane.transmit(&output.lane);
            if output.timeout {
                warn!("Lane timeout on transmit cycle {}", cycle);
            }

            status_tx.send_replace(context.status());
            cycle += 1;
        }

        info!("Transmit task ended after {} cycles", cycle);
    }
}

/// Paces one context according to its [`ClockRate`].
enum CycleClock {
    Native,
    Interval(Interval),
}

impl CycleClock {
    fn new(rate: ClockRate) -> Self {
        match rate.period() {
            None => CycleClock::Native,
            Some(period) => {
                let mut interval = interval(period);
                // Set missed tick behavior to delay (don't burst)
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                CycleClock::Interval(interval)
            }
        }
    }

    async fn tick(&mut self) {
        match self {
            CycleClock::Native => tokio::task::yield_now().await,
            CycleClock::Interval(interval) => {
                interval.tick().await;
            }
        }
    }
}
