//! Register front end for a running transmitter

use futures::StreamExt;
use futures::stream::BoxStream;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{RuntimeRegisters, TransmitterConfig};
use crate::context::{RegisterCommand, Status, TransmitStatus};
use crate::driver::Driver;
use crate::lane::Lane;
use crate::source::PixelSource;
use crate::stream::SampleExt;
use crate::types::InterruptFlags;
use crate::{Result, TransmitError};

/// Handle to a transmitter running on the tokio runtime.
///
/// Dropping the handle stops both execution contexts.
pub struct TransmitterHandle {
    status: watch::Receiver<Status>,
    transmit: watch::Receiver<TransmitStatus>,
    commands: mpsc::UnboundedSender<RegisterCommand>,
    cancel: CancellationToken,
}

impl TransmitterHandle {
    /// Validate `config` and spawn both contexts.
    pub fn spawn<S, L>(config: &TransmitterConfig, source: S, lane: L) -> Result<Self>
    where
        S: PixelSource,
        L: Lane,
    {
        config.validate()?;
        let channels = Driver::spawn(config, source, lane);
        info!(
            "Transmitter started (control {:?}, transmit {:?})",
            config.clocks.control, config.clocks.transmit
        );

        Ok(Self {
            status: channels.status,
            transmit: channels.transmit,
            commands: channels.commands,
            cancel: channels.cancel,
        })
    }

    /// Request a soft reset: flush the queue and return both engines to idle.
    pub fn soft_reset(&self) -> Result<()> {
        self.send(RegisterCommand::SoftReset)
    }

    /// Assert the control reset for one cycle.
    pub fn reset(&self) -> Result<()> {
        self.send(RegisterCommand::Reset)
    }

    /// Clear the sticky interrupt causes in `mask`.
    pub fn acknowledge(&self, mask: InterruptFlags) -> Result<()> {
        self.send(RegisterCommand::Acknowledge(mask))
    }

    /// Rewrite the runtime registers. Codes apply at the next frame boundary,
    /// timing the next time the drain engine is idle.
    pub fn write_registers(&self, registers: RuntimeRegisters) -> Result<()> {
        registers.validate()?;
        self.send(RegisterCommand::Write(registers))
    }

    /// Latest control-context status.
    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// Latest transmit-context status.
    pub fn transmit_status(&self) -> TransmitStatus {
        *self.transmit.borrow()
    }

    /// Status updates, optionally sampled once per `period` (latest wins).
    ///
    /// Emits the current status first. Ends when the control task stops.
    pub fn status_updates(&self, period: Option<Duration>) -> BoxStream<'static, Status> {
        let updates = WatchStream::new(self.status.clone());
        match period {
            None => updates.boxed(),
            Some(period) => updates.sample_every(period).boxed(),
        }
    }

    /// Wait until `predicate` holds for the control status.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Result<Status>
    where
        F: FnMut(&Status) -> bool,
    {
        let mut status = self.status.clone();
        let waited =
            tokio::time::timeout(timeout, async move { status.wait_for(predicate).await.map(|s| *s) })
                .await;

        match waited {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(_)) => Err(TransmitError::Disconnected),
            Err(_) => Err(TransmitError::Timeout { duration: timeout }),
        }
    }

    /// Wait for the fused idle status.
    pub async fn wait_until_idle(&self, timeout: Duration) -> Result<Status> {
        self.wait_for(|status| status.idle, timeout).await
    }

    /// True until the handle is shut down.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.commands.is_closed()
    }

    /// Stop both tasks.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn send(&self, command: RegisterCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| TransmitError::Disconnected)
    }
}

impl Drop for TransmitterHandle {
    fn drop(&mut self) {
        debug!("Dropping transmitter handle");
        self.cancel.cancel();
    }
}
