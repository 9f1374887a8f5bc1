//! Pixel-stream to serial-lane transmitter.
//!
//! lanetx frames a stream of pixel events into short and long packets, moves
//! them from a control context to a transmit context through a bounded queue,
//! and serializes them onto a lane one byte-wide unit at a time under a
//! ready/request handshake.
//!
//! # Features
//!
//! - **Packetizing**: frame markers become short packets, lines become long
//!   packets with a header, payload words and a CRC-16 footer
//! - **Back-pressure**: the builder deasserts `accept` before the queue fills
//! - **Two contexts**: control and transmit run as independent tokio tasks or
//!   in a deterministic lockstep [`Simulation`]
//! - **Reset sequencing**: full reset and soft reset with staged crossings
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lanetx::{ChannelLane, PixelEvent, ReadyPattern, ScriptedSource, Transmitter, TransmitterConfig};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> lanetx::Result<()> {
//!     let source = ScriptedSource::new([
//!         PixelEvent::frame_start(),
//!         PixelEvent::first_pixel(0x11),
//!         PixelEvent::last_pixel(0x22),
//!         PixelEvent::frame_end(),
//!     ]);
//!     let (lane, mut units) = ChannelLane::new(ReadyPattern::Always);
//!
//!     let transmitter = Transmitter::spawn(&TransmitterConfig::default(), source, lane)?;
//!     transmitter.wait_until_idle(Duration::from_secs(1)).await?;
//!
//!     while let Ok(unit) = units.try_recv() {
//!         println!("{unit:#04x}");
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Engines
pub mod builder;
pub mod drain;
pub mod queue;
pub mod sync;

// Execution contexts and runtime
pub mod context;
pub mod driver;
pub mod handle;
pub mod lane;
pub mod sim;
pub mod source;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

pub use builder::{BuilderState, PacketBuilder};
pub use config::{
    ClockConfig, PacketCodes, QueueConfig, RuntimeRegisters, SyncConfig, TimingConfig,
    TransmitterConfig,
};
pub use context::{RegisterCommand, Status, TransmitStatus};
pub use drain::{DrainEngine, DrainState, LaneCycle};
pub use handle::TransmitterHandle;
pub use lane::{ChannelLane, Lane, ReadyPattern};
pub use sim::Simulation;
pub use source::{ChannelSource, PixelSource, ScriptedSource};
pub use sync::SyncState;

/// Unified entry point for running a transmitter.
pub struct Transmitter;

impl Transmitter {
    /// Spawn the control and transmit tasks on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn spawn<S, L>(config: &TransmitterConfig, source: S, lane: L) -> Result<TransmitterHandle>
    where
        S: PixelSource,
        L: Lane,
    {
        TransmitterHandle::spawn(config, source, lane)
    }

    /// Build a lockstep simulation of both contexts.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn simulate(config: &TransmitterConfig) -> Result<Simulation> {
        config.validate()?;
        Ok(Simulation::new(config))
    }
}
