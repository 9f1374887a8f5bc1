//! Transmitter configuration.
//!
//! Every section deserializes with defaults, so a YAML file only needs the
//! fields it changes:
//!
//! ```rust
//! use lanetx::config::TransmitterConfig;
//!
//! let config = TransmitterConfig::from_yaml(
//!     r#"
//! timing:
//!   pre_delay: 2
//!   ready_timeout: 16
//! queue:
//!   capacity: 16
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.timing.pre_delay, 2);
//! assert_eq!(config.queue.capacity, 16);
//! assert_eq!(config.queue.almost_full_threshold, 2);
//! ```
//!
//! Only [`RuntimeRegisters`] (packet codes and timing) can change while the
//! transmitter runs; queue, synchronizer and clock settings are fixed at spawn.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::types::ClockRate;
use crate::{Result, TransmitError};

/// Codes placed in the packets built by the packet builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketCodes {
    /// 32-bit code of the frame-start short packet.
    pub frame_start: u32,
    /// 32-bit code of the frame-end short packet.
    pub frame_end: u32,
    /// 16-bit header code of every long packet.
    pub line_header: u16,
}

impl Default for PacketCodes {
    fn default() -> Self {
        Self { frame_start: 0x0000_0000, frame_end: 0x0000_0001, line_header: 0x002A }
    }
}

/// Cycle counts applied by the drain engine and the synchronization controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Transmit cycles held before the first unit of a burst.
    pub pre_delay: u32,
    /// Transmit cycles held after the last unit of a burst.
    pub post_delay: u32,
    /// Control cycles between the control reset clearing and the transmit reset releasing.
    pub clock_delay: u32,
    /// Idle transmit cycles inserted between successive units of one entry.
    #[serde(alias = "line_delay")]
    pub line_delay_reg: u32,
    /// Transmit cycles a unit may wait for `ready` before it is abandoned.
    pub ready_timeout: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { pre_delay: 4, post_delay: 4, clock_delay: 8, line_delay_reg: 0, ready_timeout: 64 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    /// `almost_full` asserts once occupancy reaches `capacity - almost_full_threshold`.
    pub almost_full_threshold: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 8, almost_full_threshold: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Register stages every crossing signal passes through.
    pub stages: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { stages: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub control: ClockRate,
    pub transmit: ClockRate,
}

/// Registers the front end may rewrite while the transmitter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeRegisters {
    pub codes: PacketCodes,
    pub timing: TimingConfig,
}

impl RuntimeRegisters {
    pub fn validate(&self) -> Result<()> {
        if self.timing.ready_timeout == 0 {
            return Err(TransmitError::invalid_config(
                "timing.ready_timeout",
                "must be at least one cycle",
            ));
        }
        Ok(())
    }
}

/// Complete transmitter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitterConfig {
    pub codes: PacketCodes,
    pub timing: TimingConfig,
    pub queue: QueueConfig,
    pub sync: SyncConfig,
    pub clocks: ClockConfig,
}

impl TransmitterConfig {
    /// Parse and validate a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        debug!("Parsed transmitter configuration: {:?}", config);
        Ok(config)
    }

    /// Read, parse and validate a YAML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| TransmitError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn registers(&self) -> RuntimeRegisters {
        RuntimeRegisters { codes: self.codes, timing: self.timing }
    }

    pub fn validate(&self) -> Result<()> {
        self.registers().validate()?;

        if self.queue.capacity < 2 {
            return Err(TransmitError::invalid_config("queue.capacity", "must be at least 2"));
        }
        if self.queue.almost_full_threshold == 0
            || self.queue.almost_full_threshold >= self.queue.capacity
        {
            return Err(TransmitError::invalid_config(
                "queue.almost_full_threshold",
                format!("must be in 1..{}", self.queue.capacity),
            ));
        }
        if self.sync.stages < 2 {
            return Err(TransmitError::invalid_config("sync.stages", "must be at least 2"));
        }
        if !self.clocks.control.is_valid() {
            return Err(TransmitError::invalid_config("clocks.control", "rate must be non-zero"));
        }
        if !self.clocks.transmit.is_valid() {
            return Err(TransmitError::invalid_config("clocks.transmit", "rate must be non-zero"));
        }
        Ok(())
    }
}
