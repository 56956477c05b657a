//! Power meter access
//!
//! The device is reached through the [`MeterClient`] capability. Calls are
//! blocking; async callers move them onto the blocking pool.

pub mod acquisition;
pub mod frame;
pub mod reading;
pub mod simulated;

use std::sync::Arc;

use thiserror::Error;

use crate::config::MeterConfig;

pub use acquisition::{AcquisitionLoop, AcquisitionStats};
pub use reading::{PhaseReading, ReadMode, Reading};
pub use simulated::SimulatedMeter;

/// Largest register block a single read may request
pub const MAX_REGISTERS_PER_READ: u16 = 125;

/// First holding register in 4xxxx numbering
pub const HOLDING_REGISTER_BASE: u32 = 40001;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeterError {
    #[error("No response received")]
    NoResponse,

    #[error("Timed out waiting for the meter")]
    Timeout,

    #[error("Invalid register {0}")]
    InvalidRegister(u32),

    #[error("Device exception {0:#04x}")]
    Exception(u8),

    #[error("Malformed frame: {0}")]
    Frame(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Meter unavailable: {0}")]
    Unavailable(String),
}

pub type MeterResult<T> = std::result::Result<T, MeterError>;

/// Operations the device exposes to this service
pub trait MeterClient: Send + Sync {
    /// Read the basic measurement set
    fn read_basic(&self) -> MeterResult<Reading>;

    /// Read the measurement set including per-phase values
    fn read_detailed(&self) -> MeterResult<Reading> {
        self.read_basic()
    }

    /// Read one holding register. Accepts 4xxxx numbering or a raw address.
    fn read_register(&self, register: u32) -> MeterResult<u16>;

    /// Read `count` consecutive holding registers starting at `start`
    fn read_registers(&self, start: u32, count: u16) -> MeterResult<Vec<u16>>;

    /// Send a raw frame and return the raw reply
    fn send_raw_command(&self, command: &[u8]) -> MeterResult<Vec<u8>>;

    fn test_connection(&self) -> bool {
        self.read_basic().is_ok()
    }
}

/// Map a register number to its protocol address (`40001` => `0`).
/// Numbers below the 4xxxx range are already addresses.
pub fn register_address(register: u32) -> u32 {
    if register >= HOLDING_REGISTER_BASE {
        register - HOLDING_REGISTER_BASE
    } else {
        register
    }
}

/// Open the meter described by the config
pub fn connect(config: &MeterConfig) -> Arc<dyn MeterClient> {
    tracing::info!(
        "Using simulated meter at device address {}",
        config.device_address
    );
    Arc::new(SimulatedMeter::new(config.device_address))
}
