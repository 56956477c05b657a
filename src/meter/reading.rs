//! Telemetry samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MeterClient, MeterResult};

/// One complete sample from the meter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// Line voltage in volts
    pub voltage_v: f64,
    /// Line current in amperes
    pub current_a: f64,
    /// Active power in kilowatts
    pub power_kw: f64,
    /// Cumulative energy in kilowatt-hours
    pub energy_kwh: f64,
    /// Grid frequency in hertz
    pub frequency_hz: f64,
    /// Power factor, 0..=1
    pub power_factor: f64,
    /// Only present for detailed reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<Vec<PhaseReading>>,
}

/// Per-phase values of a detailed reading
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseReading {
    /// Phase label (L1, L2, L3)
    pub phase: String,
    /// Phase voltage in volts
    pub voltage_v: f64,
    /// Phase current in amperes
    pub current_a: f64,
    /// Phase active power in kilowatts
    pub power_kw: f64,
}

/// Which read the acquisition loop performs, chosen once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    #[default]
    Basic,
    Detailed,
}

impl ReadMode {
    pub fn from_detailed(detailed: bool) -> Self {
        if detailed {
            ReadMode::Detailed
        } else {
            ReadMode::Basic
        }
    }

    pub fn read(self, client: &dyn MeterClient) -> MeterResult<Reading> {
        match self {
            ReadMode::Basic => client.read_basic(),
            ReadMode::Detailed => client.read_detailed(),
        }
    }
}

impl std::fmt::Display for ReadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadMode::Basic => write!(f, "basic"),
            ReadMode::Detailed => write!(f, "detailed"),
        }
    }
}
