//! Telemetry snapshots for the reporting collaborators

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use heapless::Vec;

use crate::motion::AxisPosition;
use crate::safety::{ProtectionState, StopCause};
use crate::thermal::{HeaterChannel, HeaterId, MAX_HEATERS};

/// Upper bound of an encoded snapshot
pub const MAX_TELEMETRY_SIZE: usize = 96;

/// Telemetry encoding errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportError {
    Serialize,
    Deserialize,
}

/// State of one heater
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeaterReport {
    pub id: HeaterId,
    /// Measured temperature (°C)
    pub temperature: f32,
    /// Set-point (°C)
    pub target: f32,
    pub duty: u8,
    pub protection: ProtectionState,
}

impl HeaterReport {
    pub fn new(channel: &HeaterChannel, protection: ProtectionState) -> Self {
        Self {
            id: channel.id(),
            temperature: channel.temperature(),
            target: channel.target(),
            duty: channel.duty(),
            protection,
        }
    }
}

/// Live machine state
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Telemetry {
    /// Logical position derived from the executed steps
    pub position: AxisPosition,
    /// Blocks waiting for the step scheduler
    pub queue_len: u8,
    /// Bit per homed axis
    pub homed: u8,
    /// Bed-leveling correction active
    pub leveling: bool,
    /// Active emergency stop
    pub halted: Option<StopCause>,
    pub heaters: Vec<HeaterReport, MAX_HEATERS>,
}

impl Telemetry {
    /// Whether the emergency stop is asserted
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Report of one heater
    pub fn heater(&self, id: HeaterId) -> Option<&HeaterReport> {
        self.heaters.iter().find(|h| h.id == id)
    }

    /// Serialize into `buf`, returning the used part
    #[cfg(feature = "serde")]
    pub fn encode<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], ReportError> {
        postcard::to_slice(self, buf).map_err(|_| ReportError::Serialize)
    }

    /// Parse a snapshot produced by `encode`
    #[cfg(feature = "serde")]
    pub fn decode(bytes: &[u8]) -> Result<Self, ReportError> {
        postcard::from_bytes(bytes).map_err(|_| ReportError::Deserialize)
    }
}
