//! Host link framing
//!
//! The command layer and the reporting collaborators sit on the host side
//! of UART0. Frames are a one byte payload length followed by a postcard
//! message: [`Command`] toward the board, [`Telemetry`] back.

use heapless::Vec;
use kinesis_core::config::PidGains;
use kinesis_core::motion::{AxisPosition, LineParams};
use kinesis_core::report::{ReportError, Telemetry, MAX_TELEMETRY_SIZE};
use kinesis_core::thermal::HeaterId;
use serde::{Deserialize, Serialize};

/// Largest accepted command payload
pub const MAX_COMMAND_SIZE: usize = 64;

/// Requests from the command layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Move {
        target: AxisPosition,
        params: LineParams,
    },
    Home {
        axes: u8,
    },
    SetTemperature {
        heater: HeaterId,
        celsius: f32,
    },
    SetGains {
        heater: HeaterId,
        gains: PidGains,
    },
    Autotune {
        heater: HeaterId,
        celsius: f32,
    },
    SetLeveling {
        enabled: bool,
    },
    SetFadeHeight {
        height: Option<f32>,
    },
    EditMeshPoint {
        ix: u8,
        iy: u8,
        z: f32,
    },
    SmartFillMesh,
    EmergencyStop,
    ResetFault,
}

/// Incremental frame parser
#[derive(Default)]
pub struct FrameDecoder {
    expected: Option<usize>,
    payload: Vec<u8, MAX_COMMAND_SIZE>,
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self {
            expected: None,
            payload: Vec::new(),
        }
    }

    /// Feed one byte; returns a command when a frame completes
    ///
    /// Oversized or undecodable frames are dropped whole.
    pub fn push(&mut self, byte: u8) -> Option<Command> {
        let Some(expected) = self.expected else {
            if byte as usize <= MAX_COMMAND_SIZE && byte > 0 {
                self.expected = Some(byte as usize);
                self.payload.clear();
            }
            return None;
        };

        // Capacity matches the largest accepted length
        let _ = self.payload.push(byte);
        if self.payload.len() < expected {
            return None;
        }
        self.expected = None;
        postcard::from_bytes(&self.payload).ok()
    }
}

/// Encode a telemetry frame into `buf`, returning the used part
pub fn encode_telemetry<'b>(
    telemetry: &Telemetry,
    buf: &'b mut [u8; MAX_TELEMETRY_SIZE + 1],
) -> Result<&'b [u8], ReportError> {
    let (len, payload) = buf.split_at_mut(1);
    let used = telemetry.encode(payload)?.len();
    len[0] = used as u8;
    Ok(&buf[..used + 1])
}
