//! Step/direction actuator output trait
//!
//! The step scheduler talks to the motors through this trait only. All axes
//! that step in the same scheduler tick are passed as one mask so the
//! implementation can raise their STEP lines together.

use crate::motion::NUM_AXES;

/// Electrical timing contract for a step/dir driver
///
/// Times are in nanoseconds, matching the driver datasheet figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PulseTiming {
    /// Minimum STEP high time
    pub pulse_width_ns: u32,
    /// Minimum time between a DIR change and the next STEP edge
    pub dir_setup_ns: u32,
    /// Logic level that enables the driver
    pub enable_active_high: bool,
}

impl Default for PulseTiming {
    fn default() -> Self {
        // A4988 class drivers
        Self {
            pulse_width_ns: 2_000,
            dir_setup_ns: 1_000,
            enable_active_high: false,
        }
    }
}

/// Multi-axis step/direction output
pub trait StepperOutput {
    /// Drive the DIR lines
    ///
    /// Bit `i` set in `negative_mask` means axis `i` moves toward decreasing
    /// coordinates. Called before the first step of every block; the
    /// scheduler leaves at least `dir_setup_ns` before the next `pulse`.
    fn set_directions(&mut self, negative_mask: u8);

    /// Emit one step on every axis whose bit is set in `axis_mask`
    ///
    /// The STEP lines must stay active for at least `pulse_width_ns`.
    fn pulse(&mut self, axis_mask: u8);

    /// Enable or disable the drivers on every axis
    fn enable(&mut self, enabled: bool);

    /// Check whether drivers are enabled
    fn is_enabled(&self) -> bool;
}

/// Mask with every planned axis set
pub const ALL_AXES_MASK: u8 = (1 << NUM_AXES) - 1;
