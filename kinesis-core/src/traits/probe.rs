//! Bed probe trait

/// Errors a probe can report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProbeError {
    /// Probe did not trigger within its travel
    NoTrigger,
    /// Probe was already triggered before the move started
    AlreadyTriggered,
    /// Requested point is outside the probe's reach
    Unreachable,
    /// Motion was halted while probing
    Halted,
}

/// Z probe used by the leveling sequences
///
/// `measure` moves the probe over the bed at logical `(x, y)`, descends
/// until the probe triggers and returns the Z height of the bed surface
/// at that point relative to the nominal plane.
pub trait ZProbe {
    /// Measure bed height at one point
    fn measure(&mut self, x: f32, y: f32) -> Result<f32, ProbeError>;
}
