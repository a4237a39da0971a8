//! Endstop input trait

use crate::motion::EndstopState;

/// Source of raw endstop switch states
///
/// Implementations sample the switch inputs (with inversion already applied)
/// and return them as one bitmask, bit `i` for axis `i`.
pub trait EndstopReader {
    /// Read the current state of every endstop
    fn read(&mut self) -> EndstopState;
}
