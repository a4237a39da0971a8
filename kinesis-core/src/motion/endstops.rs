//! Endstop state
//!
//! Endstops are reported as one bit per axis. During homing the step
//! scheduler records which watched switches fired in an `EndstopLatch`
//! that the homing state machine reads back from the main context.

use portable_atomic::{AtomicU8, Ordering};

use super::position::Axis;

/// Bitmask of triggered endstops, bit `i` for axis `i`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndstopState(pub u8);

impl EndstopState {
    /// Nothing triggered
    pub const NONE: Self = Self(0);

    /// Check a single axis
    pub fn is_triggered(&self, axis: Axis) -> bool {
        self.0 & axis.bit() != 0
    }

    /// Set or clear a single axis
    pub fn set(&mut self, axis: Axis, triggered: bool) {
        if triggered {
            self.0 |= axis.bit();
        } else {
            self.0 &= !axis.bit();
        }
    }

    /// Bits that are triggered and also in `mask`
    pub fn masked(&self, mask: u8) -> u8 {
        self.0 & mask
    }
}

/// Endstop hits latched by the step scheduler
#[derive(Debug, Default)]
pub struct EndstopLatch {
    hits: AtomicU8,
}

impl EndstopLatch {
    /// Create an empty latch
    pub const fn new() -> Self {
        Self {
            hits: AtomicU8::new(0),
        }
    }

    /// Record hits (interrupt context)
    pub fn record(&self, bits: u8) {
        self.hits.fetch_or(bits, Ordering::AcqRel);
    }

    /// Latched hits
    pub fn get(&self) -> EndstopState {
        EndstopState(self.hits.load(Ordering::Acquire))
    }

    /// Clear latched hits for `mask` before a new homing move
    pub fn clear(&self, mask: u8) {
        self.hits.fetch_and(!mask, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_bits() {
        let mut state = EndstopState::NONE;
        state.set(Axis::Y, true);
        assert!(state.is_triggered(Axis::Y));
        assert!(!state.is_triggered(Axis::X));
        assert_eq!(state.masked(Axis::X.bit() | Axis::Y.bit()), Axis::Y.bit());

        state.set(Axis::Y, false);
        assert_eq!(state, EndstopState::NONE);
    }

    #[test]
    fn test_latch_accumulates_and_clears() {
        let latch = EndstopLatch::new();
        latch.record(Axis::X.bit());
        latch.record(Axis::Z.bit());
        assert!(latch.get().is_triggered(Axis::X));
        assert!(latch.get().is_triggered(Axis::Z));

        latch.clear(Axis::X.bit());
        assert!(!latch.get().is_triggered(Axis::X));
        assert!(latch.get().is_triggered(Axis::Z));
    }
}
