//! Emergency stop signal
//!
//! A single atomic cause code shared by every context. Any context may
//! trigger it; the step scheduler polls it on every tick and the planner
//! checks it before accepting a move. Only an explicit `reset` clears it.

use portable_atomic::{AtomicU8, Ordering};

/// Why motion and heating were halted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StopCause {
    /// Requested by a collaborator (kill command, button)
    External = 1,
    /// Thermal protection fault on a heater channel
    Thermal = 2,
}

impl StopCause {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(StopCause::External),
            2 => Some(StopCause::Thermal),
            _ => None,
        }
    }
}

/// Global halt flag
///
/// The first cause wins; later triggers keep the original cause.
#[derive(Debug, Default)]
pub struct EmergencyStop {
    cause: AtomicU8,
}

impl EmergencyStop {
    /// Create a released stop signal
    pub const fn new() -> Self {
        Self {
            cause: AtomicU8::new(0),
        }
    }

    /// Assert the stop
    pub fn trigger(&self, cause: StopCause) {
        let first = self
            .cause
            .compare_exchange(0, cause as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            #[cfg(feature = "defmt")]
            defmt::error!("emergency stop: {}", cause);
        }
    }

    /// Check whether the stop is asserted
    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.cause.load(Ordering::Acquire) != 0
    }

    /// Cause of the active stop, if any
    pub fn cause(&self) -> Option<StopCause> {
        StopCause::from_code(self.cause.load(Ordering::Acquire))
    }

    /// Release the stop
    ///
    /// Callers must have cleared the underlying fault first.
    pub fn reset(&self) {
        self.cause.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_released() {
        let estop = EmergencyStop::new();
        assert!(!estop.is_triggered());
        assert_eq!(estop.cause(), None);
    }

    #[test]
    fn test_first_cause_wins() {
        let estop = EmergencyStop::new();
        estop.trigger(StopCause::Thermal);
        estop.trigger(StopCause::External);
        assert!(estop.is_triggered());
        assert_eq!(estop.cause(), Some(StopCause::Thermal));
    }

    #[test]
    fn test_reset_releases() {
        let estop = EmergencyStop::new();
        estop.trigger(StopCause::External);
        estop.reset();
        assert!(!estop.is_triggered());

        estop.trigger(StopCause::Thermal);
        assert_eq!(estop.cause(), Some(StopCause::Thermal));
    }
}
