//! Events that trigger state transitions

use crate::safety::StopCause;

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    // Collaborator requests
    /// A move was accepted into the planner
    MoveQueued,
    /// Homing requested
    HomeRequested,
    /// Mesh or plane probing requested
    ProbeRequested,
    /// Operator acknowledged a halt
    Reset,

    // Motion pipeline events
    /// Queue empty and scheduler idle
    MotionDrained,
    /// Homing or probing completed
    SequenceFinished,
    /// Homing or probing aborted
    SequenceFailed,

    // Safety events
    /// Emergency stop observed
    Halt(StopCause),
}

impl Event {
    /// Check if this event comes from a collaborator request
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Event::MoveQueued | Event::HomeRequested | Event::ProbeRequested | Event::Reset
        )
    }

    /// Check if this event indicates a halt
    pub fn is_halt(&self) -> bool {
        matches!(self, Event::Halt(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_events() {
        assert!(Event::HomeRequested.is_request());
        assert!(Event::Reset.is_request());
        assert!(!Event::MotionDrained.is_request());
        assert!(!Event::Halt(StopCause::External).is_request());
    }

    #[test]
    fn test_halt_events() {
        assert!(Event::Halt(StopCause::Thermal).is_halt());
        assert!(!Event::SequenceFailed.is_halt());
    }
}
