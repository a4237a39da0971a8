//! Operating state machine
//!
//! Which collaborator requests the core accepts is a function of the
//! current state. Transitions are explicit, finite and deterministic.

use super::events::Event;
use crate::safety::StopCause;

/// Operating states of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Nothing queued, ready for any request
    Idle,
    /// Moves queued or executing
    Moving,
    /// Homing sequence owns the planner
    Homing,
    /// Probing pass owns the planner
    Probing,
    /// Emergency stop asserted; outputs disabled
    Halted(StopCause),
}

impl State {
    /// Check if move requests are accepted
    pub fn accepts_moves(&self) -> bool {
        matches!(self, State::Idle | State::Moving)
    }

    /// Check if homing or probing may start
    pub fn accepts_sequences(&self) -> bool {
        matches!(self, State::Idle)
    }

    /// Check if heaters may be powered
    pub fn heater_allowed(&self) -> bool {
        !self.is_halted()
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, State::Halted(_))
    }

    /// Process an event and return the next state
    pub fn transition(self, event: Event) -> Self {
        use Event::*;
        use State::*;

        match (self, event) {
            // A halt wins from anywhere and keeps the first cause
            (Halted(cause), Halt(_)) => Halted(cause),
            (_, Halt(cause)) => Halted(cause),
            (Halted(_), Reset) => Idle,

            (Idle | Moving, MoveQueued) => Moving,
            (Moving, MotionDrained) => Idle,

            (Idle, HomeRequested) => Homing,
            (Homing, SequenceFinished | SequenceFailed) => Idle,

            (Idle, ProbeRequested) => Probing,
            (Probing, SequenceFinished | SequenceFailed) => Idle,

            // Default: stay in current state
            _ => self,
        }
    }
}
