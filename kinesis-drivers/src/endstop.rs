//! Mechanical and optical endstop switches

use kinesis_core::motion::{Axis, EndstopState, LINEAR_AXES};
use kinesis_core::traits::EndstopReader;
use kinesis_hal::{ActiveLevel, InputPin};

/// One switch per linear axis
pub struct SwitchEndstops<P> {
    pins: [P; LINEAR_AXES],
    levels: [ActiveLevel; LINEAR_AXES],
}

impl<P: InputPin> SwitchEndstops<P> {
    /// Switches that read high when triggered (normally-closed to ground)
    pub fn new(pins: [P; LINEAR_AXES]) -> Self {
        Self {
            pins,
            levels: [ActiveLevel::High; LINEAR_AXES],
        }
    }

    /// Set the triggered level of one switch
    pub fn with_level(mut self, axis: Axis, level: ActiveLevel) -> Self {
        if axis.is_linear() {
            self.levels[axis.index()] = level;
        }
        self
    }
}

impl<P: InputPin> EndstopReader for SwitchEndstops<P> {
    fn read(&mut self) -> EndstopState {
        let mut state = EndstopState::NONE;
        for axis in Axis::LINEAR {
            let i = axis.index();
            state.set(axis, self.levels[i].is_active(&self.pins[i]));
        }
        state
    }
}
