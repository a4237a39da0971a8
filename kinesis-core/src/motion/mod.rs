//! Motion planning
//!
//! Logical positions flow through the kinematic transform into the
//! trajectory planner, which resolves speed limits with look-ahead and
//! hands finished blocks to the step scheduler through the shared queue.

pub mod block;
pub mod endstops;
pub mod homing;
pub mod kinematics;
pub mod planner;
pub mod position;
pub mod queue;
pub mod segment;

pub use block::{MotionBlock, MIN_STEP_RATE};
pub use endstops::{EndstopLatch, EndstopState};
pub use homing::{HomingError, HomingMachine, HomingStatus};
pub use kinematics::{Kinematics, KinematicsError};
pub use planner::{BufferOutcome, LineParams, MoveKind, Planner, MIN_PLANNER_SPEED};
pub use position::{
    ActuatorPosition, Axis, AxisPosition, StepPosition, EXTRUDERS, LINEAR_AXES, NUM_AXES,
};
pub use queue::{PlannerQueue, QUEUE_DEPTH};
pub use segment::LineSegmenter;

use portable_atomic::{AtomicBool, Ordering};

use crate::safety::EmergencyStop;

/// Reasons a move request is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MoveError {
    /// Emergency stop is asserted
    Halted,
    /// Target outside the soft endstop bounds
    OutOfBounds(Axis),
    /// No kinematic solution for the target
    Unreachable,
    /// Extrusion requested below the minimum hotend temperature
    ColdExtrusion,
    /// Extruder delta above the per-move limit
    LengthyExtrusion,
    /// Move continues into an endstop that is already triggered
    EndstopTriggered(Axis),
    /// Another operation (homing, probing) owns the motion system
    Busy,
}

impl From<KinematicsError> for MoveError {
    fn from(_: KinematicsError) -> Self {
        MoveError::Unreachable
    }
}

/// State shared between the main context and the step interrupt
///
/// Lives in a `static` on the target; everything inside is either atomic
/// or guarded by a critical section.
pub struct MotionShared<const N: usize = QUEUE_DEPTH> {
    /// Committed blocks waiting for the scheduler
    pub queue: PlannerQueue<N>,
    /// Global halt signal
    pub estop: EmergencyStop,
    /// Actuator step counters
    pub position: StepPosition,
    /// Endstops hit during homing moves
    pub endstops: EndstopLatch,
    busy: AtomicBool,
}

impl<const N: usize> Default for MotionShared<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MotionShared<N> {
    /// Create the shared state
    pub const fn new() -> Self {
        Self {
            queue: PlannerQueue::new(),
            estop: EmergencyStop::new(),
            position: StepPosition::new(),
            endstops: EndstopLatch::new(),
            busy: AtomicBool::new(false),
        }
    }

    /// Whether the scheduler is executing a block
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::Release);
    }

    /// No queued blocks and nothing executing
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && !self.is_busy()
    }
}
