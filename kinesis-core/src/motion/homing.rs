//! Homing state machine
//!
//! Drives each axis toward its endstop and establishes the origin. Every
//! homing pass is a single approach: one move long enough to cross the
//! whole axis, stopped by the scheduler when the watched endstop fires.
//! An axis whose endstop never fires is reported and stays unhomed.
//!
//! Cartesian and Core machines home X, Y, Z one after another in logical
//! space. Delta machines home all three towers together, each carriage
//! stopping on its own switch. SCARA machines home the two arm joints in
//! joint space, then Z.

use heapless::Vec;

use super::kinematics::{Kinematics, KinematicsError};
use super::planner::{BufferOutcome, Planner};
use super::position::{ActuatorPosition, Axis, AxisPosition, LINEAR_AXES, NUM_AXES};
use super::{MotionShared, MoveError};
use crate::config::{HomingConfig, KinematicsConfig, MachineConfig, TravelConfig};

/// Homing travel as a multiple of the axis length
const HOMING_TRAVEL_FACTOR: f32 = 1.5;

/// Joint rotation allowed while homing a SCARA arm (degrees)
const SCARA_HOMING_SWEEP: f32 = 360.0;

/// Homing failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingError {
    /// Full travel completed without the endstop firing
    EndstopNotTriggered(Axis),
    /// Emergency stop asserted during homing
    Halted,
    /// Motion was not idle when homing started
    Busy,
    /// Home position has no kinematic solution
    Unreachable,
}

impl From<KinematicsError> for HomingError {
    fn from(_: KinematicsError) -> Self {
        HomingError::Unreachable
    }
}

impl From<MoveError> for HomingError {
    fn from(err: MoveError) -> Self {
        match err {
            MoveError::Halted => HomingError::Halted,
            MoveError::Busy => HomingError::Busy,
            _ => HomingError::Unreachable,
        }
    }
}

/// Progress report from `poll`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingStatus {
    /// Still moving
    InProgress,
    /// Every requested axis homed
    Complete,
}

/// How the homed position is declared once a group hits its endstops
#[derive(Debug, Clone, Copy, PartialEq)]
enum Reference {
    /// Logical axis lands on its min or max position
    Logical(Axis, f32),
    /// Delta effector lands at the top center
    DeltaTop(f32),
    /// SCARA joint lands at its switch angle
    Joint(Axis, f32),
}

/// Axes moved together in one homing move
#[derive(Debug, Clone, Copy, PartialEq)]
struct HomingGroup {
    endstop_mask: u8,
    delta: ActuatorPosition,
    feedrate: f32,
    reference: Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Waiting for room to queue the move of group `index`
    Start,
    /// Move of group `index` is executing
    Moving,
}

/// Homing sequencer
#[derive(Debug)]
pub struct HomingMachine {
    kinematics: KinematicsConfig,
    travel: TravelConfig,
    homing: HomingConfig,
    plan: Vec<HomingGroup, LINEAR_AXES>,
    index: usize,
    phase: Phase,
    homed: u8,
}

impl HomingMachine {
    /// Create an idle sequencer; no axis is homed
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            kinematics: config.kinematics,
            travel: config.travel,
            homing: config.homing,
            plan: Vec::new(),
            index: 0,
            phase: Phase::Idle,
            homed: 0,
        }
    }

    /// Whether a homing sequence is running
    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Whether an axis has a known position
    pub fn is_homed(&self, axis: Axis) -> bool {
        self.homed & axis.bit() != 0
    }

    /// Bitmask of homed axes
    pub fn homed_mask(&self) -> u8 {
        self.homed
    }

    /// Begin homing the axes in `axes_mask` (bit per linear axis)
    ///
    /// Requested axes are marked unknown until their pass succeeds.
    pub fn start<const N: usize>(
        &mut self,
        planner: &Planner<'_, N>,
        axes_mask: u8,
    ) -> Result<(), HomingError> {
        if !planner.is_idle() {
            return Err(HomingError::Busy);
        }
        self.plan = self.build_plan(planner.kinematics(), axes_mask)?;
        self.homed &= !self.plan.iter().fold(0, |m, g| m | g.endstop_mask);
        self.index = 0;
        self.phase = if self.plan.is_empty() {
            Phase::Idle
        } else {
            Phase::Start
        };
        Ok(())
    }

    /// Abandon a running sequence
    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
        self.plan.clear();
    }

    /// Mark every axis unknown, e.g. after the drivers were disabled
    pub fn forget(&mut self) {
        self.cancel();
        self.homed = 0;
    }

    /// Advance the sequence; call from the main loop
    pub fn poll<const N: usize>(
        &mut self,
        planner: &mut Planner<'_, N>,
        shared: &MotionShared<N>,
    ) -> Result<HomingStatus, HomingError> {
        if self.phase == Phase::Idle {
            return Ok(HomingStatus::Complete);
        }
        if shared.estop.is_triggered() {
            self.cancel();
            return Err(HomingError::Halted);
        }
        let Some(group) = self.plan.get(self.index).copied() else {
            self.cancel();
            return Ok(HomingStatus::Complete);
        };

        match self.phase {
            Phase::Start => {
                match planner.buffer_homing_move(&group.delta, group.feedrate, group.endstop_mask) {
                    Ok(BufferOutcome::Queued) => self.phase = Phase::Moving,
                    Ok(_) => {}
                    Err(err) => {
                        self.cancel();
                        return Err(err.into());
                    }
                }
                Ok(HomingStatus::InProgress)
            }
            Phase::Moving => {
                if !shared.is_drained() {
                    return Ok(HomingStatus::InProgress);
                }
                let hits = shared.endstops.get().masked(group.endstop_mask);
                if hits != group.endstop_mask {
                    let missing = group.endstop_mask & !hits;
                    let axis = Axis::LINEAR
                        .iter()
                        .copied()
                        .find(|a| missing & a.bit() != 0)
                        .unwrap_or(Axis::X);
                    self.cancel();
                    // The full travel ran; the planner must follow the counters
                    planner.sync_position()?;
                    #[cfg(feature = "defmt")]
                    defmt::warn!("homing failed: {} endstop not triggered", axis);
                    return Err(HomingError::EndstopNotTriggered(axis));
                }

                if let Err(err) = self.apply_reference(planner, shared, &group) {
                    self.cancel();
                    return Err(err);
                }
                self.homed |= group.endstop_mask;
                self.index += 1;
                if self.index >= self.plan.len() {
                    self.cancel();
                    return Ok(HomingStatus::Complete);
                }
                self.phase = Phase::Start;
                Ok(HomingStatus::InProgress)
            }
            Phase::Idle => Ok(HomingStatus::Complete),
        }
    }

    /// Declare the position reached by a finished group
    fn apply_reference<const N: usize>(
        &self,
        planner: &mut Planner<'_, N>,
        shared: &MotionShared<N>,
        group: &HomingGroup,
    ) -> Result<(), HomingError> {
        match group.reference {
            Reference::Logical(axis, value) => {
                let mut position = planner.sync_position()?;
                position[axis] = value;
                planner.set_position(&position)?;
            }
            Reference::DeltaTop(z) => {
                let e = planner.position()[Axis::E];
                planner.set_position(&AxisPosition::new(0.0, 0.0, z, e))?;
            }
            Reference::Joint(axis, angle) => {
                let steps = planner.config().steps_per_unit;
                let mut actuator = ActuatorPosition::from_steps(&shared.position.get(), &steps);
                actuator[axis] = angle;
                planner.set_actuator_position(&actuator)?;
            }
        }
        Ok(())
    }

    /// Home position of a linear axis
    fn home_position(&self, axis: usize) -> f32 {
        if self.homing.home_dir[axis] < 0 {
            self.travel.min_pos[axis]
        } else {
            self.travel.max_pos[axis]
        }
    }

    fn build_plan(
        &self,
        kinematics: &Kinematics,
        axes_mask: u8,
    ) -> Result<Vec<HomingGroup, LINEAR_AXES>, HomingError> {
        let mut plan = Vec::new();
        match self.kinematics {
            KinematicsConfig::Delta(_) => {
                // Towers always home together
                let mut delta = ActuatorPosition::ZERO;
                for tower in 0..LINEAR_AXES {
                    delta.0[tower] = HOMING_TRAVEL_FACTOR
                        * self.travel.length(Axis::Z.index())
                        * self.homing.home_dir[tower] as f32;
                }
                let _ = plan.push(HomingGroup {
                    endstop_mask: Axis::X.bit() | Axis::Y.bit() | Axis::Z.bit(),
                    delta,
                    feedrate: self.homing.feedrate[Axis::Z.index()],
                    reference: Reference::DeltaTop(self.travel.max_pos[Axis::Z.index()]),
                });
            }
            KinematicsConfig::Scara(geometry) => {
                for axis in Axis::LINEAR {
                    if axes_mask & axis.bit() == 0 {
                        continue;
                    }
                    let i = axis.index();
                    let dir = self.homing.home_dir[i] as f32;
                    let mut delta = ActuatorPosition::ZERO;
                    let reference = if axis == Axis::Z {
                        delta.0[i] = HOMING_TRAVEL_FACTOR * self.travel.length(i) * dir;
                        Reference::Logical(axis, self.home_position(i))
                    } else {
                        delta.0[i] = SCARA_HOMING_SWEEP * dir;
                        Reference::Joint(axis, geometry.home_angles[i])
                    };
                    let _ = plan.push(HomingGroup {
                        endstop_mask: axis.bit(),
                        delta,
                        feedrate: self.homing.feedrate[i],
                        reference,
                    });
                }
            }
            _ => {
                let origin = kinematics.to_actuator(&AxisPosition::ZERO)?;
                for axis in Axis::LINEAR {
                    if axes_mask & axis.bit() == 0 {
                        continue;
                    }
                    let i = axis.index();
                    let mut logical = AxisPosition::ZERO;
                    logical.0[i] =
                        HOMING_TRAVEL_FACTOR * self.travel.length(i) * self.homing.home_dir[i] as f32;
                    let moved = kinematics.to_actuator(&logical)?;
                    let mut delta = ActuatorPosition::ZERO;
                    for a in 0..NUM_AXES {
                        delta.0[a] = moved.0[a] - origin.0[a];
                    }
                    let _ = plan.push(HomingGroup {
                        endstop_mask: axis.bit(),
                        delta,
                        feedrate: self.homing.feedrate[i],
                        reference: Reference::Logical(axis, self.home_position(i)),
                    });
                }
            }
        }
        Ok(plan)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeltaGeometry;
    use crate::motion::{EndstopState, LineParams, MoveKind};
    use crate::safety::StopCause;
    use crate::scheduler::{SchedulerTiming, StepScheduler};
    use crate::traits::{EndstopReader, StepperOutput};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Physical carriage positions in steps, switches at zero
    #[derive(Default)]
    struct Carriage {
        steps: [i32; NUM_AXES],
        forward_steps: [u32; NUM_AXES],
        triggers: [u32; NUM_AXES],
        last: u8,
    }

    struct Motors {
        body: Rc<RefCell<Carriage>>,
        dirs: u8,
        enabled: bool,
    }

    impl StepperOutput for Motors {
        fn set_directions(&mut self, negative_mask: u8) {
            self.dirs = negative_mask;
        }

        fn pulse(&mut self, axis_mask: u8) {
            let mut body = self.body.borrow_mut();
            for i in 0..NUM_AXES {
                if axis_mask & (1 << i) != 0 {
                    if self.dirs & (1 << i) != 0 {
                        body.steps[i] -= 1;
                    } else {
                        body.steps[i] += 1;
                        body.forward_steps[i] += 1;
                    }
                }
            }
        }

        fn enable(&mut self, enabled: bool) {
            self.enabled = enabled;
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    struct Switches {
        body: Rc<RefCell<Carriage>>,
    }

    impl EndstopReader for Switches {
        fn read(&mut self) -> EndstopState {
            let mut body = self.body.borrow_mut();
            let mut state = EndstopState::NONE;
            for axis in Axis::LINEAR {
                state.set(axis, body.steps[axis.index()] <= 0);
            }
            let rising = state.0 & !body.last;
            for i in 0..LINEAR_AXES {
                if rising & (1 << i) != 0 {
                    body.triggers[i] += 1;
                }
            }
            body.last = state.0;
            state
        }
    }

    fn rig(
        shared: &MotionShared<8>,
        start_steps: [i32; NUM_AXES],
    ) -> (StepScheduler<'_, Motors, Switches, 8>, Rc<RefCell<Carriage>>) {
        let body = Rc::new(RefCell::new(Carriage {
            steps: start_steps,
            ..Default::default()
        }));
        shared.position.set(&start_steps);
        let scheduler = StepScheduler::new(
            shared,
            Motors {
                body: body.clone(),
                dirs: 0,
                enabled: false,
            },
            Switches { body: body.clone() },
            SchedulerTiming::new(1_000_000, &Default::default()),
        );
        (scheduler, body)
    }

    fn run_homing(
        homing: &mut HomingMachine,
        planner: &mut Planner<'_, 8>,
        shared: &MotionShared<8>,
        scheduler: &mut StepScheduler<'_, Motors, Switches, 8>,
    ) -> Result<HomingStatus, HomingError> {
        for _ in 0..20_000 {
            if homing.poll(planner, shared)? == HomingStatus::Complete {
                return Ok(HomingStatus::Complete);
            }
            for _ in 0..100 {
                scheduler.tick();
            }
        }
        Ok(HomingStatus::InProgress)
    }

    #[test]
    fn test_cartesian_homes_to_origin() {
        let config = MachineConfig::default();
        let shared: MotionShared<8> = MotionShared::new();
        let kinematics = Kinematics::from_config(&config.kinematics);
        let mut planner = Planner::new(&shared, &config.motion, kinematics);
        // Carriage at (50, 60, 10) mm
        let (mut scheduler, body) = rig(&shared, [4000, 4800, 40_000, 0]);
        planner.sync_position().unwrap();

        let mut homing = HomingMachine::new(&config);
        homing.start(&planner, 0b111).unwrap();
        assert!(homing.is_active());

        let status = run_homing(&mut homing, &mut planner, &shared, &mut scheduler).unwrap();
        assert_eq!(status, HomingStatus::Complete);
        assert!(!homing.is_active());
        assert_eq!(homing.homed_mask(), 0b111);

        let body = body.borrow();
        assert_eq!(body.triggers[..LINEAR_AXES], [1, 1, 1]);
        assert_eq!(body.forward_steps, [0; NUM_AXES]);
        assert_eq!(body.steps[..LINEAR_AXES], [0, 0, 0]);
        assert!(planner.position().approx_eq(&AxisPosition::ZERO, 1e-4));
        assert_eq!(shared.position.get(), [0; NUM_AXES]);
    }

    #[test]
    fn test_home_offset_from_min_position() {
        let mut config = MachineConfig::default();
        config.travel.min_pos = [-5.0, -3.0, 0.0];
        let shared: MotionShared<8> = MotionShared::new();
        let kinematics = Kinematics::from_config(&config.kinematics);
        let mut planner = Planner::new(&shared, &config.motion, kinematics);
        let (mut scheduler, _body) = rig(&shared, [800, 800, 0, 0]);
        planner.sync_position().unwrap();

        let mut homing = HomingMachine::new(&config);
        homing.start(&planner, Axis::X.bit() | Axis::Y.bit()).unwrap();
        run_homing(&mut homing, &mut planner, &shared, &mut scheduler).unwrap();

        let position = planner.position();
        assert!((position[Axis::X] + 5.0).abs() < 1e-4);
        assert!((position[Axis::Y] + 3.0).abs() < 1e-4);
        assert!(homing.is_homed(Axis::X));
        assert!(!homing.is_homed(Axis::Z));
    }

    #[test]
    fn test_missing_endstop_reports_axis() {
        let mut config = MachineConfig::default();
        // Travel too short to reach the switch from 50 mm
        config.travel.max_pos[0] = 2.0;
        let shared: MotionShared<8> = MotionShared::new();
        let kinematics = Kinematics::from_config(&config.kinematics);
        let mut planner = Planner::new(&shared, &config.motion, kinematics);
        let (mut scheduler, body) = rig(&shared, [4000, 0, 0, 0]);
        planner.sync_position().unwrap();

        let mut homing = HomingMachine::new(&config);
        homing.start(&planner, Axis::X.bit()).unwrap();
        let result = run_homing(&mut homing, &mut planner, &shared, &mut scheduler);

        assert_eq!(result, Err(HomingError::EndstopNotTriggered(Axis::X)));
        assert!(!homing.is_homed(Axis::X));
        assert!(!homing.is_active());
        // Full 3 mm of travel ran, planner follows the counters
        assert_eq!(body.borrow().steps[0], 4000 - 240);
        assert!((planner.position()[Axis::X] - 47.0).abs() < 1e-3);
    }

    #[test]
    fn test_failed_homing_leaves_planner_synced() {
        let mut config = MachineConfig::default();
        config.kinematics = KinematicsConfig::CoreXY;
        config.travel.max_pos[0] = 2.0;
        let shared: MotionShared<8> = MotionShared::new();
        let kinematics = Kinematics::from_config(&config.kinematics);
        let mut planner = Planner::new(&shared, &config.motion, kinematics);
        let start = [4000, 4000, 0, 0];
        let (mut scheduler, _body) = rig(&shared, start);
        planner.sync_position().unwrap();
        let before = planner.position();

        let mut homing = HomingMachine::new(&config);
        homing.start(&planner, Axis::X.bit()).unwrap();
        let result = run_homing(&mut homing, &mut planner, &shared, &mut scheduler);
        assert_eq!(result, Err(HomingError::EndstopNotTriggered(Axis::X)));

        let counters = shared.position.get();
        assert_ne!(counters, start);
        let actuator = ActuatorPosition::from_steps(&counters, &config.motion.steps_per_unit);
        let expected = planner.kinematics().to_logical(&actuator).unwrap();
        assert!(planner.position().approx_eq(&expected, 1e-3));
        assert!(!planner.position().approx_eq(&before, 1e-3));
    }

    #[test]
    fn test_estop_aborts_homing() {
        let config = MachineConfig::default();
        let shared: MotionShared<8> = MotionShared::new();
        let kinematics = Kinematics::from_config(&config.kinematics);
        let mut planner = Planner::new(&shared, &config.motion, kinematics);

        let mut homing = HomingMachine::new(&config);
        homing.start(&planner, 0b111).unwrap();
        assert_eq!(homing.poll(&mut planner, &shared), Ok(HomingStatus::InProgress));

        shared.estop.trigger(StopCause::External);
        assert_eq!(homing.poll(&mut planner, &shared), Err(HomingError::Halted));
        assert!(!homing.is_active());
    }

    #[test]
    fn test_start_requires_idle_motion() {
        let config = MachineConfig::default();
        let shared: MotionShared<8> = MotionShared::new();
        let kinematics = Kinematics::from_config(&config.kinematics);
        let mut planner = Planner::new(&shared, &config.motion, kinematics);
        planner
            .buffer_line(
                &AxisPosition::new(10.0, 0.0, 0.0, 0.0),
                &LineParams::new(10.0, MoveKind::Travel),
            )
            .unwrap();

        let mut homing = HomingMachine::new(&config);
        assert_eq!(homing.start(&planner, 0b1), Err(HomingError::Busy));
    }

    #[test]
    fn test_delta_towers_home_together() {
        let mut config = MachineConfig::default();
        config.kinematics = KinematicsConfig::Delta(DeltaGeometry {
            diagonal_rod: 250.0,
            radius: 124.0,
            tower_angle_trim: [0.0; 3],
            printable_radius: 90.0,
        });
        config.homing.home_dir = [1, 1, 1];
        let shared: MotionShared<8> = MotionShared::new();
        let kinematics = Kinematics::from_config(&config.kinematics);
        let planner = Planner::new(&shared, &config.motion, kinematics);

        let homing = HomingMachine::new(&config);
        let plan = homing.build_plan(planner.kinematics(), Axis::X.bit()).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].endstop_mask, 0b111);
        assert!(plan[0].delta.0[..LINEAR_AXES].iter().all(|d| *d > 0.0));
    }
}
