//! Trajectory planner with junction look-ahead
//!
//! Each move becomes a `MotionBlock` whose cruise speed and acceleration
//! respect every actuator's limits. New blocks enter a small look-ahead
//! window where entry speeds are re-planned with a reverse pass
//! (deceleration limits) and a forward pass (acceleration limits). Blocks
//! leave the window oldest first into the shared queue, at which point
//! their trapezoid is fixed and the next window block's entry speed is
//! pinned to the committed exit speed.

use heapless::Vec;
use libm::sqrtf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::block::MotionBlock;
use super::kinematics::Kinematics;
use super::position::{ActuatorPosition, AxisPosition, LINEAR_AXES, NUM_AXES};
use super::{MotionShared, MoveError, QUEUE_DEPTH};
use crate::config::{CorneringModel, MotionConfig};

/// Speed every planned move can stop from instantly (mm/s)
pub const MIN_PLANNER_SPEED: f32 = 0.05;

/// Blocks kept open for re-planning
pub const LOOKAHEAD_DEPTH: usize = 8;

/// Queue depth below which `service` commits planned blocks
const QUEUE_LOW_WATER: usize = 2;

/// Move class, selects the default acceleration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MoveKind {
    /// Extruding move
    #[default]
    Print,
    /// Non-extruding move
    Travel,
    /// Extruder-only move
    Retract,
}

/// Per-move request parameters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LineParams {
    /// Requested path speed (mm/s)
    pub feedrate: f32,
    /// Requested acceleration (mm/s²), capped to the axis limits
    pub acceleration: Option<f32>,
    /// Move class
    pub kind: MoveKind,
}

impl LineParams {
    /// Parameters with the default acceleration of `kind`
    pub fn new(feedrate: f32, kind: MoveKind) -> Self {
        Self {
            feedrate,
            acceleration: None,
            kind,
        }
    }
}

/// Result of offering a move to the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferOutcome {
    /// Block planned
    Queued,
    /// No step on any actuator, nothing planned
    Discarded,
    /// No room; the request was not consumed and must be retried
    Stalled,
}

/// Block in the look-ahead window
#[derive(Debug, Clone, Copy)]
struct PlannedBlock {
    block: MotionBlock,
    max_entry_speed: f32,
    entry_speed: f32,
    /// Cruise speed is reachable from rest within the block
    nominal_length: bool,
    /// Entry fixed by a committed predecessor
    pinned: bool,
}

/// Junction reference taken from the previous block
#[derive(Debug, Clone, Copy)]
struct Junction {
    /// Per-actuator speed at nominal (units/s)
    speed: [f32; NUM_AXES],
    /// Path unit vector
    unit: [f32; NUM_AXES],
    nominal_speed: f32,
    safe_speed: f32,
    acceleration: f32,
}

/// Trajectory planner
pub struct Planner<'a, const N: usize = QUEUE_DEPTH> {
    shared: &'a MotionShared<N>,
    config: MotionConfig,
    kinematics: Kinematics,
    window: Vec<PlannedBlock, LOOKAHEAD_DEPTH>,
    position: AxisPosition,
    position_steps: [i32; NUM_AXES],
    previous: Option<Junction>,
}

impl<'a, const N: usize> Planner<'a, N> {
    /// Create a planner at the logical origin
    pub fn new(shared: &'a MotionShared<N>, config: &MotionConfig, kinematics: Kinematics) -> Self {
        Self {
            shared,
            config: *config,
            kinematics,
            window: Vec::new(),
            position: AxisPosition::ZERO,
            position_steps: [0; NUM_AXES],
            previous: None,
        }
    }

    /// Logical position at the end of the last planned move
    pub fn position(&self) -> AxisPosition {
        self.position
    }

    /// Kinematic transform in use
    pub fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    /// Motion configuration in use
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Blocks still open for re-planning
    pub fn pending(&self) -> usize {
        self.window.len()
    }

    /// Nothing planned, queued or executing
    pub fn is_idle(&self) -> bool {
        self.window.is_empty() && self.shared.is_drained()
    }

    /// Plan a straight move to `target` (logical coordinates)
    pub fn buffer_line(
        &mut self,
        target: &AxisPosition,
        params: &LineParams,
    ) -> Result<BufferOutcome, MoveError> {
        if self.shared.estop.is_triggered() {
            return Err(MoveError::Halted);
        }

        let actuator = self.kinematics.to_actuator(target)?;
        let target_steps = actuator.to_steps(&self.config.steps_per_unit);

        let mut steps = [0u32; NUM_AXES];
        let mut direction_bits = 0u8;
        let mut actuator_delta = [0.0f32; NUM_AXES];
        for i in 0..NUM_AXES {
            let d = target_steps[i] - self.position_steps[i];
            steps[i] = d.unsigned_abs();
            if d < 0 {
                direction_bits |= 1 << i;
            }
            actuator_delta[i] = d as f32 / self.config.steps_per_unit[i];
        }
        if steps.iter().all(|s| *s == 0) {
            return Ok(BufferOutcome::Discarded);
        }

        if self.window.is_full() {
            if self.shared.queue.is_full() {
                return Ok(BufferOutcome::Stalled);
            }
            self.commit_oldest();
        }

        let logical_delta = target.delta(&self.position);
        let xyz_sq: f32 = logical_delta[..LINEAR_AXES].iter().map(|d| d * d).sum();
        let (millimeters, unit) = if xyz_sq > 1e-8 {
            let mm = sqrtf(xyz_sq);
            let mut unit = [0.0; NUM_AXES];
            for i in 0..LINEAR_AXES {
                unit[i] = logical_delta[i] / mm;
            }
            (mm, unit)
        } else {
            let mm = logical_delta[NUM_AXES - 1].abs().max(actuator_delta[NUM_AXES - 1].abs());
            let mut unit = [0.0; NUM_AXES];
            unit[NUM_AXES - 1] = if logical_delta[NUM_AXES - 1] < 0.0 { -1.0 } else { 1.0 };
            (mm, unit)
        };
        if !(millimeters > 0.0) {
            return Ok(BufferOutcome::Discarded);
        }

        let mut block = MotionBlock::new(steps, direction_bits, millimeters);
        block.s_curve = self.config.s_curve;

        let (nominal_speed, speed) = self.nominal_speed(params, &actuator_delta, millimeters, &steps);
        let acceleration = self.acceleration(params, &actuator_delta, millimeters);
        block.set_nominal(nominal_speed, acceleration);

        let junction = Junction {
            speed,
            unit,
            nominal_speed,
            safe_speed: self.safe_speed(&speed, nominal_speed),
            acceleration,
        };

        // Junction only exists when the previous block is still planned
        let vmax_junction = match (self.window.last(), self.previous) {
            (Some(_), Some(prev)) => self.junction_speed(&prev, &junction),
            _ => self.rest_speed(&junction),
        };

        let v_allowable = max_allowable_speed(acceleration, MIN_PLANNER_SPEED, millimeters);
        let entry_speed = vmax_junction.min(v_allowable);
        let planned = PlannedBlock {
            block,
            max_entry_speed: vmax_junction,
            entry_speed,
            nominal_length: nominal_speed <= v_allowable,
            pinned: false,
        };
        if self.window.push(planned).is_err() {
            return Ok(BufferOutcome::Stalled);
        }

        self.previous = Some(junction);
        self.position = *target;
        self.position_steps = target_steps;
        self.recalculate();

        Ok(BufferOutcome::Queued)
    }

    /// Plan a homing move of `delta` actuator units watching `endstop_mask`
    ///
    /// The look-ahead window must be flushed first; homing moves start and
    /// end at rest. Position tracking for the moved actuators is invalid
    /// until `set_position` or `sync_position` is called.
    pub fn buffer_homing_move(
        &mut self,
        delta: &ActuatorPosition,
        feedrate: f32,
        endstop_mask: u8,
    ) -> Result<BufferOutcome, MoveError> {
        if self.shared.estop.is_triggered() {
            return Err(MoveError::Halted);
        }
        if !self.flush() || self.shared.queue.is_full() {
            return Ok(BufferOutcome::Stalled);
        }

        let mut steps = [0u32; NUM_AXES];
        let mut direction_bits = 0u8;
        let mut sq = 0.0f32;
        let mut actuator_delta = [0.0f32; NUM_AXES];
        for i in 0..NUM_AXES {
            let s = libm::roundf(delta.0[i] * self.config.steps_per_unit[i]) as i32;
            steps[i] = s.unsigned_abs();
            if s < 0 {
                direction_bits |= 1 << i;
            }
            actuator_delta[i] = delta.0[i];
            sq += delta.0[i] * delta.0[i];
        }
        if steps.iter().all(|s| *s == 0) {
            return Ok(BufferOutcome::Discarded);
        }

        let millimeters = sqrtf(sq);
        let mut block = MotionBlock::new(steps, direction_bits, millimeters);
        block.endstop_mask = endstop_mask;
        let params = LineParams::new(feedrate, MoveKind::Travel);
        let (nominal_speed, _) = self.nominal_speed(&params, &actuator_delta, millimeters, &steps);
        let acceleration = self.acceleration(&params, &actuator_delta, millimeters);
        block.set_nominal(nominal_speed, acceleration);
        block.calculate_trapezoid(0.0, 0.0);

        self.shared.endstops.clear(endstop_mask);
        if self.shared.queue.push(block).is_err() {
            return Ok(BufferOutcome::Stalled);
        }
        self.previous = None;
        for i in 0..NUM_AXES {
            let s = steps[i] as i32;
            self.position_steps[i] += if direction_bits & (1 << i) != 0 { -s } else { s };
        }
        Ok(BufferOutcome::Queued)
    }

    /// Commit planned blocks when the scheduler is running low
    ///
    /// The newest block stays open while the queue still holds work, so it
    /// can keep its junction with a move that has not arrived yet. Call
    /// this from the main loop after feeding moves.
    pub fn service(&mut self) {
        while !self.window.is_empty() && self.shared.queue.len() < QUEUE_LOW_WATER {
            if self.window.len() == 1 && !self.shared.queue.is_empty() {
                break;
            }
            if !self.commit_oldest() {
                break;
            }
        }
    }

    /// Commit every planned block; the last one decelerates to rest
    ///
    /// Returns false when the queue filled up before the window emptied.
    pub fn flush(&mut self) -> bool {
        while !self.window.is_empty() {
            if !self.commit_oldest() {
                return false;
            }
        }
        true
    }

    /// Drop all planned and queued motion (emergency stop path)
    pub fn abort(&mut self) {
        self.window.clear();
        self.shared.queue.clear();
        self.previous = None;
    }

    /// Declare the current logical position
    ///
    /// Only valid while motion is drained; updates the shared step counters.
    pub fn set_position(&mut self, position: &AxisPosition) -> Result<(), MoveError> {
        if !self.is_idle() {
            return Err(MoveError::Busy);
        }
        let actuator = self.kinematics.to_actuator(position)?;
        self.position_steps = actuator.to_steps(&self.config.steps_per_unit);
        self.shared.position.set(&self.position_steps);
        self.position = *position;
        self.previous = None;
        Ok(())
    }

    /// Declare the current actuator position (joint-space homing)
    pub fn set_actuator_position(&mut self, actuator: &ActuatorPosition) -> Result<(), MoveError> {
        if !self.is_idle() {
            return Err(MoveError::Busy);
        }
        let logical = self.kinematics.to_logical(actuator)?;
        self.position_steps = actuator.to_steps(&self.config.steps_per_unit);
        self.shared.position.set(&self.position_steps);
        self.position = logical;
        self.previous = None;
        Ok(())
    }

    /// Re-derive the planner position from the executed step counters
    ///
    /// Used after a homing move stopped early or motion was aborted.
    pub fn sync_position(&mut self) -> Result<AxisPosition, MoveError> {
        if !self.window.is_empty() || !self.shared.is_drained() {
            return Err(MoveError::Busy);
        }
        self.position_steps = self.shared.position.get();
        let actuator =
            ActuatorPosition::from_steps(&self.position_steps, &self.config.steps_per_unit);
        self.position = self.kinematics.to_logical(&actuator)?;
        self.previous = None;
        Ok(self.position)
    }

    /// Nominal speed after per-actuator feedrate caps, and per-actuator speeds
    fn nominal_speed(
        &self,
        params: &LineParams,
        actuator_delta: &[f32; NUM_AXES],
        millimeters: f32,
        steps: &[u32; NUM_AXES],
    ) -> (f32, [f32; NUM_AXES]) {
        let extruding = steps[NUM_AXES - 1] != 0;
        let floor = if extruding {
            self.config.min_feedrate
        } else {
            self.config.min_travel_feedrate
        };
        let feedrate = params.feedrate.max(floor).max(MIN_PLANNER_SPEED);
        let inverse_secs = feedrate / millimeters;

        let mut speed = [0.0f32; NUM_AXES];
        let mut factor = 1.0f32;
        for i in 0..NUM_AXES {
            speed[i] = actuator_delta[i] * inverse_secs;
            let cs = speed[i].abs();
            if cs > self.config.max_feedrate[i] {
                factor = factor.min(self.config.max_feedrate[i] / cs);
            }
        }
        if factor < 1.0 {
            for s in speed.iter_mut() {
                *s *= factor;
            }
        }
        (feedrate * factor, speed)
    }

    /// Requested (or default) acceleration capped per actuator
    fn acceleration(&self, params: &LineParams, actuator_delta: &[f32; NUM_AXES], millimeters: f32) -> f32 {
        let defaults = &self.config.acceleration;
        let mut accel = params.acceleration.unwrap_or(match params.kind {
            MoveKind::Print => defaults.print,
            MoveKind::Travel => defaults.travel,
            MoveKind::Retract => defaults.retract,
        });
        for i in 0..NUM_AXES {
            let d = actuator_delta[i].abs();
            if d > 0.0 {
                accel = accel.min(self.config.max_acceleration[i] * millimeters / d);
            }
        }
        accel
    }

    /// Speed the block may start at from a full stop
    fn rest_speed(&self, junction: &Junction) -> f32 {
        match self.config.cornering {
            CorneringModel::ClassicJerk { .. } => junction.safe_speed,
            CorneringModel::JunctionDeviation { .. } => 0.0,
        }
    }

    /// Largest speed that can be started or stopped without exceeding jerk
    fn safe_speed(&self, speed: &[f32; NUM_AXES], nominal_speed: f32) -> f32 {
        let CorneringModel::ClassicJerk { jerk } = self.config.cornering else {
            return 0.0;
        };
        let mut safe = nominal_speed;
        let mut limited = false;
        for i in 0..NUM_AXES {
            let axis_speed = speed[i].abs();
            let max_jerk = jerk[i];
            if axis_speed > max_jerk {
                if limited {
                    let mjerk = max_jerk * nominal_speed;
                    if axis_speed * safe > mjerk {
                        safe = mjerk / axis_speed;
                    }
                } else {
                    limited = true;
                    safe = max_jerk;
                }
            }
        }
        safe
    }

    /// Maximum speed through the junction between `prev` and `cur`
    fn junction_speed(&self, prev: &Junction, cur: &Junction) -> f32 {
        if prev.nominal_speed <= 0.0 {
            return self.rest_speed(cur);
        }
        match self.config.cornering {
            CorneringModel::ClassicJerk { jerk } => {
                let mut vmax = cur.nominal_speed.min(prev.nominal_speed);
                let smaller_speed_factor = vmax / prev.nominal_speed;
                let mut v_factor = 1.0f32;
                let mut limited = false;
                for i in 0..NUM_AXES {
                    let mut v_exit = prev.speed[i] * smaller_speed_factor;
                    let mut v_entry = cur.speed[i];
                    if limited {
                        v_exit *= v_factor;
                        v_entry *= v_factor;
                    }
                    let axis_jerk = if v_exit > v_entry {
                        if v_entry > 0.0 || v_exit < 0.0 {
                            v_exit - v_entry
                        } else {
                            v_exit.max(-v_entry)
                        }
                    } else if v_entry < 0.0 || v_exit > 0.0 {
                        v_entry - v_exit
                    } else {
                        (-v_exit).max(v_entry)
                    };
                    if axis_jerk > jerk[i] {
                        v_factor *= jerk[i] / axis_jerk;
                        limited = true;
                    }
                }
                if limited {
                    vmax *= v_factor;
                }
                // Not coasting: both moves start and stop anyway
                let threshold = vmax * 0.99;
                if prev.safe_speed > threshold && cur.safe_speed > threshold {
                    vmax = cur.safe_speed;
                }
                vmax
            }
            CorneringModel::JunctionDeviation { deviation_mm } => {
                let cos_theta: f32 = -prev
                    .unit
                    .iter()
                    .zip(cur.unit.iter())
                    .map(|(a, b)| a * b)
                    .sum::<f32>();
                let vmax = if cos_theta > 0.999_999 {
                    // Full reversal
                    MIN_PLANNER_SPEED
                } else {
                    let cos_theta = cos_theta.max(-0.999_999);
                    let sin_theta_d2 = sqrtf(0.5 * (1.0 - cos_theta));
                    sqrtf(cur.acceleration * deviation_mm * sin_theta_d2 / (1.0 - sin_theta_d2))
                };
                vmax.min(cur.nominal_speed).min(prev.nominal_speed)
            }
        }
    }

    /// Reverse then forward pass over the window
    fn recalculate(&mut self) {
        let blocks = self.window.as_mut_slice();
        let len = blocks.len();
        if len < 2 {
            return;
        }

        // Reverse pass: every block must be able to slow down for its successor
        for i in (0..len - 1).rev() {
            let next_entry = blocks[i + 1].entry_speed;
            let current = &mut blocks[i];
            if current.pinned {
                continue;
            }
            current.entry_speed = if current.nominal_length || current.max_entry_speed <= next_entry {
                current.max_entry_speed
            } else {
                current.max_entry_speed.min(max_allowable_speed(
                    current.block.acceleration,
                    next_entry,
                    current.block.millimeters,
                ))
            };
        }

        // Forward pass: cap entries the previous block cannot accelerate to
        for i in 1..len {
            let prev = blocks[i - 1];
            let current = &mut blocks[i];
            if current.pinned || prev.nominal_length || prev.entry_speed >= current.entry_speed {
                continue;
            }
            current.entry_speed = current.entry_speed.min(max_allowable_speed(
                prev.block.acceleration,
                prev.entry_speed,
                prev.block.millimeters,
            ));
        }
    }

    /// Move the oldest planned block into the queue
    fn commit_oldest(&mut self) -> bool {
        if self.window.is_empty() || self.shared.queue.is_full() {
            return false;
        }
        let mut planned = self.window.remove(0);
        let exit_speed = self
            .window
            .first()
            .map_or(MIN_PLANNER_SPEED, |next| next.entry_speed);
        planned
            .block
            .calculate_trapezoid(planned.entry_speed, exit_speed.min(planned.block.nominal_speed));

        if self.shared.queue.push(planned.block).is_err() {
            // The slot freed by `remove` above is still free
            let restored = self.window.insert(0, planned);
            debug_assert!(restored.is_ok());
            return false;
        }
        if let Some(next) = self.window.first_mut() {
            next.pinned = true;
            next.max_entry_speed = next.entry_speed;
        }
        true
    }
}

/// Highest speed at the start of `distance` that can still reach `target`
fn max_allowable_speed(acceleration: f32, target: f32, distance: f32) -> f32 {
    sqrtf(target * target + 2.0 * acceleration * distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use crate::safety::StopCause;
    use proptest::prelude::*;

    fn motion_config() -> MotionConfig {
        MachineConfig::default().motion
    }

    fn jd_config() -> MotionConfig {
        let mut config = motion_config();
        config.cornering = CorneringModel::JunctionDeviation { deviation_mm: 0.013 };
        config
    }

    fn xyz(x: f32, y: f32, z: f32) -> AxisPosition {
        AxisPosition::new(x, y, z, 0.0)
    }

    fn drain<const N: usize>(shared: &MotionShared<N>) -> heapless::Vec<MotionBlock, 32> {
        let mut out = heapless::Vec::new();
        while let Some(b) = shared.queue.pop() {
            out.push(b).unwrap();
        }
        out
    }

    #[test]
    fn test_zero_move_discarded() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &motion_config(), Kinematics::Cartesian);
        let outcome = planner
            .buffer_line(&AxisPosition::ZERO, &LineParams::new(50.0, MoveKind::Travel))
            .unwrap();
        assert_eq!(outcome, BufferOutcome::Discarded);
        assert_eq!(planner.pending(), 0);
    }

    #[test]
    fn test_junction_deviation_right_angle() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &jd_config(), Kinematics::Cartesian);
        let params = LineParams::new(100.0, MoveKind::Travel);

        planner.buffer_line(&xyz(1.0, 0.0, 0.0), &params).unwrap();
        planner.buffer_line(&xyz(1.0, 1.0, 0.0), &params).unwrap();
        assert!(planner.flush());

        let blocks = drain(&shared);
        assert_eq!(blocks.len(), 2);

        let sin_half = sqrtf(0.5);
        let expected = sqrtf(3000.0 * 0.013 * sin_half / (1.0 - sin_half));
        let corner = blocks[1].entry_speed;
        assert!((corner - expected).abs() / expected < 0.01, "corner {}", corner);
        assert_eq!(blocks[0].exit_speed, corner);
        assert_eq!(blocks[1].exit_speed, MIN_PLANNER_SPEED);
    }

    #[test]
    fn test_jerk_collinear_keeps_speed() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &motion_config(), Kinematics::Cartesian);
        let params = LineParams::new(100.0, MoveKind::Travel);

        planner.buffer_line(&xyz(50.0, 0.0, 0.0), &params).unwrap();
        planner.buffer_line(&xyz(100.0, 0.0, 0.0), &params).unwrap();
        assert!(planner.flush());

        let blocks = drain(&shared);
        // Start limited by X jerk, junction runs straight through
        assert!((blocks[0].entry_speed - 10.0).abs() < 1e-3);
        assert!((blocks[1].entry_speed - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_jerk_reversal_slows_junction() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &motion_config(), Kinematics::Cartesian);
        let params = LineParams::new(100.0, MoveKind::Travel);

        planner.buffer_line(&xyz(50.0, 0.0, 0.0), &params).unwrap();
        planner.buffer_line(&xyz(0.0, 0.0, 0.0), &params).unwrap();
        assert!(planner.flush());

        let blocks = drain(&shared);
        assert!(blocks[1].entry_speed <= 10.0 + 1e-3);
    }

    #[test]
    fn test_z_acceleration_capped() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &motion_config(), Kinematics::Cartesian);
        let params = LineParams {
            feedrate: 10.0,
            acceleration: Some(3000.0),
            kind: MoveKind::Travel,
        };

        let outcome = planner.buffer_line(&xyz(0.0, 0.0, 10.0), &params).unwrap();
        assert_eq!(outcome, BufferOutcome::Queued);
        assert!(planner.flush());

        let block = shared.queue.pop().unwrap();
        assert_eq!(block.acceleration, 100.0);
        assert!(block.nominal_speed <= 2.25 + 1e-4);
    }

    #[test]
    fn test_move_kind_selects_default_acceleration() {
        let mut config = motion_config();
        config.acceleration.travel = 1500.0;
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &config, Kinematics::Cartesian);

        planner
            .buffer_line(&xyz(10.0, 0.0, 0.0), &LineParams::new(50.0, MoveKind::Travel))
            .unwrap();
        assert!(planner.flush());
        assert_eq!(shared.queue.pop().unwrap().acceleration, 1500.0);
    }

    #[test]
    fn test_stalls_when_window_and_queue_full() {
        let shared: MotionShared<2> = MotionShared::new();
        let mut planner = Planner::new(&shared, &motion_config(), Kinematics::Cartesian);
        let params = LineParams::new(50.0, MoveKind::Travel);

        let mut accepted = 0;
        for i in 0..20 {
            let x = if i % 2 == 0 { 10.0 } else { 0.0 };
            match planner.buffer_line(&xyz(x, 0.0, 0.0), &params).unwrap() {
                BufferOutcome::Queued => accepted += 1,
                BufferOutcome::Stalled => break,
                BufferOutcome::Discarded => panic!("unexpected discard"),
            }
        }
        assert_eq!(accepted, LOOKAHEAD_DEPTH + 2);
        assert!(shared.queue.is_full());

        // Request was not consumed
        let before = planner.position();
        let again = planner.buffer_line(&xyz(5.0, 5.0, 0.0), &params).unwrap();
        assert_eq!(again, BufferOutcome::Stalled);
        assert_eq!(planner.position(), before);

        shared.queue.pop();
        let retry = planner.buffer_line(&xyz(5.0, 5.0, 0.0), &params).unwrap();
        assert_eq!(retry, BufferOutcome::Queued);
    }

    #[test]
    fn test_halted_rejects_moves() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &motion_config(), Kinematics::Cartesian);
        shared.estop.trigger(StopCause::External);
        let result = planner.buffer_line(&xyz(1.0, 0.0, 0.0), &LineParams::new(10.0, MoveKind::Travel));
        assert_eq!(result, Err(MoveError::Halted));
    }

    #[test]
    fn test_service_commits_single_move_when_idle() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &motion_config(), Kinematics::Cartesian);
        planner
            .buffer_line(&xyz(10.0, 0.0, 0.0), &LineParams::new(50.0, MoveKind::Travel))
            .unwrap();
        assert_eq!(shared.queue.len(), 0);

        planner.service();
        assert_eq!(shared.queue.len(), 1);
        assert_eq!(planner.pending(), 0);
    }

    #[test]
    fn test_service_keeps_newest_block_open() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &motion_config(), Kinematics::Cartesian);
        let params = LineParams::new(50.0, MoveKind::Travel);
        for x in [10.0, 20.0, 30.0] {
            planner.buffer_line(&xyz(x, 0.0, 0.0), &params).unwrap();
        }

        planner.service();
        assert_eq!(shared.queue.len(), 2);
        assert_eq!(planner.pending(), 1);
    }

    #[test]
    fn test_set_position_updates_counters() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &motion_config(), Kinematics::Cartesian);
        planner.set_position(&xyz(10.0, 20.0, 1.0)).unwrap();
        assert_eq!(shared.position.get(), [800, 1600, 4000, 0]);

        // Next move is relative to the declared position
        planner
            .buffer_line(&xyz(11.0, 20.0, 1.0), &LineParams::new(10.0, MoveKind::Travel))
            .unwrap();
        assert!(planner.flush());
        assert_eq!(shared.queue.pop().unwrap().steps, [80, 0, 0, 0]);
    }

    #[test]
    fn test_corexy_steps_both_motors() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut planner = Planner::new(&shared, &motion_config(), Kinematics::CoreXY);
        planner
            .buffer_line(&xyz(0.0, 10.0, 0.0), &LineParams::new(10.0, MoveKind::Travel))
            .unwrap();
        assert!(planner.flush());
        let block = shared.queue.pop().unwrap();
        assert_eq!(block.steps, [800, 800, 0, 0]);
        assert_eq!(block.direction_bits, 0b10);
    }

    proptest! {
        #[test]
        fn prop_block_limits_respected(
            moves in proptest::collection::vec(
                (0.0f32..200.0, 0.0f32..200.0, 0.0f32..20.0, 1.0f32..1000.0, 10.0f32..20000.0),
                1..12,
            )
        ) {
            let config = motion_config();
            let shared: MotionShared<32> = MotionShared::new();
            let mut planner = Planner::new(&shared, &config, Kinematics::Cartesian);

            for (x, y, z, feedrate, accel) in moves {
                let params = LineParams { feedrate, acceleration: Some(accel), kind: MoveKind::Travel };
                let _ = planner.buffer_line(&xyz(x, y, z), &params).unwrap();
                prop_assert!(planner.flush());
                while let Some(block) = shared.queue.pop() {
                    for i in 0..NUM_AXES {
                        let axis_mm = block.steps[i] as f32 / config.steps_per_unit[i];
                        let share = axis_mm / block.millimeters;
                        prop_assert!(block.nominal_speed * share <= config.max_feedrate[i] * 1.01);
                        prop_assert!(block.acceleration * share <= config.max_acceleration[i] * 1.01);
                    }
                    prop_assert!(block.entry_speed <= block.nominal_speed + 1e-3);
                    prop_assert!(block.exit_speed <= block.nominal_speed + 1e-3);
                }
            }
        }
    }
}
