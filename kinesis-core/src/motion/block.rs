//! Motion block: the unit of work handed from the planner to the step
//! scheduler
//!
//! A block is immutable once it is in the queue. Speeds are stored both in
//! mm/s (for planning and reporting) and in steps/s along the dominant axis
//! (for the scheduler's integer rate math).

use libm::{ceilf, floorf, sqrtf};

use super::position::NUM_AXES;

/// Lowest step rate the scheduler will run at (steps/s)
pub const MIN_STEP_RATE: u32 = 120;

/// Planned move ready for step generation
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionBlock {
    /// Absolute step count per actuator
    pub steps: [u32; NUM_AXES],
    /// Bit `i` set when actuator `i` moves toward decreasing coordinates
    pub direction_bits: u8,
    /// Step events in the block (max of `steps`)
    pub step_event_count: u32,
    /// Path length (mm)
    pub millimeters: f32,
    /// Speed at block start (mm/s)
    pub entry_speed: f32,
    /// Cruise speed (mm/s)
    pub nominal_speed: f32,
    /// Speed at block end (mm/s)
    pub exit_speed: f32,
    /// Acceleration (mm/s²)
    pub acceleration: f32,
    /// Step rate at block start (steps/s)
    pub initial_rate: u32,
    /// Cruise step rate (steps/s)
    pub nominal_rate: u32,
    /// Step rate reached at the end of the acceleration ramp
    pub cruise_rate: u32,
    /// Step rate at block end (steps/s)
    pub final_rate: u32,
    /// Acceleration in steps/s²
    pub acceleration_rate: u32,
    /// Last step event of the acceleration ramp
    pub accelerate_until: u32,
    /// First step event of the deceleration ramp
    pub decelerate_after: u32,
    /// Endstops watched during the move (homing only)
    pub endstop_mask: u8,
    /// Ramps follow the Bezier velocity curve
    pub s_curve: bool,
}

impl MotionBlock {
    /// Empty block for the given step counts
    pub fn new(steps: [u32; NUM_AXES], direction_bits: u8, millimeters: f32) -> Self {
        let step_event_count = steps.iter().copied().max().unwrap_or(0);
        Self {
            steps,
            direction_bits,
            step_event_count,
            millimeters,
            entry_speed: 0.0,
            nominal_speed: 0.0,
            exit_speed: 0.0,
            acceleration: 0.0,
            initial_rate: MIN_STEP_RATE,
            nominal_rate: MIN_STEP_RATE,
            cruise_rate: MIN_STEP_RATE,
            final_rate: MIN_STEP_RATE,
            acceleration_rate: 0,
            accelerate_until: 0,
            decelerate_after: step_event_count,
            endstop_mask: 0,
            s_curve: false,
        }
    }

    /// Steps per mm along the path
    fn steps_per_mm(&self) -> f32 {
        if self.millimeters > 0.0 {
            self.step_event_count as f32 / self.millimeters
        } else {
            0.0
        }
    }

    /// Set cruise speed and acceleration and derive the step-space rates
    pub fn set_nominal(&mut self, nominal_speed: f32, acceleration: f32) {
        let spm = self.steps_per_mm();
        self.nominal_speed = nominal_speed;
        self.acceleration = acceleration;
        self.nominal_rate = (ceilf(nominal_speed * spm) as u32).max(MIN_STEP_RATE);
        self.acceleration_rate = ceilf(acceleration * spm) as u32;
    }

    /// Compute the trapezoid for the given entry and exit speeds (mm/s)
    ///
    /// Fills `initial_rate`, `final_rate`, `accelerate_until`,
    /// `decelerate_after` and `cruise_rate`. When the block is too short to
    /// reach cruise speed the ramps meet at their intersection.
    pub fn calculate_trapezoid(&mut self, entry_speed: f32, exit_speed: f32) {
        self.entry_speed = entry_speed;
        self.exit_speed = exit_speed;

        let nominal = self.nominal_rate as f32;
        let entry_factor = if self.nominal_speed > 0.0 {
            entry_speed / self.nominal_speed
        } else {
            0.0
        };
        let exit_factor = if self.nominal_speed > 0.0 {
            exit_speed / self.nominal_speed
        } else {
            0.0
        };

        let initial = (ceilf(nominal * entry_factor) as u32).clamp(MIN_STEP_RATE, self.nominal_rate);
        let fin = (ceilf(nominal * exit_factor) as u32).clamp(MIN_STEP_RATE, self.nominal_rate);
        let accel = self.acceleration_rate as f32;
        let total = self.step_event_count;

        let (accelerate_steps, plateau_steps) = if accel > 0.0 {
            let accelerate =
                ceilf(acceleration_distance(initial as f32, nominal, accel)).max(0.0) as u32;
            let decelerate =
                floorf(acceleration_distance(nominal, fin as f32, -accel)).max(0.0) as u32;
            match total.checked_sub(accelerate + decelerate) {
                Some(plateau) => (accelerate, plateau),
                None => {
                    let meet = ceilf(intersection_distance(initial as f32, fin as f32, accel, total as f32));
                    ((meet.max(0.0) as u32).min(total), 0)
                }
            }
        } else {
            (0, total)
        };

        self.initial_rate = initial;
        self.final_rate = fin;
        self.accelerate_until = accelerate_steps;
        self.decelerate_after = accelerate_steps + plateau_steps;

        let reached = sqrtf((initial as f32) * (initial as f32) + 2.0 * accel * accelerate_steps as f32);
        self.cruise_rate = (reached as u32).clamp(initial, self.nominal_rate);
    }

    /// Whether this block watches endstops
    pub fn is_homing(&self) -> bool {
        self.endstop_mask != 0
    }
}

/// Distance (steps) to go from `initial` to `target` rate at `accel`
fn acceleration_distance(initial: f32, target: f32, accel: f32) -> f32 {
    if accel == 0.0 {
        return 0.0;
    }
    (target * target - initial * initial) / (2.0 * accel)
}

/// Step index where accelerating from `initial` meets decelerating to `fin`
fn intersection_distance(initial: f32, fin: f32, accel: f32, distance: f32) -> f32 {
    if accel == 0.0 {
        return 0.0;
    }
    (2.0 * accel * distance - initial * initial + fin * fin) / (4.0 * accel)
}
