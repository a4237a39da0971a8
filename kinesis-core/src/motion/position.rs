//! Axis positions in logical, actuator and step units
//!
//! Logical positions are what the command layer talks about (X/Y/Z in mm,
//! E in mm of filament). Actuator positions are what the motors see after
//! the kinematic transform. Step positions are actuator positions multiplied
//! by the per-axis steps-per-unit ratio.

use core::ops::{Index, IndexMut};

use portable_atomic::{AtomicI32, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of extruders driven by this core
pub const EXTRUDERS: usize = 1;

/// Number of linear axes (X, Y, Z)
pub const LINEAR_AXES: usize = 3;

/// Total number of planned axes (linear + extruders)
pub const NUM_AXES: usize = LINEAR_AXES + EXTRUDERS;

/// Axis identifier
///
/// For non-Cartesian machines the same indices name the actuators
/// (A/B/C towers on a delta, the two arm joints on a SCARA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    X,
    Y,
    Z,
    E,
}

impl Axis {
    /// All axes in planning order
    pub const ALL: [Axis; NUM_AXES] = [Axis::X, Axis::Y, Axis::Z, Axis::E];

    /// Linear axes in homing order
    pub const LINEAR: [Axis; LINEAR_AXES] = [Axis::X, Axis::Y, Axis::Z];

    /// Array index of this axis
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bit used for this axis in direction and endstop masks
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Whether this is one of the X/Y/Z axes
    pub const fn is_linear(self) -> bool {
        !matches!(self, Axis::E)
    }
}

/// Per-axis position vector in logical units (mm)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisPosition(pub [f32; NUM_AXES]);

/// Per-axis position vector in actuator units
///
/// Millimeters of carriage travel for Cartesian, Core and delta machines,
/// degrees of arm rotation for SCARA joints.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActuatorPosition(pub [f32; NUM_AXES]);

macro_rules! impl_vector {
    ($name:ident) => {
        impl $name {
            /// All axes at zero
            pub const ZERO: Self = Self([0.0; NUM_AXES]);

            /// Build from X/Y/Z and a single extruder value
            pub const fn new(x: f32, y: f32, z: f32, e: f32) -> Self {
                Self([x, y, z, e])
            }

            /// Per-axis difference `self - other`
            pub fn delta(&self, other: &Self) -> [f32; NUM_AXES] {
                let mut out = [0.0; NUM_AXES];
                for (i, d) in out.iter_mut().enumerate() {
                    *d = self.0[i] - other.0[i];
                }
                out
            }

            /// Whether every axis is within `epsilon` of `other`
            pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
                self.0
                    .iter()
                    .zip(other.0.iter())
                    .all(|(a, b)| (a - b).abs() <= epsilon)
            }

            /// Convert to native step counts
            pub fn to_steps(&self, steps_per_unit: &[f32; NUM_AXES]) -> [i32; NUM_AXES] {
                let mut out = [0; NUM_AXES];
                for (i, s) in out.iter_mut().enumerate() {
                    *s = libm::roundf(self.0[i] * steps_per_unit[i]) as i32;
                }
                out
            }

            /// Convert from native step counts
            pub fn from_steps(steps: &[i32; NUM_AXES], steps_per_unit: &[f32; NUM_AXES]) -> Self {
                let mut out = [0.0; NUM_AXES];
                for (i, v) in out.iter_mut().enumerate() {
                    *v = steps[i] as f32 / steps_per_unit[i];
                }
                Self(out)
            }
        }

        impl Index<Axis> for $name {
            type Output = f32;

            fn index(&self, axis: Axis) -> &f32 {
                &self.0[axis.index()]
            }
        }

        impl IndexMut<Axis> for $name {
            fn index_mut(&mut self, axis: Axis) -> &mut f32 {
                &mut self.0[axis.index()]
            }
        }
    };
}

impl_vector!(AxisPosition);
impl_vector!(ActuatorPosition);

/// Step counters shared between the step scheduler and reporting code
///
/// The scheduler is the only writer while motion is running; the main
/// context writes only when the queue is drained (after homing or an
/// explicit position reset).
#[derive(Debug)]
pub struct StepPosition {
    counts: [AtomicI32; NUM_AXES],
}

impl Default for StepPosition {
    fn default() -> Self {
        Self::new()
    }
}

impl StepPosition {
    /// All counters at zero
    pub const fn new() -> Self {
        Self {
            counts: [
                AtomicI32::new(0),
                AtomicI32::new(0),
                AtomicI32::new(0),
                AtomicI32::new(0),
            ],
        }
    }

    /// Snapshot of all counters
    pub fn get(&self) -> [i32; NUM_AXES] {
        let mut out = [0; NUM_AXES];
        for (i, c) in out.iter_mut().enumerate() {
            *c = self.counts[i].load(Ordering::Acquire);
        }
        out
    }

    /// Step count of a single axis
    pub fn axis(&self, axis: Axis) -> i32 {
        self.counts[axis.index()].load(Ordering::Acquire)
    }

    /// Overwrite all counters
    pub fn set(&self, steps: &[i32; NUM_AXES]) {
        for (c, s) in self.counts.iter().zip(steps.iter()) {
            c.store(*s, Ordering::Release);
        }
    }

    /// Overwrite a single axis counter
    pub fn set_axis(&self, axis: Axis, steps: i32) {
        self.counts[axis.index()].store(steps, Ordering::Release);
    }

    /// Advance an axis by one step in the given direction
    pub(crate) fn step(&self, axis: usize, negative: bool) {
        let delta = if negative { -1 } else { 1 };
        let c = &self.counts[axis];
        c.store(c.load(Ordering::Relaxed) + delta, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_bits_are_distinct() {
        let mask = Axis::ALL.iter().fold(0u8, |m, a| {
            assert_eq!(m & a.bit(), 0);
            m | a.bit()
        });
        assert_eq!(mask, 0b1111);
    }

    #[test]
    fn test_steps_conversion() {
        let spu = [80.0, 80.0, 4000.0, 500.0];
        let pos = AxisPosition::new(10.0, -2.5, 0.1, 1.0);
        let steps = pos.to_steps(&spu);
        assert_eq!(steps, [800, -200, 400, 500]);

        let back = AxisPosition::from_steps(&steps, &spu);
        assert!(back.approx_eq(&pos, 1e-6));
    }

    #[test]
    fn test_index_by_axis() {
        let mut pos = AxisPosition::ZERO;
        pos[Axis::Z] = 3.0;
        assert_eq!(pos.0[2], 3.0);
        assert_eq!(pos[Axis::Z], 3.0);
    }

    #[test]
    fn test_step_position_counters() {
        let position = StepPosition::new();
        position.step(0, false);
        position.step(0, false);
        position.step(1, true);
        assert_eq!(position.get(), [2, -1, 0, 0]);

        position.set_axis(Axis::E, 42);
        assert_eq!(position.axis(Axis::E), 42);
    }
}
