//! Motion configuration types
//!
//! Per-axis limits, cornering model, kinematic topology, travel bounds
//! and homing parameters.

use crate::motion::{LINEAR_AXES, NUM_AXES};
use crate::traits::PulseTiming;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Junction speed model used by the planner
///
/// The two models are mutually exclusive. S-curve shaping is a separate
/// switch (`MotionConfig::s_curve`) and works with either.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CorneringModel {
    /// Per-axis instantaneous speed change bound (mm/s)
    ClassicJerk { jerk: [f32; NUM_AXES] },
    /// Allowed deviation from the ideal corner path (mm)
    JunctionDeviation { deviation_mm: f32 },
}

/// Default accelerations per move class (mm/s²)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccelerationDefaults {
    /// Printing moves (XYZ with extrusion)
    pub print: f32,
    /// Travel moves (no extrusion)
    pub travel: f32,
    /// Extruder-only moves
    pub retract: f32,
}

/// Cold/lengthy extrusion guard
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExtrusionGuard {
    /// Reject extrusion while the hotend is below `min_temp`
    pub prevent_cold: bool,
    /// Minimum hotend temperature for extrusion (°C)
    pub min_temp: f32,
    /// Reject single moves extruding more than `max_length`
    pub prevent_lengthy: bool,
    /// Maximum extruder delta per move (mm)
    pub max_length: f32,
}

/// Planner and step generation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MotionConfig {
    /// Steps per mm (or per degree on SCARA joints)
    pub steps_per_unit: [f32; NUM_AXES],
    /// Max feedrate per actuator (units/s)
    pub max_feedrate: [f32; NUM_AXES],
    /// Max acceleration per actuator (units/s²)
    pub max_acceleration: [f32; NUM_AXES],
    /// Default accelerations by move class
    pub acceleration: AccelerationDefaults,
    /// Junction speed model
    pub cornering: CorneringModel,
    /// Shape ramps with a quintic Bezier velocity curve
    pub s_curve: bool,
    /// Lower bound for print feedrate (mm/s)
    pub min_feedrate: f32,
    /// Lower bound for travel feedrate (mm/s)
    pub min_travel_feedrate: f32,
    /// Segment length for non-linear kinematics and mesh leveling (mm)
    pub segment_length_mm: f32,
    /// Extrusion guard
    pub extrusion: ExtrusionGuard,
    /// Step/dir electrical timing
    pub pulse: PulseTiming,
    /// Step timer frequency (Hz)
    pub step_timer_hz: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            steps_per_unit: [80.0, 80.0, 4000.0, 500.0],
            max_feedrate: [500.0, 500.0, 2.25, 45.0],
            max_acceleration: [3000.0, 3000.0, 100.0, 10000.0],
            acceleration: AccelerationDefaults {
                print: 3000.0,
                travel: 3000.0,
                retract: 3000.0,
            },
            cornering: CorneringModel::ClassicJerk {
                jerk: [10.0, 10.0, 0.3, 5.0],
            },
            s_curve: false,
            min_feedrate: 0.0,
            min_travel_feedrate: 0.0,
            segment_length_mm: 1.0,
            extrusion: ExtrusionGuard {
                prevent_cold: true,
                min_temp: 180.0,
                prevent_lengthy: true,
                max_length: 200.0,
            },
            pulse: PulseTiming::default(),
            step_timer_hz: 1_000_000,
        }
    }
}

/// Delta tower geometry
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeltaGeometry {
    /// Diagonal rod length (mm)
    pub diagonal_rod: f32,
    /// Horizontal distance from the center to each tower carriage joint (mm)
    pub radius: f32,
    /// Per-tower angle trim (degrees) added to 210/330/90
    pub tower_angle_trim: [f32; 3],
    /// Radius of the reachable print area (mm)
    pub printable_radius: f32,
}

/// Two-arm SCARA geometry (Morgan style)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScaraGeometry {
    /// Inner arm length (mm)
    pub linkage_1: f32,
    /// Outer arm length (mm)
    pub linkage_2: f32,
    /// Position of the shoulder relative to bed origin (mm)
    pub offset: [f32; 2],
    /// Joint angles at the homing switches (degrees)
    pub home_angles: [f32; 2],
}

/// Machine topology
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum KinematicsConfig {
    #[default]
    Cartesian,
    CoreXY,
    CoreXZ,
    CoreYZ,
    Delta(DeltaGeometry),
    Scara(ScaraGeometry),
}

/// Travel bounds and soft endstop switches
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TravelConfig {
    /// Minimum logical position per linear axis (mm)
    pub min_pos: [f32; LINEAR_AXES],
    /// Maximum logical position per linear axis (mm)
    pub max_pos: [f32; LINEAR_AXES],
    /// Enforce `min_pos` on moves
    pub soft_min: [bool; LINEAR_AXES],
    /// Enforce `max_pos` on moves
    pub soft_max: [bool; LINEAR_AXES],
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            min_pos: [0.0, 0.0, 0.0],
            max_pos: [200.0, 200.0, 170.0],
            soft_min: [false; LINEAR_AXES],
            soft_max: [true; LINEAR_AXES],
        }
    }
}

impl TravelConfig {
    /// Axis length (mm)
    pub fn length(&self, axis: usize) -> f32 {
        self.max_pos[axis] - self.min_pos[axis]
    }
}

/// Homing parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HomingConfig {
    /// Direction toward the endstop: -1 (min) or 1 (max)
    pub home_dir: [i8; LINEAR_AXES],
    /// Homing feedrate per linear axis (mm/s)
    pub feedrate: [f32; LINEAR_AXES],
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            home_dir: [-1, -1, -1],
            feedrate: [50.0, 50.0, 4.0],
        }
    }
}
