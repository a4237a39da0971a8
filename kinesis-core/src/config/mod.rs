//! Configuration types
//!
//! Board-agnostic configuration built once at startup and passed by
//! reference into every component. Values serialize with postcard for
//! external storage.

pub mod leveling;
pub mod motion;
pub mod thermal;

pub use leveling::*;
pub use motion::*;
pub use thermal::*;

use crate::motion::LINEAR_AXES;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reasons a configuration is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Steps per unit must be positive
    StepsPerUnit,
    /// Feedrate limits must be positive
    Feedrate,
    /// Acceleration limits must be positive
    Acceleration,
    /// Jerk or junction deviation must be positive
    Cornering,
    /// Axis maximum must exceed its minimum
    Travel,
    /// Home direction must be -1 or 1
    HomeDirection,
    /// Grid needs at least 2x2 points and fits the capacity
    GridSize,
    /// Subdivision factor out of range
    Subdivisions,
    /// Fade height must be above fade start
    FadeHeight,
    /// Mesh inset leaves no probeable area
    MeshInset,
    /// Heater minimum must be below maximum
    HeaterLimits,
    /// Controller parameters out of range
    HeaterControl,
    /// Delta or SCARA dimensions cannot be solved
    Geometry,
    /// Step timer or segment length is zero
    Timing,
}

/// Complete machine configuration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MachineConfig {
    pub motion: MotionConfig,
    pub kinematics: KinematicsConfig,
    pub travel: TravelConfig,
    pub homing: HomingConfig,
    pub leveling: LevelingConfig,
    pub thermal: ThermalConfig,
}

impl MachineConfig {
    /// Check internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_motion()?;
        self.validate_travel()?;
        self.validate_kinematics()?;
        self.validate_leveling()?;
        validate_heater(&self.thermal.hotend)?;
        if let Some(bed) = &self.thermal.bed {
            validate_heater(bed)?;
        }
        if let Some(chamber) = &self.thermal.chamber {
            validate_heater(chamber)?;
        }
        if !(self.thermal.period_s > 0.0) {
            return Err(ConfigError::Timing);
        }
        Ok(())
    }

    /// Bed extent in X and Y (mm)
    pub fn bed_size(&self) -> [f32; 2] {
        [self.travel.length(0), self.travel.length(1)]
    }

    fn validate_motion(&self) -> Result<(), ConfigError> {
        let m = &self.motion;
        if m.steps_per_unit.iter().any(|s| !(*s > 0.0)) {
            return Err(ConfigError::StepsPerUnit);
        }
        if m.max_feedrate.iter().any(|f| !(*f > 0.0)) || m.min_feedrate < 0.0 {
            return Err(ConfigError::Feedrate);
        }
        let defaults = [m.acceleration.print, m.acceleration.travel, m.acceleration.retract];
        if m.max_acceleration.iter().chain(defaults.iter()).any(|a| !(*a > 0.0)) {
            return Err(ConfigError::Acceleration);
        }
        match m.cornering {
            CorneringModel::ClassicJerk { jerk } => {
                if jerk.iter().any(|j| *j < 0.0) {
                    return Err(ConfigError::Cornering);
                }
            }
            CorneringModel::JunctionDeviation { deviation_mm } => {
                if !(deviation_mm > 0.0) {
                    return Err(ConfigError::Cornering);
                }
            }
        }
        if m.step_timer_hz == 0 || !(m.segment_length_mm > 0.0) {
            return Err(ConfigError::Timing);
        }
        Ok(())
    }

    fn validate_travel(&self) -> Result<(), ConfigError> {
        for axis in 0..LINEAR_AXES {
            if !(self.travel.length(axis) > 0.0) {
                return Err(ConfigError::Travel);
            }
            if !matches!(self.homing.home_dir[axis], -1 | 1) {
                return Err(ConfigError::HomeDirection);
            }
            if !(self.homing.feedrate[axis] > 0.0) {
                return Err(ConfigError::Feedrate);
            }
        }
        Ok(())
    }

    fn validate_kinematics(&self) -> Result<(), ConfigError> {
        match self.kinematics {
            KinematicsConfig::Delta(d) => {
                // Every printable point must be reachable from the farthest tower
                if !(d.radius > 0.0 && d.printable_radius > 0.0)
                    || d.diagonal_rod <= d.radius + d.printable_radius
                {
                    return Err(ConfigError::Geometry);
                }
            }
            KinematicsConfig::Scara(s) => {
                if !(s.linkage_1 > 0.0 && s.linkage_2 > 0.0) {
                    return Err(ConfigError::Geometry);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn validate_leveling(&self) -> Result<(), ConfigError> {
        let l = &self.leveling;
        if l.uses_grid() {
            let n = l.grid_points as usize;
            if !(2..=MAX_GRID_POINTS).contains(&n) {
                return Err(ConfigError::GridSize);
            }
            let [bx, by] = self.bed_size();
            if l.mesh_inset < 0.0 || 2.0 * l.mesh_inset >= bx.min(by) {
                return Err(ConfigError::MeshInset);
            }
        }
        if !(1..=MAX_SUBDIVISIONS).contains(&(l.subdivisions as usize)) {
            return Err(ConfigError::Subdivisions);
        }
        if let Some(h) = l.fade_height {
            if h <= l.fade_start {
                return Err(ConfigError::FadeHeight);
            }
        }
        Ok(())
    }
}

fn validate_heater(h: &HeaterConfig) -> Result<(), ConfigError> {
    if h.min_temp >= h.max_temp {
        return Err(ConfigError::HeaterLimits);
    }
    let control_ok = match h.mode {
        ControlMode::Pid {
            gains,
            functional_range,
        } => gains.kp >= 0.0 && gains.ki >= 0.0 && gains.kd >= 0.0 && functional_range > 0.0,
        ControlMode::BangBang { hysteresis } => hysteresis >= 0.0,
    };
    if !control_ok || !(h.residency.time_s >= 0.0) {
        return Err(ConfigError::HeaterControl);
    }
    if let Some(p) = h.protection {
        if !(p.runaway_period_s > 0.0 && p.watch_period_s > 0.0 && p.runaway_hysteresis > 0.0) {
            return Err(ConfigError::HeaterControl);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(MachineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_reference_values() {
        let config = MachineConfig::default();
        assert_eq!(config.motion.max_acceleration[2], 100.0);
        assert_eq!(config.homing.home_dir, [-1, -1, -1]);
        assert_eq!(config.bed_size(), [200.0, 200.0]);
        assert_eq!(config.thermal.hotend.max_temp, 285.0);
    }

    #[test]
    fn test_zero_steps_rejected() {
        let mut config = MachineConfig::default();
        config.motion.steps_per_unit[1] = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::StepsPerUnit));
    }

    #[test]
    fn test_grid_too_small() {
        let mut config = MachineConfig::default();
        config.leveling.strategy = LevelingStrategy::Bilinear;
        config.leveling.grid_points = 1;
        assert_eq!(config.validate(), Err(ConfigError::GridSize));
    }

    #[test]
    fn test_fade_below_start() {
        let mut config = MachineConfig::default();
        config.leveling.fade_start = 5.0;
        config.leveling.fade_height = Some(2.0);
        assert_eq!(config.validate(), Err(ConfigError::FadeHeight));
    }

    #[test]
    fn test_heater_limits_inverted() {
        let mut config = MachineConfig::default();
        config.thermal.hotend.min_temp = 300.0;
        assert_eq!(config.validate(), Err(ConfigError::HeaterLimits));
    }

    #[test]
    fn test_delta_rod_too_short() {
        let mut config = MachineConfig::default();
        config.kinematics = KinematicsConfig::Delta(DeltaGeometry {
            diagonal_rod: 150.0,
            radius: 100.0,
            tower_angle_trim: [0.0; 3],
            printable_radius: 90.0,
        });
        assert_eq!(config.validate(), Err(ConfigError::Geometry));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_postcard_round_trip() {
        let config = MachineConfig::default();
        let mut buf = [0u8; 1024];
        let bytes = postcard::to_slice(&config, &mut buf).unwrap();
        let decoded: MachineConfig = postcard::from_bytes(bytes).unwrap();
        assert_eq!(decoded, config);
    }
}
