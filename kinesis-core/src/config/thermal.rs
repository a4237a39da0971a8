//! Heater configuration types

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Full scale heater duty
pub const DUTY_MAX: u8 = 255;

/// PID gains in per-second units
///
/// `ki` and `kd` are scaled by the control period inside the regulator,
/// so tuned values carry over between loop rates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Regulation law for a heater
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ControlMode {
    /// PID with a functional range around target (°C)
    Pid { gains: PidGains, functional_range: f32 },
    /// On/off with a hysteresis band (°C)
    BangBang { hysteresis: f32 },
}

/// "Target reached" gate parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResidencyConfig {
    /// Time the temperature must stay near target (s)
    pub time_s: f32,
    /// Band that keeps the residency timer running (°C)
    pub hysteresis: f32,
    /// Band that starts the residency timer (°C)
    pub window: f32,
}

impl Default for ResidencyConfig {
    fn default() -> Self {
        Self {
            time_s: 10.0,
            hysteresis: 3.0,
            window: 1.0,
        }
    }
}

/// Thermal protection thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProtectionConfig {
    /// Grace period for drift once stable (s)
    pub runaway_period_s: f32,
    /// Allowed drift from target once stable (°C)
    pub runaway_hysteresis: f32,
    /// Window in which a saturated heater must show progress (s)
    pub watch_period_s: f32,
    /// Minimum rise expected per watch window (°C)
    pub watch_increase: f32,
}

impl ProtectionConfig {
    /// Hotend defaults
    pub const HOTEND: Self = Self {
        runaway_period_s: 40.0,
        runaway_hysteresis: 4.0,
        watch_period_s: 20.0,
        watch_increase: 2.0,
    };

    /// Heated bed defaults
    pub const BED: Self = Self {
        runaway_period_s: 20.0,
        runaway_hysteresis: 2.0,
        watch_period_s: 60.0,
        watch_increase: 2.0,
    };
}

/// Configuration of one heater channel
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeaterConfig {
    /// Below this reading the sensor is considered broken (°C)
    pub min_temp: f32,
    /// Above this reading the heater is shut down (°C)
    pub max_temp: f32,
    /// Regulation law
    pub mode: ControlMode,
    /// Duty ceiling applied to the regulator output
    pub max_power: u8,
    /// Residency gate
    pub residency: ResidencyConfig,
    /// Protection thresholds, `None` disables runaway/watch checks
    pub protection: Option<ProtectionConfig>,
}

impl HeaterConfig {
    /// Reference hotend
    pub fn hotend() -> Self {
        Self {
            min_temp: 5.0,
            max_temp: 285.0,
            mode: ControlMode::Pid {
                gains: PidGains {
                    kp: 22.2,
                    ki: 1.08,
                    kd: 114.0,
                },
                functional_range: 10.0,
            },
            max_power: DUTY_MAX,
            residency: ResidencyConfig::default(),
            protection: Some(ProtectionConfig::HOTEND),
        }
    }

    /// Reference heated bed
    pub fn bed() -> Self {
        Self {
            min_temp: 5.0,
            max_temp: 130.0,
            mode: ControlMode::BangBang { hysteresis: 2.0 },
            max_power: DUTY_MAX,
            residency: ResidencyConfig::default(),
            protection: Some(ProtectionConfig::BED),
        }
    }

    /// Highest target the channel accepts
    ///
    /// Targets are kept a margin below `max_temp` so normal overshoot
    /// does not trip the max temperature fault.
    pub fn max_target(&self) -> f32 {
        self.max_temp - 15.0
    }
}

/// All heater channels
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThermalConfig {
    pub hotend: HeaterConfig,
    pub bed: Option<HeaterConfig>,
    pub chamber: Option<HeaterConfig>,
    /// Control loop period (s)
    pub period_s: f32,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            hotend: HeaterConfig::hotend(),
            bed: Some(HeaterConfig::bed()),
            chamber: None,
            period_s: 0.1,
        }
    }
}
