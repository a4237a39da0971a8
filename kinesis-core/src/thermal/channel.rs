//! Per-heater channel state

use super::regulator::{Regulator, ResidencyTimer};
use crate::config::{HeaterConfig, PidGains};
use crate::traits::SensorError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Heater channels a machine may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HeaterId {
    Hotend,
    Bed,
    Chamber,
}

/// One heater: readings, set-point, regulator state and output duty
///
/// Mutated once per control period by the thermal loop and read by the
/// protection supervisor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaterChannel {
    id: HeaterId,
    config: HeaterConfig,
    target: f32,
    temperature: f32,
    sensor_error: Option<SensorError>,
    duty: u8,
    regulator: Regulator,
    residency: ResidencyTimer,
    faulted: bool,
}

impl HeaterChannel {
    pub fn new(id: HeaterId, config: HeaterConfig) -> Self {
        Self {
            id,
            config,
            target: 0.0,
            temperature: 0.0,
            sensor_error: None,
            duty: 0,
            regulator: Regulator::from(&config),
            residency: ResidencyTimer::new(config.residency),
            faulted: false,
        }
    }

    pub fn id(&self) -> HeaterId {
        self.id
    }

    pub fn config(&self) -> &HeaterConfig {
        &self.config
    }

    /// Set-point (°C), 0 when off
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Last valid reading (°C)
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Error of the last sensor read, if it failed
    pub fn sensor_error(&self) -> Option<SensorError> {
        self.sensor_error
    }

    /// Duty commanded for the current period
    pub fn duty(&self) -> u8 {
        self.duty
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Target reached and held for the residency time
    pub fn is_settled(&self) -> bool {
        self.target > 0.0 && self.residency.is_settled()
    }

    /// Output pinned at its ceiling
    pub fn is_saturated(&self) -> bool {
        self.config.max_power > 0 && self.duty >= self.config.max_power
    }

    /// Change the set-point
    ///
    /// Values are clamped to `0..=max_target`; a faulted channel stays at 0.
    /// Returns the applied target.
    pub fn set_target(&mut self, celsius: f32) -> f32 {
        let target = if self.faulted {
            0.0
        } else {
            celsius.clamp(0.0, self.config.max_target())
        };
        if target != self.target {
            self.target = target;
            self.residency.reset();
        }
        target
    }

    /// Install autotuned gains; false for bang-bang heaters
    pub fn set_gains(&mut self, gains: PidGains) -> bool {
        self.regulator.set_gains(gains)
    }

    /// Feed one sensor reading and compute the duty for this period
    pub fn update(&mut self, reading: Result<f32, SensorError>, dt: f32) -> u8 {
        match reading {
            Ok(celsius) => {
                self.temperature = celsius;
                self.sensor_error = None;
            }
            Err(e) => self.sensor_error = Some(e),
        }

        self.duty = if self.faulted || self.sensor_error.is_some() {
            0
        } else {
            self.regulator
                .update(self.target, self.temperature, dt, self.config.max_power)
                .min(self.config.max_power)
        };
        self.residency.update(self.target, self.temperature, dt);
        self.duty
    }

    /// Turn the heater off and drop the set-point
    pub fn shutdown(&mut self) {
        self.target = 0.0;
        self.duty = 0;
        self.regulator.reset();
        self.residency.reset();
    }

    /// Latch a fault; the channel stays off until `clear_fault`
    pub fn fault(&mut self) {
        self.shutdown();
        self.faulted = true;
    }

    pub fn clear_fault(&mut self) {
        self.faulted = false;
    }
}
