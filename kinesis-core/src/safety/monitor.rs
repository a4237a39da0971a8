//! Thermal protection supervisor
//!
//! One supervisor watches one heater channel:
//!
//! ```text
//! Idle --target set--> Heating --residency met--> Stable
//!   ^                     |  ^                       |
//!   +----target 0---------+  +----target changed-----+
//!
//! any state --limit breach / watchdog--> Fault (latched)
//! ```
//!
//! Two watchdogs run on top of the absolute limits. While heating with a
//! saturated output the temperature must rise by `watch_increase` within
//! every `watch_period_s`. Once stable it must not stay more than
//! `runaway_hysteresis` below target for longer than `runaway_period_s`.

use crate::config::ProtectionConfig;
use crate::thermal::HeaterChannel;

/// Thermal fault causes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThermalFault {
    /// Reading below the minimum temperature
    MinTemp,
    /// Reading above the maximum temperature
    MaxTemp,
    /// Saturated heater did not warm up within the watch period
    HeatingFailed,
    /// Stable heater drifted away from target for too long
    Runaway,
    /// Sensor reported an electrical fault
    SensorFault,
}

/// Protection state of a heater
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtectionState {
    Idle,
    Heating,
    Stable,
    Fault,
}

/// Heating progress window
#[derive(Debug, Clone, Copy, PartialEq)]
struct Watch {
    baseline: f32,
    elapsed: f32,
}

/// Protection state machine for one heater channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalSupervisor {
    state: ProtectionState,
    fault: Option<ThermalFault>,
    target: f32,
    watch: Option<Watch>,
    /// Time spent below the runaway band while stable (s)
    drift: f32,
}

impl Default for ThermalSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ThermalSupervisor {
    pub const fn new() -> Self {
        Self {
            state: ProtectionState::Idle,
            fault: None,
            target: 0.0,
            watch: None,
            drift: 0.0,
        }
    }

    pub fn state(&self) -> ProtectionState {
        self.state
    }

    /// Latched fault cause
    pub fn fault(&self) -> Option<ThermalFault> {
        self.fault
    }

    /// Evaluate the channel after its control update
    ///
    /// `dt` is the control period in seconds. A fault is latched and
    /// returned on every later call until `reset`.
    pub fn observe(
        &mut self,
        channel: &HeaterChannel,
        dt: f32,
    ) -> Result<ProtectionState, ThermalFault> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }
        match self.check(channel, dt) {
            Ok(state) => {
                self.state = state;
                Ok(state)
            }
            Err(fault) => {
                #[cfg(feature = "defmt")]
                defmt::error!(
                    "thermal fault on {}: {} at {} C",
                    channel.id(),
                    fault,
                    channel.temperature()
                );
                self.state = ProtectionState::Fault;
                self.fault = Some(fault);
                Err(fault)
            }
        }
    }

    /// Return to Idle after the operator acknowledged a fault
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn check(&mut self, channel: &HeaterChannel, dt: f32) -> Result<ProtectionState, ThermalFault> {
        if channel.sensor_error().is_some() {
            return Err(ThermalFault::SensorFault);
        }
        let config = channel.config();
        let temperature = channel.temperature();
        if temperature > config.max_temp {
            return Err(ThermalFault::MaxTemp);
        }
        if temperature < config.min_temp {
            return Err(ThermalFault::MinTemp);
        }

        let target = channel.target();
        if target <= 0.0 {
            self.target = 0.0;
            self.watch = None;
            self.drift = 0.0;
            return Ok(ProtectionState::Idle);
        }

        let mut state = self.state;
        if target != self.target || state == ProtectionState::Idle {
            self.target = target;
            self.watch = None;
            self.drift = 0.0;
            state = ProtectionState::Heating;
        }

        let Some(protection) = config.protection else {
            return Ok(if channel.is_settled() {
                ProtectionState::Stable
            } else {
                ProtectionState::Heating
            });
        };

        match state {
            ProtectionState::Heating => {
                self.watch_heating(channel, &protection, dt)?;
                if channel.is_settled() {
                    self.watch = None;
                    state = ProtectionState::Stable;
                }
            }
            ProtectionState::Stable => {
                if temperature < target - protection.runaway_hysteresis {
                    self.drift += dt;
                    if self.drift >= protection.runaway_period_s {
                        return Err(ThermalFault::Runaway);
                    }
                } else {
                    self.drift = 0.0;
                }
            }
            ProtectionState::Idle | ProtectionState::Fault => {}
        }
        Ok(state)
    }

    fn watch_heating(
        &mut self,
        channel: &HeaterChannel,
        protection: &ProtectionConfig,
        dt: f32,
    ) -> Result<(), ThermalFault> {
        let temperature = channel.temperature();
        let below = temperature < channel.target() - protection.runaway_hysteresis;
        if !(below && channel.is_saturated()) {
            self.watch = None;
            return Ok(());
        }

        match &mut self.watch {
            None => {
                self.watch = Some(Watch {
                    baseline: temperature,
                    elapsed: 0.0,
                });
            }
            Some(watch) => {
                watch.elapsed += dt;
                if temperature >= watch.baseline + protection.watch_increase {
                    *watch = Watch {
                        baseline: temperature,
                        elapsed: 0.0,
                    };
                } else if watch.elapsed >= protection.watch_period_s {
                    return Err(ThermalFault::HeatingFailed);
                }
            }
        }
        Ok(())
    }
}
