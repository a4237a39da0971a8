//! PID heater law
//!
//! Full power while far below target, off while far above, PID inside the
//! functional range. The integral only accumulates inside the range and is
//! reset on every entry, so a long heat-up never winds it up. The
//! derivative acts on the measurement and is low-pass filtered.

use crate::config::PidGains;

/// Derivative filter weight of the previous value
const D_SMOOTHING: f32 = 0.95;

/// PID state for one heater
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pid {
    gains: PidGains,
    functional_range: f32,
    /// Accumulated error (°C·s)
    integral: f32,
    /// Filtered derivative term (duty units)
    d_term: f32,
    last_temp: Option<f32>,
    in_range: bool,
}

impl Pid {
    pub fn new(gains: PidGains, functional_range: f32) -> Self {
        Self {
            gains,
            functional_range,
            integral: 0.0,
            d_term: 0.0,
            last_temp: None,
            in_range: false,
        }
    }

    /// Gains in use
    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    /// Replace the gains (after autotune) and restart
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
        self.reset();
    }

    /// Integral accumulator (°C·s)
    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Forget accumulated state
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.d_term = 0.0;
        self.last_temp = None;
        self.in_range = false;
    }

    /// One control step; returns duty in `0..=max_power`
    pub fn update(&mut self, target: f32, temperature: f32, dt: f32, max_power: u8) -> u8 {
        let max = max_power as f32;
        let error = target - temperature;
        let previous = self.last_temp.replace(temperature);

        if target <= 0.0 || error < -self.functional_range {
            self.in_range = false;
            return 0;
        }
        if error > self.functional_range {
            self.in_range = false;
            return max_power;
        }
        if !self.in_range {
            self.in_range = true;
            self.integral = 0.0;
            self.d_term = 0.0;
        }

        let p = self.gains.kp * error;

        self.integral += error * dt;
        if self.gains.ki > 0.0 {
            self.integral = self.integral.clamp(0.0, max / self.gains.ki);
        }
        let i = self.gains.ki * self.integral;

        if let Some(prev) = previous {
            if dt > 0.0 {
                let raw = self.gains.kd * (prev - temperature) / dt;
                self.d_term = (1.0 - D_SMOOTHING) * raw + D_SMOOTHING * self.d_term;
            }
        }

        let output = p + i + self.d_term;
        output.clamp(0.0, max) as u8
    }
}
