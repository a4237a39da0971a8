//! PID autotune using the Åström-Hägglund relay method
//!
//! The heater is switched between off and `relay_output` around the
//! set-point. The resulting limit cycle gives the ultimate gain and period,
//! from which classic Ziegler-Nichols rules derive the PID gains in the
//! per-second units the thermal regulator expects.

use core::f32::consts::PI;

use kinesis_core::config::PidGains;
use kinesis_core::traits::{HeaterOutput, SensorError, TemperatureSensor};

/// Oscillation peaks required for a result
const MIN_PEAKS: usize = 12;

/// Peak storage capacity
const MAX_PEAKS: usize = 24;

/// Smallest usable half peak-to-peak swing (°C)
const MIN_AMPLITUDE: f32 = 0.5;

/// Smallest usable oscillation period, in samples
const MIN_PERIOD_SAMPLES: f32 = 4.0;

/// Autotune state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutotuneState {
    /// Not running
    Idle,
    /// Initial heating to reach the set-point zone
    Heating,
    /// Oscillating around the set-point, collecting peaks
    Cycling,
    /// Gains available
    Complete,
    Failed(AutotuneError),
}

/// Autotune error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutotuneError {
    /// Exceeded the safety limit
    OverTemp,
    /// Took too long to complete
    Timeout,
    /// Temperature sensor error
    SensorFault,
    /// Oscillation too small to measure
    NoOscillation,
    /// User cancelled
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeakType {
    High,
    Low,
}

#[derive(Debug, Clone, Copy)]
struct Peak {
    celsius: f32,
    sample: u32,
    kind: PeakType,
}

/// Autotune configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AutotuneConfig {
    /// Set-point to oscillate around (°C)
    pub target: f32,
    /// Abort above this reading (°C)
    pub max_temp: f32,
    /// Relay band: on below `target - hysteresis`, off above `target + hysteresis`
    pub hysteresis: f32,
    /// Duty while the relay is closed
    pub relay_output: u8,
    /// Sampling period (s)
    pub period_s: f32,
    /// Give up after this long (s)
    pub timeout_s: f32,
}

impl Default for AutotuneConfig {
    fn default() -> Self {
        Self {
            target: 200.0,
            max_temp: 270.0,
            hysteresis: 1.0,
            relay_output: 255,
            period_s: 0.5,
            timeout_s: 1200.0,
        }
    }
}

/// Measured limit cycle and the derived gains
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AutotuneResult {
    pub gains: PidGains,
    /// Ultimate gain (duty per °C)
    pub ku: f32,
    /// Ultimate period (s)
    pub tu: f32,
    /// Half peak-to-peak temperature swing (°C)
    pub amplitude: f32,
}

/// Relay autotuner driving a heater directly
pub struct Autotuner<S, H> {
    sensor: S,
    heater: H,
    config: AutotuneConfig,
    state: AutotuneState,
    samples: u32,
    peaks: heapless::Vec<Peak, MAX_PEAKS>,
    /// Readings seen while cycling, capped at 2
    history: u8,
    last: f32,
    prev: f32,
    relay_on: bool,
    result: Option<AutotuneResult>,
}

impl<S: TemperatureSensor, H: HeaterOutput> Autotuner<S, H> {
    pub fn new(sensor: S, heater: H, config: AutotuneConfig) -> Self {
        Self {
            sensor,
            heater,
            config,
            state: AutotuneState::Idle,
            samples: 0,
            peaks: heapless::Vec::new(),
            history: 0,
            last: 0.0,
            prev: 0.0,
            relay_on: false,
            result: None,
        }
    }

    /// Start heating toward the set-point
    pub fn start(&mut self) {
        self.state = AutotuneState::Heating;
        self.samples = 0;
        self.peaks.clear();
        self.history = 0;
        self.result = None;
        self.set_relay(true);
    }

    pub fn cancel(&mut self) {
        self.finish(AutotuneState::Failed(AutotuneError::Cancelled));
    }

    pub fn state(&self) -> AutotuneState {
        self.state
    }

    pub fn peak_count(&self) -> usize {
        self.peaks.len()
    }

    /// Time since `start` (s)
    pub fn elapsed_s(&self) -> f32 {
        self.samples as f32 * self.config.period_s
    }

    pub fn result(&self) -> Option<&AutotuneResult> {
        self.result.as_ref()
    }

    /// Heater output, for outputs that need periodic servicing
    pub fn heater_mut(&mut self) -> &mut H {
        &mut self.heater
    }

    /// Hand back the sensor and heater
    pub fn release(mut self) -> (S, H) {
        self.heater.off();
        (self.sensor, self.heater)
    }

    /// Take one sample; call once per `period_s`
    pub fn update(&mut self) -> Result<AutotuneState, SensorError> {
        if !matches!(self.state, AutotuneState::Heating | AutotuneState::Cycling) {
            return Ok(self.state);
        }

        let celsius = match self.sensor.read_celsius() {
            Ok(c) => c,
            Err(e) => {
                self.finish(AutotuneState::Failed(AutotuneError::SensorFault));
                return Err(e);
            }
        };

        if celsius >= self.config.max_temp {
            self.finish(AutotuneState::Failed(AutotuneError::OverTemp));
            return Ok(self.state);
        }

        self.samples += 1;
        if self.elapsed_s() >= self.config.timeout_s {
            self.finish(AutotuneState::Failed(AutotuneError::Timeout));
            return Ok(self.state);
        }

        match self.state {
            AutotuneState::Heating => self.run_heating(celsius),
            AutotuneState::Cycling => self.run_cycling(celsius),
            _ => {}
        }

        self.prev = self.last;
        self.last = celsius;
        Ok(self.state)
    }

    fn run_heating(&mut self, celsius: f32) {
        if celsius >= self.config.target - self.config.hysteresis {
            self.state = AutotuneState::Cycling;
            self.set_relay(false);
        }
    }

    fn run_cycling(&mut self, celsius: f32) {
        let high = self.config.target + self.config.hysteresis;
        let low = self.config.target - self.config.hysteresis;
        if celsius >= high && self.relay_on {
            self.set_relay(false);
        } else if celsius <= low && !self.relay_on {
            self.set_relay(true);
        }

        if self.history >= 2 {
            self.detect_peak(celsius);
        } else {
            self.history += 1;
        }

        if self.peaks.len() >= MIN_PEAKS {
            self.calculate_result();
        }
    }

    /// Record `last` if it is a local extremum
    fn detect_peak(&mut self, celsius: f32) {
        let kind = if self.last > self.prev && self.last > celsius {
            PeakType::High
        } else if self.last < self.prev && self.last < celsius {
            PeakType::Low
        } else {
            return;
        };
        let peak = Peak {
            celsius: self.last,
            sample: self.samples - 1,
            kind,
        };
        if self.peaks.push(peak).is_err() {
            self.calculate_result();
        }
    }

    fn calculate_result(&mut self) {
        let Some((amplitude, period_samples)) = self.analyze_peaks() else {
            self.finish(AutotuneState::Failed(AutotuneError::NoOscillation));
            return;
        };
        if amplitude < MIN_AMPLITUDE || period_samples < MIN_PERIOD_SAMPLES {
            self.finish(AutotuneState::Failed(AutotuneError::NoOscillation));
            return;
        }

        // Relay swings ±d around its mean output
        let d = self.config.relay_output as f32 / 2.0;
        let ku = 4.0 * d / (PI * amplitude);
        let tu = period_samples * self.config.period_s;

        let kp = 0.6 * ku;
        let gains = PidGains {
            kp,
            ki: 2.0 * kp / tu,
            kd: kp * tu / 8.0,
        };

        self.result = Some(AutotuneResult {
            gains,
            ku,
            tu,
            amplitude,
        });
        self.finish(AutotuneState::Complete);
    }

    /// Mean half swing and mean period between same-type peaks
    fn analyze_peaks(&self) -> Option<(f32, f32)> {
        let mut high = (0.0f32, 0u32);
        let mut low = (0.0f32, 0u32);
        let mut period_sum = 0u32;
        let mut period_count = 0u32;
        let mut last_high: Option<u32> = None;
        let mut last_low: Option<u32> = None;

        for peak in self.peaks.iter() {
            let (acc, last) = match peak.kind {
                PeakType::High => (&mut high, &mut last_high),
                PeakType::Low => (&mut low, &mut last_low),
            };
            acc.0 += peak.celsius;
            acc.1 += 1;
            if let Some(prev) = last.replace(peak.sample) {
                period_sum += peak.sample - prev;
                period_count += 1;
            }
        }

        if high.1 < 2 || low.1 < 2 || period_count == 0 {
            return None;
        }
        let avg_high = high.0 / high.1 as f32;
        let avg_low = low.0 / low.1 as f32;
        Some((
            (avg_high - avg_low) / 2.0,
            period_sum as f32 / period_count as f32,
        ))
    }

    fn set_relay(&mut self, on: bool) {
        self.relay_on = on;
        if on {
            self.heater.set_duty(self.config.relay_output);
        } else {
            self.heater.off();
        }
    }

    fn finish(&mut self, state: AutotuneState) {
        self.set_relay(false);
        self.state = state;
    }
}
