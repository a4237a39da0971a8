//! Step/direction driver output
//!
//! Drives A4988/TMC-style drivers in standalone step/dir mode. Every axis
//! has its own STEP and DIR line. Boards wire EN either per driver or as one
//! shared line; all EN lines switch together.
//! Pulses for all axes in one scheduler tick go out together: every STEP
//! line rises, the pulse width elapses once, then every line falls.

use embedded_hal::delay::DelayNs;
use heapless::Vec;
use kinesis_core::motion::NUM_AXES;
use kinesis_core::traits::{PulseTiming, StepperOutput};
use kinesis_hal::{ActiveLevel, OutputPin};

/// STEP/DIR/EN lines for every planned axis
pub struct StepDirPins<P, D> {
    step: [P; NUM_AXES],
    dir: [P; NUM_AXES],
    enable: Vec<P, NUM_AXES>,
    delay: D,
    timing: PulseTiming,
    /// Axes whose motor is wired reversed
    invert_dir: u8,
    /// Last DIR mask written, after inversion
    dir_state: u8,
    enabled: bool,
}

impl<P: OutputPin, D: DelayNs> StepDirPins<P, D> {
    /// Take ownership of the pins; drivers start disabled with STEP low
    ///
    /// `enable` holds one shared line or one line per driver; lines past
    /// the axis count are dropped.
    pub fn new(
        step: [P; NUM_AXES],
        dir: [P; NUM_AXES],
        enable: impl IntoIterator<Item = P>,
        delay: D,
        timing: PulseTiming,
    ) -> Self {
        let mut pins = Self {
            step,
            dir,
            enable: enable.into_iter().take(NUM_AXES).collect(),
            delay,
            timing,
            invert_dir: 0,
            dir_state: 0,
            enabled: false,
        };
        for (step, dir) in pins.step.iter_mut().zip(pins.dir.iter_mut()) {
            step.set_low();
            dir.set_low();
        }
        pins.enable(false);
        pins
    }

    /// Reverse the DIR sense of the axes in `mask`
    pub fn with_inverted_dir(mut self, mask: u8) -> Self {
        self.invert_dir = mask;
        self
    }

    pub fn timing(&self) -> &PulseTiming {
        &self.timing
    }

    fn enable_level(&self) -> ActiveLevel {
        if self.timing.enable_active_high {
            ActiveLevel::High
        } else {
            ActiveLevel::Low
        }
    }
}

impl<P: OutputPin, D: DelayNs> StepperOutput for StepDirPins<P, D> {
    fn set_directions(&mut self, negative_mask: u8) {
        let state = negative_mask ^ self.invert_dir;
        let changed = state ^ self.dir_state;
        if changed == 0 {
            return;
        }
        for (i, dir) in self.dir.iter_mut().enumerate() {
            if changed & (1 << i) != 0 {
                dir.set_state(state & (1 << i) != 0);
            }
        }
        self.dir_state = state;
        self.delay.delay_ns(self.timing.dir_setup_ns);
    }

    fn pulse(&mut self, axis_mask: u8) {
        if axis_mask == 0 {
            return;
        }
        for (i, step) in self.step.iter_mut().enumerate() {
            if axis_mask & (1 << i) != 0 {
                step.set_high();
            }
        }
        self.delay.delay_ns(self.timing.pulse_width_ns);
        for (i, step) in self.step.iter_mut().enumerate() {
            if axis_mask & (1 << i) != 0 {
                step.set_low();
            }
        }
    }

    fn enable(&mut self, enabled: bool) {
        let level = self.enable_level();
        for pin in self.enable.iter_mut() {
            level.drive(pin, enabled);
        }
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
