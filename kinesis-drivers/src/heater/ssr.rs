//! Slow time-proportioning heater output
//!
//! Solid-state relays and mains beds cannot follow kilohertz PWM. Instead
//! the duty is spread over a fixed window of `tick` calls: the relay is
//! closed for the first `duty * window / 255` ticks of every window.

use kinesis_core::config::DUTY_MAX;
use kinesis_core::traits::HeaterOutput;
use kinesis_hal::{ActiveLevel, OutputPin};

/// Relay output driven from a periodic tick
pub struct SsrHeater<P> {
    pin: P,
    level: ActiveLevel,
    /// Ticks per proportioning window
    window: u16,
    /// Position inside the current window
    phase: u16,
    duty: u8,
    on: bool,
}

impl<P: OutputPin> SsrHeater<P> {
    /// Create the output with the relay open
    ///
    /// A window of 0 is treated as 1 (plain on/off).
    pub fn new(pin: P, level: ActiveLevel, window: u16) -> Self {
        let mut heater = Self {
            pin,
            level,
            window: window.max(1),
            phase: 0,
            duty: 0,
            on: false,
        };
        heater.drive(false);
        heater
    }

    /// Advance one tick and switch the relay for it
    pub fn tick(&mut self) {
        let on_ticks = self.on_ticks();
        self.drive(self.phase < on_ticks);
        self.phase += 1;
        if self.phase >= self.window {
            self.phase = 0;
        }
    }

    /// Whether the relay is currently closed
    pub fn is_energized(&self) -> bool {
        self.on
    }

    fn on_ticks(&self) -> u16 {
        (self.window as u32 * self.duty as u32 / DUTY_MAX as u32) as u16
    }

    fn drive(&mut self, on: bool) {
        self.level.drive(&mut self.pin, on);
        self.on = on;
    }
}

impl<P: OutputPin> HeaterOutput for SsrHeater<P> {
    fn set_duty(&mut self, duty: u8) {
        self.duty = duty;
        if duty == 0 {
            self.drive(false);
        }
    }

    fn duty(&self) -> u8 {
        self.duty
    }
}
