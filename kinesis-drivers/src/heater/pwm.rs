//! Hardware PWM heater output
//!
//! For MOSFET-driven hotends. The 0..=255 duty scale of the thermal loop is
//! mapped onto the channel's counter range.

use kinesis_core::config::DUTY_MAX;
use kinesis_core::traits::HeaterOutput;
use kinesis_hal::PwmOutput;

pub struct PwmHeater<P> {
    pwm: P,
    duty: u8,
}

impl<P: PwmOutput> PwmHeater<P> {
    /// Wrap a PWM channel; the heater starts off
    pub fn new(pwm: P) -> Self {
        let mut heater = Self { pwm, duty: 0 };
        heater.pwm.disable();
        heater
    }

    /// Counter value for a duty on the 0..=255 scale
    fn raw(&self, duty: u8) -> u16 {
        let max = self.pwm.max_duty() as u32;
        (max * duty as u32 / DUTY_MAX as u32) as u16
    }
}

impl<P: PwmOutput> HeaterOutput for PwmHeater<P> {
    fn set_duty(&mut self, duty: u8) {
        if duty == 0 {
            self.pwm.disable();
        } else {
            let raw = self.raw(duty);
            self.pwm.set_duty(raw);
        }
        self.duty = duty;
    }

    fn duty(&self) -> u8 {
        self.duty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockPwm {
        top: u16,
        raw: u16,
    }

    impl PwmOutput for MockPwm {
        fn max_duty(&self) -> u16 {
            self.top
        }

        fn set_duty(&mut self, duty: u16) {
            self.raw = duty;
        }
    }

    #[test]
    fn test_starts_off() {
        let heater = PwmHeater::new(MockPwm { top: 1000, raw: 500 });
        assert_eq!(heater.pwm.raw, 0);
        assert!(!heater.is_on());
    }

    #[test]
    fn test_duty_scaled_to_counter() {
        let mut heater = PwmHeater::new(MockPwm { top: 1000, raw: 0 });
        heater.set_duty(255);
        assert_eq!(heater.pwm.raw, 1000);
        heater.set_duty(51);
        assert_eq!(heater.pwm.raw, 200);
        assert_eq!(heater.duty(), 51);

        heater.off();
        assert_eq!(heater.pwm.raw, 0);
        assert!(!heater.is_on());
    }
}
