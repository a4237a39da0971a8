//! Bang-bang heater law

/// On/off control with a hysteresis band around target
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BangBang {
    hysteresis: f32,
    on: bool,
}

impl BangBang {
    pub fn new(hysteresis: f32) -> Self {
        Self {
            hysteresis,
            on: false,
        }
    }

    /// Whether the output is currently on
    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn reset(&mut self) {
        self.on = false;
    }

    /// One control step; full power below the band, off above it, unchanged inside
    pub fn update(&mut self, target: f32, temperature: f32, max_power: u8) -> u8 {
        if target <= 0.0 || temperature >= target + self.hysteresis {
            self.on = false;
        } else if temperature <= target - self.hysteresis {
            self.on = true;
        }
        if self.on {
            max_power
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hysteresis_band() {
        let mut bb = BangBang::new(2.0);
        assert_eq!(bb.update(60.0, 50.0, 255), 255);
        // Inside the band: keep heating
        assert_eq!(bb.update(60.0, 61.0, 255), 255);
        assert_eq!(bb.update(60.0, 62.0, 255), 0);
        // Inside the band: stay off
        assert_eq!(bb.update(60.0, 59.0, 255), 0);
        assert_eq!(bb.update(60.0, 58.0, 255), 255);
    }

    #[test]
    fn test_zero_target_is_off() {
        let mut bb = BangBang::new(2.0);
        assert_eq!(bb.update(0.0, 20.0, 255), 0);
        assert!(!bb.is_on());
    }

    #[test]
    fn test_max_power_applied() {
        let mut bb = BangBang::new(2.0);
        assert_eq!(bb.update(60.0, 20.0, 180), 180);
    }
}
