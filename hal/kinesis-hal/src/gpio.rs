//! GPIO pin abstractions
//!
//! Step, direction and enable lines as well as endstop switches are plain
//! digital pins. Boards differ in which electrical level means "active",
//! so drivers carry an [`ActiveLevel`] next to each pin.

/// Digital output pin
pub trait OutputPin {
    /// Set the pin high (logic 1)
    fn set_high(&mut self);

    /// Set the pin low (logic 0)
    fn set_low(&mut self);

    /// Set the pin to a specific level
    fn set_state(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }

    /// Check if the pin is currently driven high
    fn is_set_high(&self) -> bool;
}

/// Digital input pin
pub trait InputPin {
    /// Check if the pin reads high (logic 1)
    fn is_high(&self) -> bool;

    /// Check if the pin reads low (logic 0)
    fn is_low(&self) -> bool {
        !self.is_high()
    }
}

/// Electrical level that represents the asserted state of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveLevel {
    #[default]
    High,
    Low,
}

impl ActiveLevel {
    /// Pin level that encodes `active`
    pub fn level(self, active: bool) -> bool {
        match self {
            ActiveLevel::High => active,
            ActiveLevel::Low => !active,
        }
    }

    /// Drive `pin` to the asserted or released state
    pub fn drive<P: OutputPin>(self, pin: &mut P, active: bool) {
        pin.set_state(self.level(active));
    }

    /// Whether `pin` currently reads as asserted
    pub fn is_active<P: InputPin>(self, pin: &P) -> bool {
        self.level(pin.is_high())
    }
}
