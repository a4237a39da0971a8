//! Heater and temperature sensor traits

/// Errors that can occur with temperature sensing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Sensor disconnected (open circuit)
    OpenCircuit,
    /// Sensor shorted to ground
    ShortCircuit,
    /// Reading out of expected range
    OutOfRange,
    /// ADC conversion error
    ConversionError,
}

/// Trait for temperature sensors
///
/// Implementations should handle the specific sensor type (NTC thermistor,
/// thermocouple, PT100, etc.)
pub trait TemperatureSensor {
    /// Read the current temperature in degrees Celsius
    ///
    /// Takes `&mut self` because ADC reads typically require mutable access.
    fn read_celsius(&mut self) -> Result<f32, SensorError>;

    /// Check if the sensor reading is valid
    fn is_valid(&mut self) -> bool {
        self.read_celsius().is_ok()
    }
}

/// Trait for heater power outputs
///
/// Duty is on the 0..=255 scale used throughout the thermal code
/// (0 = off, 255 = full power). Implementations map it onto hardware
/// PWM, a slow time-proportioning SSR cycle, or a plain on/off pin.
pub trait HeaterOutput {
    /// Apply a new duty value
    fn set_duty(&mut self, duty: u8);

    /// Currently applied duty
    fn duty(&self) -> u8;

    /// Force the output off
    fn off(&mut self) {
        self.set_duty(0);
    }

    /// Check if the heater is currently powered at all
    fn is_on(&self) -> bool {
        self.duty() > 0
    }
}
