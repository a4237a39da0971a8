//! NTC 100K thermistor sensor
//!
//! The common 100K / beta 3950 thermistor read through a pull-up divider.
//! Resistance is converted with a lookup table and interpolated on
//! ln(R), which tracks the beta curve to within a quarter degree.

use kinesis_core::traits::{SensorError, TemperatureSensor};
use kinesis_hal::AdcChannel;

/// Resistance (ohms) at each table temperature (°C)
///
/// Beta equation with R0 = 100 kΩ at 25 °C and B = 3950, every 10 °C.
/// Sorted by decreasing resistance.
const TEMP_TABLE: &[(f32, f32)] = &[
    (1_053_847.0, -20.0),
    (582_457.0, -10.0),
    (336_206.0, 0.0),
    (201_746.0, 10.0),
    (125_353.0, 20.0),
    (80_371.0, 30.0),
    (53_015.0, 40.0),
    (35_882.0, 50.0),
    (24_862.0, 60.0),
    (17_598.0, 70.0),
    (12_703.0, 80.0),
    (9_336.0, 90.0),
    (6_975.0, 100.0),
    (5_291.0, 110.0),
    (4_071.0, 120.0),
    (3_173.0, 130.0),
    (2_503.0, 140.0),
    (1_997.0, 150.0),
    (1_610.0, 160.0),
    (1_310.0, 170.0),
    (1_076.0, 180.0),
    (892.0, 190.0),
    (745.0, 200.0),
    (626.0, 210.0),
    (531.0, 220.0),
    (453.0, 230.0),
    (388.0, 240.0),
    (335.0, 250.0),
    (291.0, 260.0),
    (254.0, 270.0),
    (223.0, 280.0),
    (196.0, 290.0),
    (174.0, 300.0),
];

/// Counts at either rail treated as a wiring fault
const RAIL_MARGIN: u16 = 10;

/// NTC 100K thermistor with B=3950
pub struct Ntc100kSensor<A> {
    adc: A,
    /// Pull-up resistor value in ohms
    pullup_ohms: f32,
}

impl<A: AdcChannel> Ntc100kSensor<A> {
    /// Create a new NTC sensor
    ///
    /// `pullup_ohms` is the divider's upper resistor (4.7 kΩ on most boards).
    pub fn new(adc: A, pullup_ohms: f32) -> Self {
        Self { adc, pullup_ohms }
    }

    /// Convert an ADC sample to thermistor resistance
    ///
    /// Circuit: VREF -- pullup -- ADC_PIN -- NTC -- GND
    pub fn adc_to_resistance(&self, sample: u16) -> Result<f32, SensorError> {
        let range = A::RANGE;
        if sample >= range.saturating_sub(RAIL_MARGIN) {
            return Err(SensorError::OpenCircuit);
        }
        if sample < RAIL_MARGIN {
            return Err(SensorError::ShortCircuit);
        }
        let sample = sample as f32;
        Ok(self.pullup_ohms * sample / (range as f32 - sample))
    }
}

/// Temperature for a thermistor resistance
pub fn resistance_to_celsius(ohms: f32) -> Result<f32, SensorError> {
    let (first, last) = match (TEMP_TABLE.first(), TEMP_TABLE.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(SensorError::OutOfRange),
    };
    if !(ohms <= first.0 && ohms >= last.0) {
        return Err(SensorError::OutOfRange);
    }

    for pair in TEMP_TABLE.windows(2) {
        let (r_high, t_low) = pair[0];
        let (r_low, t_high) = pair[1];
        if ohms <= r_high && ohms >= r_low {
            let span = libm::logf(r_high) - libm::logf(r_low);
            let offset = libm::logf(r_high) - libm::logf(ohms);
            return Ok(t_low + (t_high - t_low) * offset / span);
        }
    }
    Err(SensorError::OutOfRange)
}

impl<A: AdcChannel> TemperatureSensor for Ntc100kSensor<A> {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        let sample = self.adc.read().map_err(|_| SensorError::ConversionError)?;
        let ohms = self.adc_to_resistance(sample)?;
        resistance_to_celsius(ohms)
    }
}
