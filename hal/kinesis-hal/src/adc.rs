//! Analog input abstraction

/// ADC failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcError {
    /// Conversion did not complete
    Timeout,
    /// Peripheral reported an invalid sample
    Conversion,
}

/// One analog input channel
pub trait AdcChannel {
    /// Full scale count plus one (4096 for a 12-bit converter)
    const RANGE: u16;

    /// Take one sample
    fn read(&mut self) -> Result<u16, AdcError>;
}
