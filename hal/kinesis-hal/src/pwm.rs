//! PWM output abstraction

/// One hardware PWM channel
///
/// Duty is expressed against the channel's own `max_duty`, which depends
/// on the timer's TOP value chosen for the output frequency.
pub trait PwmOutput {
    /// Counter value that represents 100 % duty
    fn max_duty(&self) -> u16;

    /// Apply a raw duty value, `0..=max_duty()`
    fn set_duty(&mut self, duty: u16);

    /// Drive the channel fully off
    fn disable(&mut self) {
        self.set_duty(0);
    }
}
