//! Board bindings
//!
//! Pin map of the SKR Pico and the glue between embassy-rp peripherals and
//! the kinesis-hal traits the drivers are written against.

use core::cell::RefCell;

use defmt::*;
use embassy_rp::adc::{Adc, Blocking, Channel};
use embassy_rp::gpio::{Input, Output};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::pwm::SetDutyCycle;
use kinesis_hal::{AdcChannel, AdcError, InputPin, OutputPin, PwmOutput};

/// 4.7 kΩ thermistor pull-ups on TH0 and THB
pub const THERMISTOR_PULLUP_OHMS: f32 = 4700.0;

/// Bed SSR proportioning window, in control periods
pub const BED_SSR_WINDOW: u16 = 20;

/// Push-pull GPIO output
pub struct Pin(pub Output<'static>);

impl OutputPin for Pin {
    fn set_high(&mut self) {
        self.0.set_high();
    }

    fn set_low(&mut self) {
        self.0.set_low();
    }

    fn is_set_high(&self) -> bool {
        self.0.is_set_high()
    }
}

/// GPIO input with the board's pull configuration
pub struct Switch(pub Input<'static>);

impl InputPin for Switch {
    fn is_high(&self) -> bool {
        self.0.is_high()
    }
}

/// Any embedded-hal PWM channel
pub struct Pwm<P>(pub P);

impl<P: SetDutyCycle> PwmOutput for Pwm<P> {
    fn max_duty(&self) -> u16 {
        self.0.max_duty_cycle()
    }

    fn set_duty(&mut self, duty: u16) {
        if self.0.set_duty_cycle(duty).is_err() {
            warn!("PWM duty {} rejected", duty);
        }
    }
}

/// The single ADC block, shared by every thermistor input
static ADC: Mutex<CriticalSectionRawMutex, RefCell<Option<Adc<'static, Blocking>>>> =
    Mutex::new(RefCell::new(None));

/// Hand the ADC peripheral to the thermistor inputs
pub fn install_adc(adc: Adc<'static, Blocking>) {
    ADC.lock(|cell| *cell.borrow_mut() = Some(adc));
}

/// One ADC input pin
pub struct AdcInput {
    channel: Channel<'static>,
}

impl AdcInput {
    pub fn new(channel: Channel<'static>) -> Self {
        Self { channel }
    }
}

impl AdcChannel for AdcInput {
    const RANGE: u16 = 4096;

    fn read(&mut self) -> Result<u16, AdcError> {
        let channel = &mut self.channel;
        ADC.lock(|cell| match cell.borrow_mut().as_mut() {
            Some(adc) => adc.blocking_read(channel).map_err(|_| AdcError::Conversion),
            None => Err(AdcError::Timeout),
        })
    }
}
