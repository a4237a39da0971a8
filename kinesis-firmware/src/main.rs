//! Kinesis - printer motion and thermal firmware
//!
//! Firmware binary for the BTT SKR Pico (RP2040). Step generation runs on
//! a high-priority interrupt executor; the control loop, heater I/O and
//! the host link share the thread executor.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::adc::{Adc, Channel as AdcPin, Config as AdcConfig};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{AnyPin, Input, Level, Output, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::UART0;
use embassy_rp::Peri;
use embassy_rp::pwm::{Config as PwmConfig, Pwm as PwmSlice};
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUart, Config as UartConfig};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use kinesis_core::config::MachineConfig;
use kinesis_core::scheduler::SchedulerTiming;
use kinesis_core::thermal::HeaterId;
use kinesis_core::Machine;
use kinesis_drivers::endstop::SwitchEndstops;
use kinesis_drivers::heater::{PwmHeater, SsrHeater};
use kinesis_drivers::sensor::Ntc100kSensor;
use kinesis_drivers::stepper::StepDirPins;
use kinesis_hal::ActiveLevel;

use crate::board::{AdcInput, Pin, Pwm, Switch, BED_SSR_WINDOW, THERMISTOR_PULLUP_OHMS};
use crate::channels::MOTION;
use crate::controller::{Controller, HeaterIo};

mod board;
mod channels;
mod controller;
mod link;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt()
}

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

/// Host link baud rate
const LINK_BAUD: u32 = 250_000;

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Kinesis firmware starting...");

    let p = embassy_rp::init(Default::default());

    let config = MachineConfig::default();
    let machine = match Machine::new(&config, &MOTION) {
        Ok(machine) => machine,
        Err(e) => defmt::panic!("Invalid machine configuration: {:?}", e),
    };

    // Stepper drivers, SKR Pico sockets X/Y/Z/E: STEP, DIR, EN
    let out = |pin: Peri<'static, AnyPin>| Pin(Output::new(pin, Level::Low));
    let stepper = StepDirPins::new(
        [out(p.PIN_11.into()), out(p.PIN_6.into()), out(p.PIN_19.into()), out(p.PIN_14.into())],
        [out(p.PIN_10.into()), out(p.PIN_5.into()), out(p.PIN_28.into()), out(p.PIN_13.into())],
        [out(p.PIN_12.into()), out(p.PIN_7.into()), out(p.PIN_2.into()), out(p.PIN_15.into())],
        embassy_time::Delay,
        config.motion.pulse,
    );

    // Endstop connectors, pulled up and open when triggered
    let switch = |pin: Peri<'static, AnyPin>| Switch(Input::new(pin, Pull::Up));
    let endstops = SwitchEndstops::new([
        switch(p.PIN_4.into()),
        switch(p.PIN_3.into()),
        switch(p.PIN_25.into()),
    ]);

    info!("Steppers and endstops initialized");

    // Thermistors TH0 (hotend) and THB (bed) share the ADC
    board::install_adc(Adc::new_blocking(p.ADC, AdcConfig::default()));
    let hotend_sensor = Ntc100kSensor::new(
        AdcInput::new(AdcPin::new_pin(p.PIN_27, Pull::None)),
        THERMISTOR_PULLUP_OHMS,
    );
    let bed_sensor = Ntc100kSensor::new(
        AdcInput::new(AdcPin::new_pin(p.PIN_26, Pull::None)),
        THERMISTOR_PULLUP_OHMS,
    );

    // HE0 on PWM slice 3 channel B; HB drives the bed SSR
    let mut pwm_config = PwmConfig::default();
    pwm_config.top = u16::MAX;
    let (_, hotend_pwm) = PwmSlice::new_output_b(p.PWM_SLICE3, p.PIN_23, pwm_config).split();
    let hotend_heater = PwmHeater::new(Pwm(unwrap!(hotend_pwm)));
    let bed_heater = SsrHeater::new(
        Pin(Output::new(p.PIN_21, Level::Low)),
        ActiveLevel::High,
        BED_SSR_WINDOW,
    );

    info!("Heaters initialized");

    let controller = Controller::new(
        machine,
        HeaterIo::new(HeaterId::Hotend, hotend_sensor, hotend_heater),
        HeaterIo::new(HeaterId::Bed, bed_sensor, bed_heater),
    );

    // Host link on UART0 (GPIO0 TX, GPIO1 RX)
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = LINK_BAUD;
    let uart = BufferedUart::new(
        p.UART0,
        p.PIN_0,
        p.PIN_1,
        Irqs,
        TX_BUF.init([0; 256]),
        RX_BUF.init([0; 256]),
        uart_config,
    );
    let (tx, rx) = uart.split();

    info!("Host link initialized at {} baud", LINK_BAUD);

    // Step generation preempts everything else
    interrupt::SWI_IRQ_1.set_priority(Priority::P1);
    let high = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    let timing = SchedulerTiming::new(config.motion.step_timer_hz, &config.motion.pulse);
    high.spawn(unwrap!(tasks::step_task(stepper, endstops, timing)));

    spawner.spawn(unwrap!(tasks::control_task(controller)));
    spawner.spawn(unwrap!(tasks::link_rx_task(rx)));
    spawner.spawn(unwrap!(tasks::link_tx_task(tx)));

    info!("All tasks spawned, firmware running");
}
