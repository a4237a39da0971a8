//! Hardware driver implementations
//!
//! Concrete implementations of the traits defined in kinesis-core, built
//! on the pin/PWM/ADC traits of kinesis-hal:
//!
//! - Step/direction pulse output with driver timing guarantees
//! - Endstop switch inputs
//! - Heater outputs (hardware PWM, slow time-proportioning SSR)
//! - Temperature sensors (NTC 100K thermistor)
//! - Relay PID autotune

#![no_std]
#![deny(unsafe_code)]

pub mod endstop;
pub mod heater;
pub mod sensor;
pub mod stepper;
