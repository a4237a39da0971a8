//! Kinesis Hardware Abstraction Layer
//!
//! Traits that chip-specific code implements so the drivers crate can run
//! on any board (and on the host under test).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  kinesis-firmware (board bindings)      │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  kinesis-drivers (step/dir, heaters,    │
//! │  endstops, thermistors)                 │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  kinesis-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`], [`gpio::InputPin`] - Digital I/O
//! - [`pwm::PwmOutput`] - Duty-cycle outputs
//! - [`adc::AdcChannel`] - Analog inputs

#![no_std]
#![deny(unsafe_code)]

pub mod adc;
pub mod gpio;
pub mod pwm;

pub use adc::{AdcChannel, AdcError};
pub use gpio::{ActiveLevel, InputPin, OutputPin};
pub use pwm::PwmOutput;
