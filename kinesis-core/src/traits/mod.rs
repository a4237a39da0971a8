//! Hardware abstraction traits
//!
//! These traits define the interface between the motion/thermal logic
//! and hardware-specific implementations.

pub mod endstop;
pub mod heater;
pub mod probe;
pub mod stepper;

pub use endstop::EndstopReader;
pub use heater::{HeaterOutput, SensorError, TemperatureSensor};
pub use probe::{ProbeError, ZProbe};
pub use stepper::{PulseTiming, StepperOutput, ALL_AXES_MASK};
