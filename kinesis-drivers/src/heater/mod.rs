//! Heater outputs and tuning

pub mod autotune;
pub mod pwm;
pub mod ssr;

pub use autotune::{AutotuneConfig, AutotuneError, AutotuneResult, AutotuneState, Autotuner};
pub use pwm::PwmHeater;
pub use ssr::SsrHeater;
