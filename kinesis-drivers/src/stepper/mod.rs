//! Stepper driver outputs

pub mod step_dir;

pub use step_dir::StepDirPins;
