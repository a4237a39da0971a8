//! Step pulse scheduler
//!
//! Interrupt-side half of the motion pipeline: drains the planner queue
//! and turns each block into timed step pulses.

pub mod executor;
pub mod profile;

pub use executor::{SchedulerTiming, StepScheduler};
