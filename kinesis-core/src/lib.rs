//! Board-agnostic motion and thermal safety core
//!
//! This crate contains all real-time motion and heater logic that does not
//! depend on specific hardware implementations:
//!
//! - Hardware abstraction traits (step/dir output, endstops, heaters, probe)
//! - Kinematic transforms (Cartesian, Core variants, delta, SCARA)
//! - Bed-leveling compensation (plane, bilinear, unified mesh)
//! - Trajectory planner with look-ahead and the planner→stepper queue
//! - Step pulse scheduler (trapezoidal and S-curve profiles)
//! - Heater regulation (PID, bang-bang) and thermal protection
//! - Homing state machine and the emergency-stop signal
//! - Configuration type definitions

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod leveling;
pub mod machine;
pub mod motion;
pub mod report;
pub mod safety;
pub mod scheduler;
pub mod state;
pub mod thermal;
pub mod traits;

pub use machine::Machine;
