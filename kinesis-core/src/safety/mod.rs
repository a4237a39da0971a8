//! Safety signals
//!
//! The emergency stop shared by every context and the per-heater thermal
//! protection supervisor that can assert it.

pub mod estop;
pub mod monitor;

pub use estop::{EmergencyStop, StopCause};
pub use monitor::{ProtectionState, ThermalFault, ThermalSupervisor};
