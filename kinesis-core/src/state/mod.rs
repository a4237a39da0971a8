//! Operating state of the machine
//!
//! Gates which collaborator requests are accepted. The state machine is
//! explicit, finite, and deterministic.

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::State;
