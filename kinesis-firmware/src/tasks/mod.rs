//! Embassy async tasks
//!
//! The step task runs on the high-priority interrupt executor; everything
//! else shares the thread executor and talks through `crate::channels`.

pub mod control;
pub mod link;
pub mod step;

pub use control::control_task;
pub use link::{link_rx_task, link_tx_task};
pub use step::step_task;
