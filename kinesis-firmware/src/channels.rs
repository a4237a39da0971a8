//! Inter-task communication channels
//!
//! The motion state itself crosses into the step interrupt through
//! `MotionShared`; everything else between tasks goes through these
//! embassy-sync primitives.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use kinesis_core::motion::MotionShared;
use kinesis_core::report::Telemetry;

use crate::link::Command;

/// Channel capacity for host commands
const COMMAND_CHANNEL_SIZE: usize = 8;

/// Planner queue, step counters, endstop latch and emergency stop
pub static MOTION: MotionShared = MotionShared::new();

/// Decoded host commands, consumed by the control task
pub static COMMANDS: Channel<CriticalSectionRawMutex, Command, COMMAND_CHANNEL_SIZE> =
    Channel::new();

/// Latest telemetry snapshot for the link writer
pub static TELEMETRY: Signal<CriticalSectionRawMutex, Telemetry> = Signal::new();
