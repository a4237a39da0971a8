//! Step generation task
//!
//! Runs `StepScheduler::tick` on the interrupt executor and sleeps for the
//! interval it returns. Deadlines are absolute so pulse timing does not
//! drift with task latency.

use defmt::*;
use embassy_time::{Duration, Instant, Timer, TICK_HZ};

use kinesis_core::scheduler::{SchedulerTiming, StepScheduler};
use kinesis_drivers::endstop::SwitchEndstops;
use kinesis_drivers::stepper::StepDirPins;

use crate::board::{Pin, Switch};
use crate::channels::MOTION;

type Steppers = StepDirPins<Pin, embassy_time::Delay>;
type Endstops = SwitchEndstops<Switch>;

/// Convert step timer ticks to embassy time ticks
fn time_ticks(ticks: u32, timer_hz: u32) -> u64 {
    ticks as u64 * TICK_HZ / timer_hz.max(1) as u64
}

#[embassy_executor::task]
pub async fn step_task(stepper: Steppers, endstops: Endstops, timing: SchedulerTiming) {
    info!("Step task started at {} Hz", timing.timer_hz);

    let mut scheduler = StepScheduler::new(&MOTION, stepper, endstops, timing);
    let mut deadline = Instant::now();

    loop {
        let interval = scheduler.tick();
        deadline += Duration::from_ticks(time_ticks(interval, timing.timer_hz).max(1));

        // Fell behind: resume from now rather than bursting to catch up
        let now = Instant::now();
        if deadline < now {
            deadline = now;
        }
        Timer::at(deadline).await;
    }
}
