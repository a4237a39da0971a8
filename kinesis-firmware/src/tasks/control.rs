//! Control task
//!
//! Single owner of the machine. Waits on host commands and two tickers:
//! a fast one for planner and homing housekeeping, and the thermal control
//! period. Telemetry goes out every few thermal periods.

use defmt::*;
use embassy_futures::select::{select, select3, Either, Either3};
use embassy_time::{Duration, Ticker};

use crate::channels::{COMMANDS, TELEMETRY};
use crate::controller::Controller;

/// Housekeeping period
const SERVICE_PERIOD: Duration = Duration::from_millis(5);

/// Thermal periods between telemetry reports
const TELEMETRY_EVERY: u32 = 5;

/// Control task - main coordination loop
#[embassy_executor::task]
pub async fn control_task(mut controller: Controller) {
    let period_s = controller.machine().config().thermal.period_s;
    info!("Control task started, thermal period {}s", period_s);

    let mut service = Ticker::every(SERVICE_PERIOD);
    let mut thermal = Ticker::every(Duration::from_micros((period_s * 1_000_000.0) as u64));
    let mut periods = 0u32;
    let mut retry = None;

    loop {
        // A command the machine could not take yet blocks further commands
        let command = match retry.take() {
            Some(command) => match select(service.next(), thermal.next()).await {
                Either::First(()) => {
                    controller.service();
                    Some(command)
                }
                Either::Second(()) => {
                    retry = Some(command);
                    None
                }
            },
            None => match select3(COMMANDS.receive(), service.next(), thermal.next()).await {
                Either3::First(command) => Some(command),
                Either3::Second(()) => {
                    controller.service();
                    continue;
                }
                Either3::Third(()) => None,
            },
        };

        match command {
            Some(command) => retry = controller.handle(command),
            None => {
                controller.service_thermal();
                periods += 1;
                if periods >= TELEMETRY_EVERY {
                    periods = 0;
                    TELEMETRY.signal(controller.machine().telemetry());
                }
            }
        }
    }
}
