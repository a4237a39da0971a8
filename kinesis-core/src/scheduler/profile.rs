//! Velocity ramp math for the step scheduler
//!
//! Integer only: this runs in the step interrupt. Rates are in steps/s,
//! times in timer ticks.

use crate::motion::MIN_STEP_RATE;

/// Fixed point one (16.16)
const ONE: u64 = 1 << 16;

/// Rate after `elapsed` ticks of a linear ramp from `start`
///
/// `accel_rate` is in steps/s². The result is clamped to `limit` in the
/// direction of travel.
pub fn linear_rate(start: u32, limit: u32, accel_rate: u32, elapsed: u32, timer_hz: u32) -> u32 {
    if timer_hz == 0 {
        return start;
    }
    let delta = (accel_rate as u64 * elapsed as u64 / timer_hz as u64).min(u32::MAX as u64) as u32;
    if limit >= start {
        start.saturating_add(delta).min(limit)
    } else {
        start.saturating_sub(delta).max(limit)
    }
}

/// Ramp duration in ticks for a linear change from `from` to `to`
pub fn ramp_ticks(from: u32, to: u32, accel_rate: u32, timer_hz: u32) -> u32 {
    if accel_rate == 0 {
        return 0;
    }
    let span = from.abs_diff(to) as u64;
    (span * timer_hz as u64 / accel_rate as u64).min(u32::MAX as u64) as u32
}

/// Rate on a quintic Bezier ramp from `start` to `end`
///
/// The velocity follows `start + (end - start) * (10u³ - 15u⁴ + 6u⁵)` with
/// `u = elapsed / duration`. Acceleration is zero at both ends and the
/// distance covered matches the linear ramp of the same duration.
pub fn bezier_rate(start: u32, end: u32, elapsed: u32, duration: u32) -> u32 {
    if duration == 0 || elapsed >= duration {
        return end;
    }
    let u = (elapsed as u64 * ONE) / duration as u64;
    let u2 = (u * u) >> 16;
    let u3 = (u2 * u) >> 16;
    // 10 - 15u + 6u² stays within [1, 10] on [0, 1]
    let poly = (10 * ONE + 6 * u2) - 15 * u;
    let b = ((u3 * poly) >> 16).min(ONE);

    let span = start.abs_diff(end) as u64;
    let offset = ((span * b) >> 16) as u32;
    if end >= start {
        start + offset
    } else {
        start - offset
    }
}

/// Timer ticks between steps at `rate`
pub fn step_interval(rate: u32, timer_hz: u32, min_interval: u32) -> u32 {
    let rate = rate.max(MIN_STEP_RATE);
    (timer_hz / rate).max(min_interval).max(1)
}

/// Convert a nanosecond delay to timer ticks, rounding up
pub fn ns_to_ticks(ns: u32, timer_hz: u32) -> u32 {
    let ticks = (ns as u64 * timer_hz as u64).div_ceil(1_000_000_000);
    ticks.min(u32::MAX as u64) as u32
}
