//! Step pulse scheduler
//!
//! Runs in the step timer interrupt. Every call to `tick` emits at most one
//! step event (one pulse on every axis due in that event, as a single
//! mask) and returns the number of timer ticks until it must be called
//! again. The partially executed block lives in the scheduler between
//! ticks: Bresenham counters, completed events and ramp timers.
//!
//! Rates follow the block trapezoid: linear ramps computed from elapsed
//! ramp time, or a quintic Bezier when the block asks for S-curve shaping.

use super::profile::{bezier_rate, linear_rate, ns_to_ticks, ramp_ticks, step_interval};
use crate::motion::{MotionBlock, MotionShared, NUM_AXES, QUEUE_DEPTH};
use crate::traits::{EndstopReader, PulseTiming, StepperOutput, ALL_AXES_MASK};

/// Idle polling rate (Hz)
const IDLE_POLL_HZ: u32 = 1_000;

/// Scheduler timing derived from the step timer and driver contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerTiming {
    /// Step timer frequency (Hz)
    pub timer_hz: u32,
    /// Ticks between a DIR change and the next pulse
    pub dir_setup_ticks: u32,
    /// Smallest allowed step period (ticks)
    pub min_interval: u32,
    /// Period while no block is queued (ticks)
    pub idle_interval: u32,
}

impl SchedulerTiming {
    /// Derive tick counts from the driver pulse contract
    pub fn new(timer_hz: u32, pulse: &PulseTiming) -> Self {
        let pulse_ticks = ns_to_ticks(pulse.pulse_width_ns, timer_hz).max(1);
        Self {
            timer_hz,
            dir_setup_ticks: ns_to_ticks(pulse.dir_setup_ns, timer_hz).max(1),
            // STEP must go low again before the next rising edge
            min_interval: pulse_ticks * 2,
            idle_interval: (timer_hz / IDLE_POLL_HZ).max(1),
        }
    }
}

/// Block being executed
#[derive(Debug, Clone, Copy)]
struct ActiveBlock {
    block: MotionBlock,
    counters: [i64; NUM_AXES],
    completed: u32,
    /// Axes still allowed to step (homing stops axes one by one)
    live_mask: u8,
    acceleration_time: u32,
    deceleration_time: u32,
    accel_ticks: u32,
    decel_ticks: u32,
}

impl ActiveBlock {
    fn new(block: MotionBlock, timer_hz: u32) -> Self {
        let half = -((block.step_event_count / 2) as i64);
        Self {
            counters: [half; NUM_AXES],
            completed: 0,
            live_mask: ALL_AXES_MASK,
            acceleration_time: 0,
            deceleration_time: 0,
            accel_ticks: ramp_ticks(block.initial_rate, block.cruise_rate, block.acceleration_rate, timer_hz),
            decel_ticks: ramp_ticks(block.cruise_rate, block.final_rate, block.acceleration_rate, timer_hz),
            block,
        }
    }

    /// Step rate for the event about to be emitted
    fn rate(&self, timer_hz: u32) -> u32 {
        let b = &self.block;
        if self.completed <= b.accelerate_until && b.accelerate_until > 0 {
            if b.s_curve {
                bezier_rate(b.initial_rate, b.cruise_rate, self.acceleration_time, self.accel_ticks)
            } else {
                linear_rate(b.initial_rate, b.cruise_rate, b.acceleration_rate, self.acceleration_time, timer_hz)
            }
        } else if self.completed > b.decelerate_after {
            if b.s_curve {
                bezier_rate(b.cruise_rate, b.final_rate, self.deceleration_time, self.decel_ticks)
            } else {
                linear_rate(b.cruise_rate, b.final_rate, b.acceleration_rate, self.deceleration_time, timer_hz)
            }
        } else {
            b.cruise_rate
        }
    }

    /// Advance the ramp clocks by one step period
    fn advance(&mut self, interval: u32) {
        if self.completed <= self.block.accelerate_until {
            self.acceleration_time = self.acceleration_time.saturating_add(interval);
        } else if self.completed > self.block.decelerate_after {
            self.deceleration_time = self.deceleration_time.saturating_add(interval);
        }
    }
}

/// Interrupt-side consumer of the planner queue
pub struct StepScheduler<'a, S, E, const N: usize = QUEUE_DEPTH> {
    shared: &'a MotionShared<N>,
    stepper: S,
    endstops: E,
    timing: SchedulerTiming,
    active: Option<ActiveBlock>,
    last_dirs: Option<u8>,
}

impl<'a, S, E, const N: usize> StepScheduler<'a, S, E, N>
where
    S: StepperOutput,
    E: EndstopReader,
{
    /// Create a scheduler draining `shared.queue`
    pub fn new(shared: &'a MotionShared<N>, stepper: S, endstops: E, timing: SchedulerTiming) -> Self {
        Self {
            shared,
            stepper,
            endstops,
            timing,
            active: None,
            last_dirs: None,
        }
    }

    /// Timing in use
    pub fn timing(&self) -> &SchedulerTiming {
        &self.timing
    }

    /// Whether a block is loaded
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Step output (for inspection)
    pub fn stepper(&self) -> &S {
        &self.stepper
    }

    /// Endstop input (for inspection)
    pub fn endstops_mut(&mut self) -> &mut E {
        &mut self.endstops
    }

    /// Run one scheduler step; returns ticks until the next call
    pub fn tick(&mut self) -> u32 {
        if self.shared.estop.is_triggered() {
            return self.halt();
        }

        let Some(mut active) = self.active else {
            return match self.load_next() {
                Some(_) => self.timing.dir_setup_ticks,
                None => self.timing.idle_interval,
            };
        };

        if active.block.is_homing() {
            let endstop_mask = active.block.endstop_mask;
            let hits = self.endstops.read().masked(endstop_mask & active.live_mask);
            if hits != 0 {
                self.shared.endstops.record(hits);
                active.live_mask &= !hits;
                let single = endstop_mask.count_ones() == 1;
                if single || active.live_mask & endstop_mask == 0 {
                    // Stop short; the planner re-syncs from the step counters
                    return self.finish_block(self.timing.min_interval);
                }
            }
        }

        let mut pulse_mask = 0u8;
        for i in 0..NUM_AXES {
            active.counters[i] += active.block.steps[i] as i64;
            if active.counters[i] > 0 {
                active.counters[i] -= active.block.step_event_count as i64;
                let bit = 1 << i;
                if active.live_mask & bit != 0 {
                    pulse_mask |= bit;
                    self.shared.position.step(i, active.block.direction_bits & bit != 0);
                }
            }
        }
        if pulse_mask != 0 {
            self.stepper.pulse(pulse_mask);
        }

        let rate = active.rate(self.timing.timer_hz);
        let interval = step_interval(rate, self.timing.timer_hz, self.timing.min_interval);
        active.advance(interval);
        active.completed += 1;

        if active.completed >= active.block.step_event_count {
            return self.finish_block(interval);
        }
        self.active = Some(active);
        interval
    }

    /// Retire the current block and start the next one without a gap
    fn finish_block(&mut self, interval: u32) -> u32 {
        self.active = None;
        match self.load_next() {
            Some(true) => interval.max(self.timing.dir_setup_ticks),
            _ => interval,
        }
    }

    /// Pop the next block and drive its DIR lines
    ///
    /// Returns whether the DIR lines changed, `None` when the queue is empty.
    fn load_next(&mut self) -> Option<bool> {
        self.shared.set_busy(true);
        let Some(block) = self.shared.queue.pop() else {
            self.shared.set_busy(false);
            return None;
        };
        if !self.stepper.is_enabled() {
            self.stepper.enable(true);
        }
        self.stepper.set_directions(block.direction_bits);
        let changed = self.last_dirs != Some(block.direction_bits);
        self.last_dirs = Some(block.direction_bits);
        self.active = Some(ActiveBlock::new(block, self.timing.timer_hz));
        Some(changed)
    }

    /// Emergency stop: drop all motion and disable the drivers
    fn halt(&mut self) -> u32 {
        if self.active.take().is_some() || !self.shared.queue.is_empty() {
            self.shared.queue.clear();
        }
        if self.stepper.is_enabled() {
            self.stepper.enable(false);
        }
        self.shared.set_busy(false);
        self.timing.idle_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{Axis, EndstopState};
    use crate::safety::StopCause;

    #[derive(Default)]
    struct MockStepper {
        enabled: bool,
        dirs: u8,
        pulses: [u32; NUM_AXES],
        position: [i32; NUM_AXES],
        events: u32,
        dir_changes: u32,
    }

    impl StepperOutput for MockStepper {
        fn set_directions(&mut self, negative_mask: u8) {
            self.dirs = negative_mask;
            self.dir_changes += 1;
        }

        fn pulse(&mut self, axis_mask: u8) {
            self.events += 1;
            for i in 0..NUM_AXES {
                if axis_mask & (1 << i) != 0 {
                    self.pulses[i] += 1;
                    self.position[i] += if self.dirs & (1 << i) != 0 { -1 } else { 1 };
                }
            }
        }

        fn enable(&mut self, enabled: bool) {
            self.enabled = enabled;
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    /// Switch states set directly by the test
    struct MockEndstops {
        state: EndstopState,
    }

    impl EndstopReader for MockEndstops {
        fn read(&mut self) -> EndstopState {
            self.state
        }
    }

    fn timing() -> SchedulerTiming {
        SchedulerTiming::new(1_000_000, &PulseTiming::default())
    }

    fn block(steps: [u32; NUM_AXES], dirs: u8) -> MotionBlock {
        let mut b = MotionBlock::new(steps, dirs, steps[0].max(steps[1]) as f32 / 80.0);
        b.set_nominal(50.0, 1000.0);
        b.calculate_trapezoid(0.0, 0.0);
        b
    }

    fn run<S: StepperOutput, E: EndstopReader, const N: usize>(
        scheduler: &mut StepScheduler<'_, S, E, N>,
        max_ticks: u32,
    ) -> u32 {
        let mut calls = 0;
        while calls < max_ticks {
            scheduler.tick();
            calls += 1;
            if !scheduler.is_running() && scheduler.shared.queue.is_empty() {
                break;
            }
        }
        calls
    }

    #[test]
    fn test_timing_from_pulse_contract() {
        let t = timing();
        assert_eq!(t.dir_setup_ticks, 1);
        assert_eq!(t.min_interval, 4);
        assert_eq!(t.idle_interval, 1_000);
    }

    #[test]
    fn test_idle_returns_idle_interval() {
        let shared: MotionShared<4> = MotionShared::new();
        let mut s = StepScheduler::new(&shared, MockStepper::default(), MockEndstops { state: EndstopState::NONE }, timing());
        assert_eq!(s.tick(), 1_000);
        assert!(!shared.is_busy());
    }

    #[test]
    fn test_bresenham_reaches_every_target() {
        let shared: MotionShared<4> = MotionShared::new();
        shared.queue.push(block([800, 300, 7, 55], 0b0010)).unwrap();
        let mut s = StepScheduler::new(&shared, MockStepper::default(), MockEndstops { state: EndstopState::NONE }, timing());

        run(&mut s, 10_000);
        assert_eq!(s.stepper().pulses, [800, 300, 7, 55]);
        assert_eq!(s.stepper().events, 800);
        assert_eq!(shared.position.get(), [800, -300, 7, 55]);
        assert_eq!(s.stepper().position, [800, -300, 7, 55]);
        assert!(shared.is_drained());
    }

    #[test]
    fn test_blocks_run_in_order_back_to_back() {
        let shared: MotionShared<4> = MotionShared::new();
        shared.queue.push(block([400, 0, 0, 0], 0)).unwrap();
        shared.queue.push(block([400, 0, 0, 0], 0b0001)).unwrap();
        let mut s = StepScheduler::new(&shared, MockStepper::default(), MockEndstops { state: EndstopState::NONE }, timing());

        // Load + 400 events, second block loaded on the last event
        let mut calls = 0;
        while shared.position.axis(Axis::X) < 400 {
            s.tick();
            calls += 1;
        }
        assert_eq!(calls, 401);
        assert!(s.is_running());
        assert_eq!(s.stepper().dirs, 0b0001);

        run(&mut s, 10_000);
        assert_eq!(shared.position.get()[0], 0);
        assert_eq!(s.stepper().dir_changes, 2);
    }

    #[test]
    fn test_rate_ramps_up_and_down() {
        let shared: MotionShared<4> = MotionShared::new();
        let b = block([8000, 0, 0, 0], 0);
        assert!(b.accelerate_until > 0 && b.decelerate_after < b.step_event_count);
        shared.queue.push(b).unwrap();
        let mut s = StepScheduler::new(&shared, MockStepper::default(), MockEndstops { state: EndstopState::NONE }, timing());

        s.tick();
        let first = s.tick();
        let mut shortest = first;
        let mut last = first;
        while s.is_running() {
            last = s.tick();
            shortest = shortest.min(last);
        }
        // Cruise at 50 mm/s * 80 steps/mm
        assert_eq!(shortest, 1_000_000 / 4000);
        assert!(first > shortest * 4);
        assert!(last > shortest * 4);
    }

    #[test]
    fn test_s_curve_block_completes() {
        let shared: MotionShared<4> = MotionShared::new();
        let mut b = block([4000, 0, 0, 0], 0);
        b.s_curve = true;
        shared.queue.push(b).unwrap();
        let mut s = StepScheduler::new(&shared, MockStepper::default(), MockEndstops { state: EndstopState::NONE }, timing());

        run(&mut s, 10_000);
        assert_eq!(s.stepper().pulses[0], 4000);
    }

    #[test]
    fn test_estop_halts_and_clears() {
        let shared: MotionShared<4> = MotionShared::new();
        shared.queue.push(block([800, 0, 0, 0], 0)).unwrap();
        shared.queue.push(block([800, 0, 0, 0], 0)).unwrap();
        let mut s = StepScheduler::new(&shared, MockStepper::default(), MockEndstops { state: EndstopState::NONE }, timing());
        for _ in 0..10 {
            s.tick();
        }
        let before = s.stepper().events;

        shared.estop.trigger(StopCause::External);
        assert_eq!(s.tick(), timing().idle_interval);
        s.tick();
        assert_eq!(s.stepper().events, before);
        assert!(!s.is_running());
        assert!(shared.queue.is_empty());
        assert!(!s.stepper().is_enabled());
        assert!(!shared.is_busy());
    }

    #[test]
    fn test_homing_block_stops_on_endstop() {
        let shared: MotionShared<4> = MotionShared::new();
        let mut b = block([16000, 0, 0, 0], 0b0001);
        b.endstop_mask = 0b0001;
        shared.queue.push(b).unwrap();
        let mut s = StepScheduler::new(&shared, MockStepper::default(), MockEndstops { state: EndstopState::NONE }, timing());

        for _ in 0..101 {
            s.tick();
        }
        s.endstops_mut().state = EndstopState(0b0001);
        s.tick();
        assert!(!s.is_running());
        assert_eq!(shared.position.get()[0], -100);
        assert_eq!(shared.endstops.get().masked(0b0001), 0b0001);
    }

    #[test]
    fn test_multi_endstop_homing_stops_axes_individually() {
        let shared: MotionShared<4> = MotionShared::new();
        let mut b = block([1000, 1000, 1000, 0], 0);
        b.endstop_mask = 0b0111;
        shared.queue.push(b).unwrap();
        let mut s = StepScheduler::new(&shared, MockStepper::default(), MockEndstops { state: EndstopState::NONE }, timing());

        for _ in 0..11 {
            s.tick();
        }
        s.endstops_mut().state = EndstopState(0b0010);
        for _ in 0..10 {
            s.tick();
        }
        assert!(s.is_running());
        s.endstops_mut().state = EndstopState(0b0111);
        s.tick();
        assert!(!s.is_running());

        let pos = shared.position.get();
        assert_eq!(pos[1], 10);
        assert_eq!(pos[0], 20);
        assert_eq!(pos[2], 20);
    }
}
