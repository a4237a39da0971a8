//! Machine facade
//!
//! The single entry point for the command layer. Move requests are
//! validated (soft limits, endstops, extrusion guards), segmented when the
//! kinematics or the leveling surface bend straight lines, corrected for
//! the bed and handed to the planner. Homing, leveling, heater set-points
//! and fault acknowledgment go through the same value so every request is
//! checked against the operating state.

use crate::config::{ConfigError, MachineConfig, PidGains};
use crate::leveling::{Compensator, LevelingError, LevelingMesh};
use crate::motion::{
    ActuatorPosition, Axis, AxisPosition, BufferOutcome, HomingError, HomingMachine,
    HomingStatus, Kinematics, LineParams, LineSegmenter, MotionShared, MoveError, Planner,
    NUM_AXES, QUEUE_DEPTH,
};
use crate::report::{HeaterReport, Telemetry};
use crate::safety::StopCause;
use crate::state::{Event, State};
use crate::thermal::{HeaterId, ThermalBank, ThermalError};
use crate::traits::{HeaterOutput, SensorError, TemperatureSensor, ZProbe};

/// Motion and thermal core of one machine
pub struct Machine<'a, const N: usize = QUEUE_DEPTH> {
    config: MachineConfig,
    shared: &'a MotionShared<N>,
    planner: Planner<'a, N>,
    compensator: Compensator,
    homing: HomingMachine,
    thermal: ThermalBank,
    state: State,
    /// Logical position requested by the command layer, before leveling
    position: AxisPosition,
    /// Segmented move still being fed to the planner
    pending: Option<LineSegmenter>,
}

impl<'a, const N: usize> Machine<'a, N> {
    /// Build the machine from a validated configuration
    pub fn new(config: &MachineConfig, shared: &'a MotionShared<N>) -> Result<Self, ConfigError> {
        config.validate()?;
        let kinematics = Kinematics::from_config(&config.kinematics);
        Ok(Self {
            config: *config,
            shared,
            planner: Planner::new(shared, &config.motion, kinematics),
            compensator: Compensator::new(&config.leveling, &config.travel),
            homing: HomingMachine::new(config),
            thermal: ThermalBank::new(&config.thermal),
            state: State::Idle,
            position: AxisPosition::ZERO,
            pending: None,
        })
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Commanded logical position
    pub fn position(&self) -> AxisPosition {
        self.position
    }

    pub fn compensator(&self) -> &Compensator {
        &self.compensator
    }

    pub fn thermal(&self) -> &ThermalBank {
        &self.thermal
    }

    pub fn homing(&self) -> &HomingMachine {
        &self.homing
    }

    /// Request a straight move to `target`
    ///
    /// `Stalled` means the request was not taken and must be offered again
    /// after `service`. An accepted move is always executed completely,
    /// even when its segments reach the planner over several calls.
    pub fn move_to(
        &mut self,
        target: &AxisPosition,
        params: &LineParams,
    ) -> Result<BufferOutcome, MoveError> {
        self.sync_halt();
        if self.shared.estop.is_triggered() {
            return Err(MoveError::Halted);
        }
        if !self.state.accepts_moves() {
            return Err(MoveError::Busy);
        }
        self.feed_pending()?;
        if self.pending.is_some() {
            return Ok(BufferOutcome::Stalled);
        }

        self.check_soft_limits(target)?;
        self.check_extrusion(target)?;
        self.check_endstops(target)?;

        let segment_length = if !self.planner.kinematics().is_linear()
            || self.compensator.is_nonplanar()
        {
            Some(self.config.motion.segment_length_mm)
        } else {
            None
        };
        self.pending = Some(LineSegmenter::new(
            &self.position,
            target,
            segment_length,
            params,
        ));
        let queued = match self.feed_pending() {
            Ok(queued) => queued,
            Err(err) => {
                self.refresh_position();
                if !self.planner.is_idle() {
                    self.state = self.state.transition(Event::MoveQueued);
                }
                return Err(err);
            }
        };
        if !queued && self.pending.is_none() {
            return Ok(BufferOutcome::Discarded);
        }
        self.position = *target;
        self.state = self.state.transition(Event::MoveQueued);
        Ok(BufferOutcome::Queued)
    }

    /// Main-loop housekeeping
    ///
    /// Feeds a stalled segmented move, commits planned blocks, advances
    /// homing and tracks the operating state. Errors report a failed
    /// homing sequence.
    pub fn service(&mut self) -> Result<State, HomingError> {
        self.sync_halt();
        if self.state.is_halted() {
            return Ok(self.state);
        }

        if let Err(_err) = self.feed_pending() {
            #[cfg(feature = "defmt")]
            defmt::warn!("segmented move cut short: {}", _err);
            self.refresh_position();
        }
        self.planner.service();

        match self.state {
            State::Homing => match self.homing.poll(&mut self.planner, self.shared) {
                Ok(HomingStatus::Complete) => {
                    self.position = self.compensator.uncorrect(&self.planner.position());
                    self.state = self.state.transition(Event::SequenceFinished);
                }
                Ok(HomingStatus::InProgress) => {}
                Err(err) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("homing failed: {}", err);
                    self.position = self.compensator.uncorrect(&self.planner.position());
                    self.state = self.state.transition(Event::SequenceFailed);
                    self.sync_halt();
                    return Err(err);
                }
            },
            State::Moving if self.pending.is_none() && self.planner.is_idle() => {
                self.state = self.state.transition(Event::MotionDrained);
            }
            _ => {}
        }
        Ok(self.state)
    }

    /// Start homing the linear axes in `axes_mask`
    ///
    /// Progress is driven by `service`; motion must be drained first.
    pub fn home(&mut self, axes_mask: u8) -> Result<(), HomingError> {
        self.sync_halt();
        if self.state.is_halted() {
            return Err(HomingError::Halted);
        }
        if !self.state.accepts_sequences() || self.pending.is_some() {
            return Err(HomingError::Busy);
        }
        self.homing.start(&self.planner, axes_mask)?;
        self.state = self.state.transition(Event::HomeRequested);
        Ok(())
    }

    /// Select whether bed-leveling correction applies
    pub fn set_leveling(&mut self, enabled: bool) -> Result<(), LevelingError> {
        self.compensator.set_enabled(enabled)?;
        self.refresh_position();
        Ok(())
    }

    /// Change the leveling fade height
    pub fn set_fade_height(&mut self, height: Option<f32>) -> Result<(), LevelingError> {
        self.compensator.set_fade_height(height)?;
        self.refresh_position();
        Ok(())
    }

    /// Run a probing pass with `probe` and install the measured surface
    ///
    /// The probe drives the toolhead itself; motion must be drained.
    pub fn probe_bed<P: ZProbe>(&mut self, probe: &mut P) -> Result<(), LevelingError> {
        self.sync_halt();
        if self.state.is_halted() {
            return Err(LevelingError::Probe(crate::traits::ProbeError::Halted));
        }
        if !self.state.accepts_sequences() || !self.planner.is_idle() {
            return Err(LevelingError::Busy);
        }
        self.state = self.state.transition(Event::ProbeRequested);
        let result = self.compensator.probe(probe);
        let event = if result.is_ok() {
            Event::SequenceFinished
        } else {
            #[cfg(feature = "defmt")]
            defmt::warn!("probing aborted, previous surface kept");
            Event::SequenceFailed
        };
        self.state = self.state.transition(event);
        self.sync_halt();
        result
    }

    /// Install a stored mesh
    pub fn install_mesh(&mut self, mesh: LevelingMesh) -> Result<(), LevelingError> {
        self.compensator.install_mesh(mesh)?;
        self.refresh_position();
        Ok(())
    }

    /// Edit one mesh point by hand
    pub fn edit_mesh_point(&mut self, ix: usize, iy: usize, z: f32) -> Result<(), LevelingError> {
        self.compensator.edit_point(ix, iy, z)?;
        self.refresh_position();
        Ok(())
    }

    /// Fill unset mesh points from their neighbours
    pub fn smart_fill_mesh(&mut self) -> Result<usize, LevelingError> {
        let filled = self.compensator.smart_fill()?;
        self.refresh_position();
        Ok(filled)
    }

    /// Change a heater set-point; returns the applied target
    pub fn set_heater_target(&mut self, id: HeaterId, celsius: f32) -> Result<f32, ThermalError> {
        self.sync_halt();
        if !self.state.heater_allowed() && celsius > 0.0 {
            return Err(ThermalError::Halted);
        }
        self.thermal.set_target(id, celsius)
    }

    /// Install autotuned gains for a heater
    pub fn set_heater_gains(&mut self, id: HeaterId, gains: PidGains) -> Result<bool, ThermalError> {
        self.thermal.set_gains(id, gains)
    }

    /// Whether a heater reached its target and held it
    pub fn is_heater_settled(&self, id: HeaterId) -> bool {
        self.thermal.is_settled(id)
    }

    /// Run one thermal control period with a reading taken by the caller
    pub fn update_heater(
        &mut self,
        id: HeaterId,
        reading: Result<f32, SensorError>,
    ) -> Result<u8, ThermalError> {
        let result = self.thermal.update(id, reading, &self.shared.estop);
        self.sync_halt();
        result
    }

    /// Read a sensor, run one control period and drive the heater output
    pub fn service_heater<S, H>(
        &mut self,
        id: HeaterId,
        sensor: &mut S,
        output: &mut H,
    ) -> Result<u8, ThermalError>
    where
        S: TemperatureSensor,
        H: HeaterOutput,
    {
        let result = self.thermal.service(id, sensor, output, &self.shared.estop);
        self.sync_halt();
        result
    }

    /// Assert the emergency stop on behalf of the command layer
    pub fn emergency_stop(&mut self) {
        self.shared.estop.trigger(StopCause::External);
        self.sync_halt();
    }

    /// Acknowledge a halt and resume
    ///
    /// Heaters come back off and every axis must be homed again. Fails with
    /// `Busy` until the step scheduler has observed the stop.
    pub fn reset_fault(&mut self) -> Result<(), MoveError> {
        if !self.state.is_halted() && !self.shared.estop.is_triggered() {
            return Ok(());
        }
        self.planner.abort();
        if !self.shared.is_drained() {
            return Err(MoveError::Busy);
        }
        self.thermal.clear_faults();
        self.homing.forget();
        self.pending = None;
        self.shared.estop.reset();
        self.planner.sync_position()?;
        self.refresh_position();
        self.state = self.state.transition(Event::Reset);
        Ok(())
    }

    /// Snapshot for the reporting collaborators
    pub fn telemetry(&self) -> Telemetry {
        let actuator = ActuatorPosition::from_steps(
            &self.shared.position.get(),
            &self.config.motion.steps_per_unit,
        );
        let physical = self
            .planner
            .kinematics()
            .to_logical(&actuator)
            .unwrap_or_else(|_| self.planner.position());

        let mut heaters = heapless::Vec::new();
        for channel in self.thermal.channels() {
            let protection = self
                .thermal
                .protection(channel.id())
                .unwrap_or(crate::safety::ProtectionState::Idle);
            // One report per configured channel, never more than the bank holds
            let _ = heaters.push(HeaterReport::new(channel, protection));
        }

        Telemetry {
            position: self.compensator.uncorrect(&physical),
            queue_len: self.shared.queue.len() as u8,
            homed: self.homing.homed_mask(),
            leveling: self.compensator.is_enabled(),
            halted: self.shared.estop.cause(),
            heaters,
        }
    }

    /// Feed the pending segmenter; true when at least one block was planned
    ///
    /// A rejected segment drops the rest of the move.
    fn feed_pending(&mut self) -> Result<bool, MoveError> {
        let mut queued = false;
        while let Some(segmenter) = self.pending.as_mut() {
            let Some(point) = segmenter.peek() else {
                self.pending = None;
                break;
            };
            let corrected = self.compensator.correct(&point);
            match self.planner.buffer_line(&corrected, segmenter.params()) {
                Ok(BufferOutcome::Stalled) => break,
                Ok(BufferOutcome::Queued) => {
                    queued = true;
                    segmenter.advance();
                }
                Ok(BufferOutcome::Discarded) => segmenter.advance(),
                Err(err) => {
                    self.pending = None;
                    return Err(err);
                }
            }
        }
        Ok(queued)
    }

    fn check_soft_limits(&self, target: &AxisPosition) -> Result<(), MoveError> {
        let travel = &self.config.travel;
        for axis in Axis::LINEAR {
            let i = axis.index();
            let v = target.0[i];
            if (travel.soft_min[i] && v < travel.min_pos[i])
                || (travel.soft_max[i] && v > travel.max_pos[i])
            {
                return Err(MoveError::OutOfBounds(axis));
            }
        }
        Ok(())
    }

    fn check_extrusion(&self, target: &AxisPosition) -> Result<(), MoveError> {
        let guard = &self.config.motion.extrusion;
        let de = target.0[NUM_AXES - 1] - self.position.0[NUM_AXES - 1];
        if de == 0.0 {
            return Ok(());
        }
        if guard.prevent_lengthy && libm::fabsf(de) > guard.max_length {
            return Err(MoveError::LengthyExtrusion);
        }
        if guard.prevent_cold {
            let hot = self
                .thermal
                .channel(HeaterId::Hotend)
                .is_some_and(|c| c.temperature() >= guard.min_temp);
            if !hot {
                return Err(MoveError::ColdExtrusion);
            }
        }
        Ok(())
    }

    /// Refuse moves that push further into a switch hit while homing
    ///
    /// Moving an actuator away from its switch releases the latch.
    fn check_endstops(&self, target: &AxisPosition) -> Result<(), MoveError> {
        let hit = self.shared.endstops.get();
        if hit.0 == 0 {
            return Ok(());
        }
        let kinematics = self.planner.kinematics();
        let from = kinematics.to_actuator(&self.compensator.correct(&self.position))?;
        let to = kinematics.to_actuator(&self.compensator.correct(target))?;
        let mut release = 0u8;
        for axis in Axis::LINEAR {
            if !hit.is_triggered(axis) {
                continue;
            }
            let i = axis.index();
            let toward = (to.0[i] - from.0[i]) * self.config.homing.home_dir[i] as f32;
            if toward > 0.0 {
                return Err(MoveError::EndstopTriggered(axis));
            }
            if toward < 0.0 {
                release |= axis.bit();
            }
        }
        self.shared.endstops.clear(release);
        Ok(())
    }

    /// Re-derive the logical position after the surface changed
    fn refresh_position(&mut self) {
        if self.pending.is_none() {
            self.position = self.compensator.uncorrect(&self.planner.position());
        }
    }

    /// Propagate an emergency stop into the state and the planner
    fn sync_halt(&mut self) {
        if let Some(cause) = self.shared.estop.cause() {
            if !self.state.is_halted() {
                self.planner.abort();
                self.homing.cancel();
                self.thermal.shutdown();
                self.pending = None;
            }
            self.state = self.state.transition(Event::Halt(cause));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use crate::motion::{EndstopState, MoveKind, LINEAR_AXES};
    use crate::scheduler::{SchedulerTiming, StepScheduler};
    use crate::traits::{EndstopReader, ProbeError, StepperOutput};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Simulated carriages in steps with switches at zero
    #[derive(Default)]
    struct Bench {
        steps: [i32; NUM_AXES],
        backward_steps: [u32; NUM_AXES],
        triggers: [u32; NUM_AXES],
        last: u8,
    }

    struct Motors {
        bench: Rc<RefCell<Bench>>,
        dirs: u8,
        enabled: bool,
    }

    impl StepperOutput for Motors {
        fn set_directions(&mut self, negative_mask: u8) {
            self.dirs = negative_mask;
        }

        fn pulse(&mut self, axis_mask: u8) {
            let mut bench = self.bench.borrow_mut();
            for i in 0..NUM_AXES {
                if axis_mask & (1 << i) != 0 {
                    if self.dirs & (1 << i) != 0 {
                        bench.steps[i] -= 1;
                        bench.backward_steps[i] += 1;
                    } else {
                        bench.steps[i] += 1;
                    }
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

    struct Switches {
        bench: Rc<RefCell<Bench>>,
    }

    impl EndstopReader for Switches {
        fn read(&mut self) -> EndstopState {
            let mut bench = self.bench.borrow_mut();
            let mut state = EndstopState::NONE;
            for axis in Axis::LINEAR {
                state.set(axis, bench.steps[axis.index()] <= 0);
            }
            let rising = state.0 & !bench.last;
            for i in 0..LINEAR_AXES {
                if rising & (1 << i) != 0 {
                    bench.triggers[i] += 1;
                }
            }
            bench.last = state.0;
            state
        }
    }

    type Scheduler<'s> = StepScheduler<'s, Motors, Switches, 8>;

    fn scheduler(shared: &MotionShared<8>, start: [i32; NUM_AXES]) -> (Scheduler<'_>, Rc<RefCell<Bench>>) {
        let bench = Rc::new(RefCell::new(Bench {
            steps: start,
            ..Default::default()
        }));
        shared.position.set(&start);
        let scheduler = StepScheduler::new(
            shared,
            Motors {
                bench: bench.clone(),
                dirs: 0,
                enabled: false,
            },
            Switches {
                bench: bench.clone(),
            },
            SchedulerTiming::new(1_000_000, &Default::default()),
        );
        (scheduler, bench)
    }

    fn run(machine: &mut Machine<'_, 8>, scheduler: &mut Scheduler<'_>) -> Result<State, HomingError> {
        for _ in 0..50_000 {
            let state = machine.service()?;
            if state == State::Idle || state.is_halted() {
                return Ok(state);
            }
            for _ in 0..100 {
                scheduler.tick();
            }
        }
        Ok(machine.state())
    }

    fn travel(feedrate: f32) -> LineParams {
        LineParams::new(feedrate, MoveKind::Travel)
    }

    fn hot_machine<'s>(shared: &'s MotionShared<8>) -> Machine<'s, 8> {
        let mut machine = Machine::new(&MachineConfig::default(), shared).unwrap();
        machine.set_heater_target(HeaterId::Hotend, 200.0).unwrap();
        machine.update_heater(HeaterId::Hotend, Ok(200.0)).unwrap();
        machine
    }

    #[test]
    fn test_rejects_invalid_config() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut config = MachineConfig::default();
        config.motion.steps_per_unit[0] = 0.0;
        assert!(Machine::new(&config, &shared).is_err());
    }

    #[test]
    fn test_home_cartesian_then_move() {
        let shared: MotionShared<8> = MotionShared::new();
        let (mut scheduler, bench) = scheduler(&shared, [2400, 1600, 20_000, 0]);
        let mut machine = Machine::new(&MachineConfig::default(), &shared).unwrap();

        machine.home(0b111).unwrap();
        assert_eq!(machine.state(), State::Homing);
        assert_eq!(run(&mut machine, &mut scheduler), Ok(State::Idle));

        {
            let bench = bench.borrow();
            assert_eq!(bench.triggers[..LINEAR_AXES], [1, 1, 1]);
            assert_eq!(bench.steps, [0, 0, 0, 0]);
            assert_eq!(bench.backward_steps[..LINEAR_AXES], [2400, 1600, 20_000]);
        }
        let telemetry = machine.telemetry();
        assert!(telemetry.position.approx_eq(&AxisPosition::ZERO, 1e-4));
        assert_eq!(telemetry.homed, 0b111);

        // Pushing further into a switch is refused, moving away is not
        assert_eq!(
            machine.move_to(&AxisPosition::new(0.0, 10.0, 0.0, 0.0), &travel(50.0)),
            Ok(BufferOutcome::Queued)
        );
        assert_eq!(run(&mut machine, &mut scheduler), Ok(State::Idle));
        assert_eq!(bench.borrow().steps[1], 800);
    }

    #[test]
    fn test_move_into_triggered_endstop_rejected() {
        let shared: MotionShared<8> = MotionShared::new();
        let (mut scheduler, _bench) = scheduler(&shared, [800, 800, 4000, 0]);
        let mut config = MachineConfig::default();
        config.travel.soft_min = [false; LINEAR_AXES];
        let mut machine = Machine::new(&config, &shared).unwrap();
        machine.home(0b001).unwrap();
        assert_eq!(run(&mut machine, &mut scheduler), Ok(State::Idle));

        let result = machine.move_to(&AxisPosition::new(-5.0, 10.0, 1.0, 0.0), &travel(50.0));
        assert_eq!(result, Err(MoveError::EndstopTriggered(Axis::X)));
    }

    #[test]
    fn test_soft_limits() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut machine = Machine::new(&MachineConfig::default(), &shared).unwrap();
        let result = machine.move_to(&AxisPosition::new(250.0, 0.0, 0.0, 0.0), &travel(50.0));
        assert_eq!(result, Err(MoveError::OutOfBounds(Axis::X)));
        // Min soft endstops are off by default
        let result = machine.move_to(&AxisPosition::new(-1.0, 0.0, 0.0, 0.0), &travel(50.0));
        assert_eq!(result, Ok(BufferOutcome::Queued));
    }

    #[test]
    fn test_z_acceleration_capped_not_rejected() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut machine = Machine::new(&MachineConfig::default(), &shared).unwrap();
        let params = LineParams {
            feedrate: 5.0,
            acceleration: Some(5000.0),
            kind: MoveKind::Travel,
        };
        let outcome = machine.move_to(&AxisPosition::new(0.0, 0.0, 5.0, 0.0), &params);
        assert_eq!(outcome, Ok(BufferOutcome::Queued));
        machine.service().unwrap();

        let block = shared.queue.pop().unwrap();
        assert_eq!(block.acceleration, 100.0);
    }

    #[test]
    fn test_extrusion_guards() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut machine = Machine::new(&MachineConfig::default(), &shared).unwrap();
        machine.update_heater(HeaterId::Hotend, Ok(25.0)).unwrap();
        let extrude = LineParams::new(30.0, MoveKind::Print);
        assert_eq!(
            machine.move_to(&AxisPosition::new(10.0, 0.0, 0.0, 1.0), &extrude),
            Err(MoveError::ColdExtrusion)
        );

        let shared: MotionShared<8> = MotionShared::new();
        let mut machine = hot_machine(&shared);
        assert_eq!(
            machine.move_to(&AxisPosition::new(10.0, 0.0, 0.0, 250.0), &extrude),
            Err(MoveError::LengthyExtrusion)
        );
        assert_eq!(
            machine.move_to(&AxisPosition::new(10.0, 0.0, 0.0, 1.0), &extrude),
            Ok(BufferOutcome::Queued)
        );
        // Moves without extrusion are not guarded
        let shared: MotionShared<8> = MotionShared::new();
        let mut cold = Machine::new(&MachineConfig::default(), &shared).unwrap();
        cold.update_heater(HeaterId::Hotend, Ok(25.0)).unwrap();
        assert_eq!(
            cold.move_to(&AxisPosition::new(5.0, 5.0, 0.0, 0.0), &travel(50.0)),
            Ok(BufferOutcome::Queued)
        );
    }

    #[test]
    fn test_zero_move_discarded() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut machine = Machine::new(&MachineConfig::default(), &shared).unwrap();
        assert_eq!(
            machine.move_to(&AxisPosition::ZERO, &travel(50.0)),
            Ok(BufferOutcome::Discarded)
        );
        assert_eq!(machine.state(), State::Idle);
    }

    #[test]
    fn test_segmented_move_survives_backpressure() {
        let shared: MotionShared<8> = MotionShared::new();
        let (mut scheduler, bench) = scheduler(&shared, [0; NUM_AXES]);
        let mut config = MachineConfig::default();
        config.motion.segment_length_mm = 5.0;
        config.leveling.strategy = crate::config::LevelingStrategy::Bilinear;
        config.leveling.fade_height = None;
        let mut machine = Machine::new(&config, &shared).unwrap();

        // Flat mesh offset by 0.5 mm
        let mesh_points = config.leveling.grid_points as usize;
        for ix in 0..mesh_points {
            for iy in 0..mesh_points {
                machine.edit_mesh_point(ix, iy, 0.5).unwrap();
            }
        }
        machine.set_leveling(true).unwrap();
        assert!(machine.compensator().is_nonplanar());

        // 100 mm in 5 mm pieces: far more segments than window and queue hold
        let target = AxisPosition::new(100.0, 0.0, 10.0, 0.0);
        assert_eq!(machine.move_to(&target, &travel(100.0)), Ok(BufferOutcome::Queued));
        assert_eq!(
            machine.move_to(&AxisPosition::new(0.0, 0.0, 10.0, 0.0), &travel(100.0)),
            Ok(BufferOutcome::Stalled)
        );
        assert_eq!(run(&mut machine, &mut scheduler), Ok(State::Idle));

        let bench = bench.borrow();
        assert_eq!(bench.steps[0], 8000);
        // Z carries the 0.5 mm surface offset
        assert_eq!(bench.steps[2], 42_000);
        assert!(machine.position().approx_eq(&target, 1e-4));
    }

    #[test]
    fn test_thermal_fault_halts_motion() {
        let shared: MotionShared<8> = MotionShared::new();
        let (mut scheduler, _bench) = scheduler(&shared, [0; NUM_AXES]);
        let mut machine = hot_machine(&shared);
        machine
            .move_to(&AxisPosition::new(100.0, 0.0, 0.0, 0.0), &travel(50.0))
            .unwrap();
        machine.service().unwrap();
        for _ in 0..50 {
            scheduler.tick();
        }

        let result = machine.update_heater(HeaterId::Hotend, Ok(300.0));
        assert!(matches!(result, Err(ThermalError::Fault(_))));
        assert_eq!(machine.state(), State::Halted(StopCause::Thermal));
        assert!(shared.queue.is_empty());
        assert_eq!(
            machine.move_to(&AxisPosition::new(10.0, 0.0, 0.0, 0.0), &travel(50.0)),
            Err(MoveError::Halted)
        );
        assert_eq!(
            machine.set_heater_target(HeaterId::Hotend, 200.0),
            Err(ThermalError::Halted)
        );
        assert!(machine.telemetry().is_halted());

        // Scheduler observes the stop and drains
        scheduler.tick();
        assert!(!scheduler.is_running());
        machine.reset_fault().unwrap();
        assert_eq!(machine.state(), State::Idle);
        assert_eq!(machine.telemetry().homed, 0);
        assert_eq!(machine.set_heater_target(HeaterId::Hotend, 200.0), Ok(200.0));
    }

    #[test]
    fn test_failed_probe_keeps_state_idle() {
        struct DeadProbe;
        impl ZProbe for DeadProbe {
            fn measure(&mut self, _x: f32, _y: f32) -> Result<f32, ProbeError> {
                Err(ProbeError::NoTrigger)
            }
        }

        let shared: MotionShared<8> = MotionShared::new();
        let mut config = MachineConfig::default();
        config.leveling.strategy = crate::config::LevelingStrategy::Bilinear;
        let mut machine = Machine::new(&config, &shared).unwrap();
        assert_eq!(
            machine.probe_bed(&mut DeadProbe),
            Err(LevelingError::Probe(ProbeError::NoTrigger))
        );
        assert_eq!(machine.state(), State::Idle);
        assert!(machine.compensator().mesh().is_none());
    }

    #[test]
    fn test_home_refused_while_moving() {
        let shared: MotionShared<8> = MotionShared::new();
        let mut machine = Machine::new(&MachineConfig::default(), &shared).unwrap();
        machine
            .move_to(&AxisPosition::new(10.0, 0.0, 0.0, 0.0), &travel(50.0))
            .unwrap();
        assert_eq!(machine.home(0b111), Err(HomingError::Busy));
    }
}
