//! Command handling
//!
//! Owns the [`Machine`] together with the heater I/O and turns host
//! commands into machine calls. Heater I/O is either regulated by the
//! machine's thermal bank or lent to a relay autotuner.

use defmt::*;

use kinesis_core::motion::{BufferOutcome, MoveError};
use kinesis_core::thermal::HeaterId;
use kinesis_core::traits::{HeaterOutput, TemperatureSensor};
use kinesis_core::Machine;
use kinesis_drivers::heater::{AutotuneConfig, AutotuneState, Autotuner, PwmHeater, SsrHeater};
use kinesis_drivers::sensor::Ntc100kSensor;

use crate::board::{AdcInput, Pin, Pwm};
use crate::link::Command;

pub type Thermistor = Ntc100kSensor<AdcInput>;
pub type HotendHeater = PwmHeater<Pwm<embassy_rp::pwm::PwmOutput<'static>>>;
pub type BedHeater = SsrHeater<Pin>;

/// Why an autotune request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum TuneError {
    /// Heater not fitted on this board
    Unconfigured,
    /// Already tuning
    Busy,
    /// Emergency stop asserted
    Halted,
    /// Target above what the heater accepts
    TargetTooHigh,
}

enum Slot<S, H> {
    Regulated(S, H),
    Tuning(Autotuner<S, H>),
    Empty,
}

/// Sensor and output of one heater
pub struct HeaterIo<S, H> {
    id: HeaterId,
    slot: Slot<S, H>,
}

impl<S: TemperatureSensor, H: HeaterOutput> HeaterIo<S, H> {
    pub fn new(id: HeaterId, sensor: S, heater: H) -> Self {
        Self {
            id,
            slot: Slot::Regulated(sensor, heater),
        }
    }

    pub fn is_tuning(&self) -> bool {
        matches!(self.slot, Slot::Tuning(_))
    }

    /// Heater output, wherever it currently lives
    pub fn output_mut(&mut self) -> Option<&mut H> {
        match &mut self.slot {
            Slot::Regulated(_, heater) => Some(heater),
            Slot::Tuning(tuner) => Some(tuner.heater_mut()),
            Slot::Empty => None,
        }
    }

    /// Run one thermal control period
    pub fn service(&mut self, machine: &mut Machine<'static>) {
        let id = self.id;
        match &mut self.slot {
            Slot::Regulated(sensor, heater) => {
                if let Err(e) = machine.service_heater(id, sensor, heater) {
                    trace!("{:?} off: {:?}", id, e);
                }
            }
            Slot::Tuning(tuner) => {
                if machine.state().is_halted() {
                    tuner.cancel();
                }
                match tuner.update() {
                    Ok(AutotuneState::Heating | AutotuneState::Cycling) => {}
                    Ok(AutotuneState::Complete) => {
                        if let Some(result) = tuner.result() {
                            info!(
                                "{:?} autotune done: Ku={} Tu={}s a={}",
                                id, result.ku, result.tu, result.amplitude
                            );
                            if let Err(e) = machine.set_heater_gains(id, result.gains) {
                                warn!("{:?} gains rejected: {:?}", id, e);
                            }
                        }
                        self.finish_tuning();
                    }
                    Ok(state) => {
                        warn!("{:?} autotune ended: {:?}", id, state);
                        self.finish_tuning();
                    }
                    Err(e) => {
                        warn!("{:?} autotune sensor fault: {:?}", id, e);
                        self.finish_tuning();
                    }
                }
            }
            Slot::Empty => {}
        }
    }

    /// Lend the heater to a relay autotuner oscillating around `celsius`
    ///
    /// The machine's set-point for the heater drops to zero first so the
    /// regulator does not fight the relay when tuning ends.
    pub fn start_autotune(
        &mut self,
        machine: &mut Machine<'static>,
        celsius: f32,
    ) -> Result<(), TuneError> {
        if machine.state().is_halted() {
            return Err(TuneError::Halted);
        }
        let config = machine
            .thermal()
            .channel(self.id)
            .map(|channel| *channel.config())
            .ok_or(TuneError::Unconfigured)?;
        if celsius > config.max_target() {
            return Err(TuneError::TargetTooHigh);
        }
        let (sensor, heater) = match core::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Regulated(sensor, heater) => (sensor, heater),
            other => {
                self.slot = other;
                return Err(TuneError::Busy);
            }
        };
        if machine.set_heater_target(self.id, 0.0).is_err() {
            self.slot = Slot::Regulated(sensor, heater);
            return Err(TuneError::Halted);
        }

        let mut tuner = Autotuner::new(
            sensor,
            heater,
            AutotuneConfig {
                target: celsius,
                max_temp: config.max_temp,
                period_s: machine.config().thermal.period_s,
                ..AutotuneConfig::default()
            },
        );
        tuner.start();
        self.slot = Slot::Tuning(tuner);
        Ok(())
    }

    /// Abort a running autotune and open the heater
    pub fn halt(&mut self) {
        if let Slot::Tuning(tuner) = &mut self.slot {
            tuner.cancel();
            self.finish_tuning();
        }
        if let Some(heater) = self.output_mut() {
            heater.off();
        }
    }

    fn finish_tuning(&mut self) {
        if let Slot::Tuning(tuner) = core::mem::replace(&mut self.slot, Slot::Empty) {
            let (sensor, heater) = tuner.release();
            self.slot = Slot::Regulated(sensor, heater);
        }
    }
}

/// Machine plus the board's heater I/O
pub struct Controller {
    machine: Machine<'static>,
    hotend: HeaterIo<Thermistor, HotendHeater>,
    bed: HeaterIo<Thermistor, BedHeater>,
    /// Halt already acted on
    halted: bool,
}

impl Controller {
    pub fn new(
        machine: Machine<'static>,
        hotend: HeaterIo<Thermistor, HotendHeater>,
        bed: HeaterIo<Thermistor, BedHeater>,
    ) -> Self {
        Self {
            machine,
            hotend,
            bed,
            halted: false,
        }
    }

    pub fn machine(&self) -> &Machine<'static> {
        &self.machine
    }

    /// Main-loop housekeeping
    pub fn service(&mut self) {
        if let Err(e) = self.machine.service() {
            warn!("Homing failed: {:?}", e);
        }
        self.check_halt();
    }

    /// One thermal control period
    pub fn service_thermal(&mut self) {
        self.hotend.service(&mut self.machine);
        self.bed.service(&mut self.machine);
        if let Some(relay) = self.bed.output_mut() {
            relay.tick();
        }
        self.check_halt();
    }

    /// Apply one host command
    ///
    /// Returns the command when it could not be taken yet and must be
    /// offered again after the next service pass.
    pub fn handle(&mut self, command: Command) -> Option<Command> {
        match command {
            Command::Move { target, params } => match self.machine.move_to(&target, &params) {
                Ok(BufferOutcome::Stalled) => return Some(command),
                Ok(_) => {}
                Err(e) => warn!("Move rejected: {:?}", e),
            },
            Command::Home { axes } => {
                if let Err(e) = self.machine.home(axes) {
                    warn!("Home rejected: {:?}", e);
                }
            }
            Command::SetTemperature { heater, celsius } => {
                if self.is_tuning(heater) {
                    warn!("{:?} is autotuning", heater);
                } else {
                    match self.machine.set_heater_target(heater, celsius) {
                        Ok(applied) => info!("{:?} target {}", heater, applied),
                        Err(e) => warn!("{:?} target rejected: {:?}", heater, e),
                    }
                }
            }
            Command::SetGains { heater, gains } => {
                if let Err(e) = self.machine.set_heater_gains(heater, gains) {
                    warn!("{:?} gains rejected: {:?}", heater, e);
                }
            }
            Command::Autotune { heater, celsius } => {
                let result = match heater {
                    HeaterId::Hotend => self.hotend.start_autotune(&mut self.machine, celsius),
                    HeaterId::Bed => self.bed.start_autotune(&mut self.machine, celsius),
                    HeaterId::Chamber => Err(TuneError::Unconfigured),
                };
                match result {
                    Ok(()) => info!("{:?} autotune at {}", heater, celsius),
                    Err(e) => warn!("{:?} autotune refused: {:?}", heater, e),
                }
            }
            Command::SetLeveling { enabled } => {
                if let Err(e) = self.machine.set_leveling(enabled) {
                    warn!("Leveling rejected: {:?}", e);
                }
            }
            Command::SetFadeHeight { height } => {
                if let Err(e) = self.machine.set_fade_height(height) {
                    warn!("Fade height rejected: {:?}", e);
                }
            }
            Command::EditMeshPoint { ix, iy, z } => {
                if let Err(e) = self.machine.edit_mesh_point(ix as usize, iy as usize, z) {
                    warn!("Mesh edit rejected: {:?}", e);
                }
            }
            Command::SmartFillMesh => match self.machine.smart_fill_mesh() {
                Ok(filled) => info!("Filled {} mesh points", filled),
                Err(e) => warn!("Mesh fill rejected: {:?}", e),
            },
            Command::EmergencyStop => {
                self.machine.emergency_stop();
                self.check_halt();
            }
            Command::ResetFault => match self.machine.reset_fault() {
                Ok(()) => {
                    self.halted = false;
                    info!("Fault cleared, homing required");
                }
                Err(MoveError::Busy) => return Some(command),
                Err(e) => warn!("Reset failed: {:?}", e),
            },
        }
        None
    }

    fn is_tuning(&self, id: HeaterId) -> bool {
        match id {
            HeaterId::Hotend => self.hotend.is_tuning(),
            HeaterId::Bed => self.bed.is_tuning(),
            HeaterId::Chamber => false,
        }
    }

    /// Open every heater once after the machine halts
    fn check_halt(&mut self) {
        let state = self.machine.state();
        if state.is_halted() && !self.halted {
            error!("Machine halted: {:?}", state);
            self.halted = true;
            self.hotend.halt();
            self.bed.halt();
        }
    }
}
