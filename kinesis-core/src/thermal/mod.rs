//! Heater regulation
//!
//! Each configured heater gets a [`HeaterChannel`] (regulator, residency
//! gate, output duty) paired with a [`ThermalSupervisor`]. The bank runs
//! once per control period in the main context, independent of motion.
//! A supervisor fault forces the channel off and asserts the emergency
//! stop; any emergency stop turns every heater off.

pub mod bang_bang;
pub mod channel;
pub mod pid;
pub mod regulator;

pub use bang_bang::BangBang;
pub use channel::{HeaterChannel, HeaterId};
pub use pid::Pid;
pub use regulator::{Regulator, ResidencyTimer};

use heapless::Vec;

use crate::config::{PidGains, ThermalConfig};
use crate::safety::{EmergencyStop, ProtectionState, StopCause, ThermalFault, ThermalSupervisor};
use crate::traits::{HeaterOutput, SensorError, TemperatureSensor};

/// Largest number of heater channels
pub const MAX_HEATERS: usize = 3;

/// Rejected heater commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThermalError {
    /// No such heater on this machine
    Unconfigured,
    /// Emergency stop asserted; heaters stay off
    Halted,
    /// Channel latched a fault and needs a reset
    Fault(ThermalFault),
}

impl From<ThermalFault> for ThermalError {
    fn from(fault: ThermalFault) -> Self {
        ThermalError::Fault(fault)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Heater {
    channel: HeaterChannel,
    supervisor: ThermalSupervisor,
}

/// All heater channels of a machine
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalBank {
    heaters: Vec<Heater, MAX_HEATERS>,
    period_s: f32,
}

impl ThermalBank {
    pub fn new(config: &ThermalConfig) -> Self {
        let mut heaters = Vec::new();
        let configured = [
            (HeaterId::Hotend, Some(config.hotend)),
            (HeaterId::Bed, config.bed),
            (HeaterId::Chamber, config.chamber),
        ];
        for (id, heater) in configured {
            if let Some(heater) = heater {
                // At most MAX_HEATERS entries by construction
                let _ = heaters.push(Heater {
                    channel: HeaterChannel::new(id, heater),
                    supervisor: ThermalSupervisor::new(),
                });
            }
        }
        Self {
            heaters,
            period_s: config.period_s,
        }
    }

    /// Control period (s)
    pub fn period_s(&self) -> f32 {
        self.period_s
    }

    pub fn channels(&self) -> impl Iterator<Item = &HeaterChannel> + '_ {
        self.heaters.iter().map(|h| &h.channel)
    }

    pub fn channel(&self, id: HeaterId) -> Option<&HeaterChannel> {
        self.heaters.iter().find(|h| h.channel.id() == id).map(|h| &h.channel)
    }

    /// Protection state of a heater
    pub fn protection(&self, id: HeaterId) -> Option<ProtectionState> {
        self.heater(id).map(|h| h.supervisor.state())
    }

    /// First latched fault across all heaters
    pub fn fault(&self) -> Option<(HeaterId, ThermalFault)> {
        self.heaters
            .iter()
            .find_map(|h| h.supervisor.fault().map(|f| (h.channel.id(), f)))
    }

    /// Change a set-point; returns the applied (clamped) target
    pub fn set_target(&mut self, id: HeaterId, celsius: f32) -> Result<f32, ThermalError> {
        let heater = self.heater_mut(id).ok_or(ThermalError::Unconfigured)?;
        if let Some(fault) = heater.supervisor.fault() {
            return Err(ThermalError::Fault(fault));
        }
        Ok(heater.channel.set_target(celsius))
    }

    /// Install autotuned PID gains
    pub fn set_gains(&mut self, id: HeaterId, gains: PidGains) -> Result<bool, ThermalError> {
        let heater = self.heater_mut(id).ok_or(ThermalError::Unconfigured)?;
        Ok(heater.channel.set_gains(gains))
    }

    /// Whether a heater reached its target and held it for the residency time
    pub fn is_settled(&self, id: HeaterId) -> bool {
        self.channel(id).is_some_and(|c| c.is_settled())
    }

    /// Run one control period for a heater given its reading
    ///
    /// Returns the duty to apply. A supervisor fault forces the channel
    /// off and triggers the emergency stop.
    pub fn update(
        &mut self,
        id: HeaterId,
        reading: Result<f32, SensorError>,
        estop: &EmergencyStop,
    ) -> Result<u8, ThermalError> {
        let dt = self.period_s;
        let heater = self.heater_mut(id).ok_or(ThermalError::Unconfigured)?;
        heater.channel.update(reading, dt);
        if estop.is_triggered() {
            heater.channel.shutdown();
        }
        if let Err(fault) = heater.supervisor.observe(&heater.channel, dt) {
            heater.channel.fault();
            estop.trigger(StopCause::Thermal);
            return Err(ThermalError::Fault(fault));
        }
        Ok(heater.channel.duty())
    }

    /// Read a sensor, run the control period and drive the output
    pub fn service<S, H>(
        &mut self,
        id: HeaterId,
        sensor: &mut S,
        output: &mut H,
        estop: &EmergencyStop,
    ) -> Result<u8, ThermalError>
    where
        S: TemperatureSensor,
        H: HeaterOutput,
    {
        let reading = sensor.read_celsius();
        match self.update(id, reading, estop) {
            Ok(duty) => {
                output.set_duty(duty);
                Ok(duty)
            }
            Err(e) => {
                output.off();
                Err(e)
            }
        }
    }

    /// Turn every heater off
    pub fn shutdown(&mut self) {
        for heater in self.heaters.iter_mut() {
            heater.channel.shutdown();
        }
    }

    /// Acknowledge latched faults
    ///
    /// Heaters come back off; set-points must be issued again.
    pub fn clear_faults(&mut self) {
        for heater in self.heaters.iter_mut() {
            heater.channel.clear_fault();
            heater.channel.shutdown();
            heater.supervisor.reset();
        }
    }

    fn heater(&self, id: HeaterId) -> Option<&Heater> {
        self.heaters.iter().find(|h| h.channel.id() == id)
    }

    fn heater_mut(&mut self, id: HeaterId) -> Option<&mut Heater> {
        self.heaters.iter_mut().find(|h| h.channel.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TraceSensor {
        temps: &'static [f32],
        index: usize,
    }

    impl TemperatureSensor for TraceSensor {
        fn read_celsius(&mut self) -> Result<f32, SensorError> {
            let t = self
                .temps
                .get(self.index)
                .or(self.temps.last())
                .copied()
                .ok_or(SensorError::ConversionError)?;
            self.index += 1;
            Ok(t)
        }
    }

    #[derive(Default)]
    struct MockHeater {
        duty: u8,
    }

    impl HeaterOutput for MockHeater {
        fn set_duty(&mut self, duty: u8) {
            self.duty = duty;
        }

        fn duty(&self) -> u8 {
            self.duty
        }
    }

    #[test]
    fn test_configured_channels() {
        let bank = ThermalBank::new(&ThermalConfig::default());
        assert_eq!(bank.channels().count(), 2);
        assert!(bank.channel(HeaterId::Chamber).is_none());

        let mut bank = bank;
        assert_eq!(
            bank.set_target(HeaterId::Chamber, 40.0),
            Err(ThermalError::Unconfigured)
        );
    }

    #[test]
    fn test_service_drives_output() {
        let mut bank = ThermalBank::new(&ThermalConfig::default());
        let estop = EmergencyStop::new();
        let mut sensor = TraceSensor {
            temps: &[25.0],
            index: 0,
        };
        let mut heater = MockHeater::default();
        bank.set_target(HeaterId::Hotend, 210.0).unwrap();
        let duty = bank
            .service(HeaterId::Hotend, &mut sensor, &mut heater, &estop)
            .unwrap();
        assert_eq!(duty, 255);
        assert!(heater.is_on());
        assert_eq!(bank.protection(HeaterId::Hotend), Some(ProtectionState::Heating));
    }

    #[test]
    fn test_missing_reading_is_sensor_fault() {
        let mut bank = ThermalBank::new(&ThermalConfig::default());
        let estop = EmergencyStop::new();
        let mut sensor = TraceSensor {
            temps: &[],
            index: 0,
        };
        let mut heater = MockHeater { duty: 200 };
        let result = bank.service(HeaterId::Hotend, &mut sensor, &mut heater, &estop);
        assert_eq!(result, Err(ThermalError::Fault(ThermalFault::SensorFault)));
        assert_eq!(heater.duty(), 0);
    }

    #[test]
    fn test_estop_turns_heaters_off() {
        let mut bank = ThermalBank::new(&ThermalConfig::default());
        let estop = EmergencyStop::new();
        bank.set_target(HeaterId::Bed, 60.0).unwrap();
        assert_eq!(bank.update(HeaterId::Bed, Ok(20.0), &estop), Ok(255));

        estop.trigger(StopCause::External);
        assert_eq!(bank.update(HeaterId::Bed, Ok(20.0), &estop), Ok(0));
        assert_eq!(bank.channel(HeaterId::Bed).unwrap().target(), 0.0);
    }

    #[test]
    fn test_fault_triggers_estop() {
        let mut bank = ThermalBank::new(&ThermalConfig::default());
        let estop = EmergencyStop::new();
        let mut sensor = TraceSensor {
            temps: &[290.0],
            index: 0,
        };
        let mut heater = MockHeater { duty: 200 };
        let result = bank.service(HeaterId::Hotend, &mut sensor, &mut heater, &estop);
        assert_eq!(result, Err(ThermalError::Fault(ThermalFault::MaxTemp)));
        assert_eq!(heater.duty(), 0);
        assert_eq!(estop.cause(), Some(StopCause::Thermal));
        assert_eq!(bank.fault(), Some((HeaterId::Hotend, ThermalFault::MaxTemp)));
        assert_eq!(
            bank.set_target(HeaterId::Hotend, 200.0),
            Err(ThermalError::Fault(ThermalFault::MaxTemp))
        );

        bank.clear_faults();
        assert_eq!(bank.fault(), None);
        assert_eq!(bank.set_target(HeaterId::Hotend, 200.0), Ok(200.0));
    }

    #[test]
    fn test_heating_failure_end_to_end() {
        let mut bank = ThermalBank::new(&ThermalConfig::default());
        let estop = EmergencyStop::new();
        bank.set_target(HeaterId::Hotend, 200.0).unwrap();
        let mut ticks = 0u32;
        // Disconnected heater cartridge: the reading never moves
        while bank.update(HeaterId::Hotend, Ok(24.0), &estop).is_ok() {
            ticks += 1;
            assert!(ticks < 1000);
        }
        // 20 s watch period at 0.1 s per tick
        assert!((199..=202).contains(&ticks), "ticks {}", ticks);
        assert!(estop.is_triggered());
        assert_eq!(bank.fault(), Some((HeaterId::Hotend, ThermalFault::HeatingFailed)));
    }
}
