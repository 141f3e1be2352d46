//! The hot-air gun channel
//!
//! The heater duty is an integer number of mains half-cycles out of 99, so
//! the pipeline evaluates it once per mains period instead of per
//! temperature frame. The DC fan has its own PWM channel and keeps blowing
//! through the cooling phase until the gun is cold; fan current doubles as
//! the connection signal.

use stannum_core::config::PidParams;
use stannum_core::filter::Ema;
use stannum_core::traits::{UnitController, UnitFault};

use super::{Overlay, Regulator};

/// Heater duty limit: half-cycles per mains period
pub const GUN_MAX_POWER: u16 = 99;
/// Fan PWM limits
pub const FAN_MIN_SPEED: u16 = 600;
pub const FAN_MAX_SPEED: u16 = 1999;
/// Minimum raw fan current of a connected gun
const MIN_FAN_CURRENT: u16 = 100;
/// Fan current samples to collect before judging connection
const CHECK_WINDOW: u16 = 8;

pub struct GunUnit {
    reg: Regulator,
    fan_current: Ema,
    fan_speed: u16,
    /// Cool at maximum fan speed when set
    fast_cooling: bool,
    fan_samples: u16,
    connected: bool,
}

impl GunUnit {
    pub fn new(params: PidParams) -> Self {
        Self {
            reg: Regulator::new(params, GUN_MAX_POWER),
            fan_current: Ema::new(4),
            fan_speed: FAN_MIN_SPEED,
            fast_cooling: false,
            fan_samples: 0,
            connected: true,
        }
    }

    pub fn load_pid(&mut self, params: PidParams) {
        self.reg.pid.load(params);
    }

    pub fn dump_pid(&self) -> PidParams {
        self.reg.pid.dump()
    }

    pub fn set_fast_cooling(&mut self, fast: bool) {
        self.fast_cooling = fast;
    }

    /// Fan preset used while the heater runs
    pub fn set_fan(&mut self, speed: u16) {
        self.fan_speed = speed.clamp(FAN_MIN_SPEED, FAN_MAX_SPEED);
    }

    pub fn fan_preset(&self) -> u16 {
        self.fan_speed
    }

    /// Fan duty for the pipeline
    ///
    /// The preset while the heater runs; during cool-down the fan keeps
    /// blowing (flat out in fast-cooling mode) until the gun is cold.
    pub fn fan_power(&self) -> u16 {
        if self.reg.on {
            self.fan_speed
        } else if !self.reg.is_cold() {
            if self.fast_cooling {
                FAN_MAX_SPEED
            } else {
                self.fan_speed
            }
        } else {
            0
        }
    }

    pub fn is_fan_working(&self) -> bool {
        self.fan_power() > 0
    }

    pub fn fan_pcnt(&self) -> u8 {
        (self.fan_power() as u32 * 100 / FAN_MAX_SPEED as u32).min(100) as u8
    }
}

impl UnitController for GunUnit {
    fn set_temp(&mut self, raw: u16) {
        self.reg.set_temp(raw);
    }

    fn preset_temp(&self) -> u16 {
        self.reg.pid.target()
    }

    fn switch_power(&mut self, on: bool) {
        if on {
            self.fan_samples = 0;
        }
        self.reg.switch_power(on);
    }

    fn is_on(&self) -> bool {
        self.reg.on
    }

    fn fix_power(&mut self, power: u16) {
        self.reg.fix_power(power);
    }

    fn low_power_mode(&mut self, raw: u16) {
        self.reg.overlay_setpoint(Overlay::LowPower, raw);
    }

    fn boost_power_mode(&mut self, raw: u16) {
        self.reg.overlay_setpoint(Overlay::Boost, raw);
    }

    fn update_current(&mut self, raw: u16) {
        self.fan_current.update(raw as i32);
        if self.is_fan_working() {
            if self.fan_samples < CHECK_WINDOW {
                self.fan_samples += 1;
            } else {
                self.connected = self.fan_current.read() >= MIN_FAN_CURRENT as i32;
            }
        }
    }

    fn update_temp(&mut self, raw: u16) {
        self.reg.update_temp(raw);
    }

    fn power(&mut self) -> u16 {
        if !self.connected {
            self.reg.switch_power(false);
        }
        self.reg.power()
    }

    fn average_temp(&self) -> u16 {
        self.reg.average_temp()
    }

    fn avg_power(&self) -> u16 {
        self.reg.avg_power()
    }

    fn avg_power_pcnt(&self) -> u8 {
        self.reg.avg_power_pcnt()
    }

    fn temp_dispersion(&self) -> u32 {
        self.reg.temp.dispersion()
    }

    fn pwr_dispersion(&self) -> u32 {
        self.reg.applied.dispersion()
    }

    fn unit_current(&self) -> u16 {
        self.fan_current.read().clamp(0, u16::MAX as i32) as u16
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_cold(&self) -> bool {
        self.reg.is_cold()
    }

    fn max_power(&self) -> u16 {
        GUN_MAX_POWER
    }

    fn fault(&self) -> Option<UnitFault> {
        self.reg.fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stannum_core::config::PidTable;
    use stannum_core::device::Device;

    fn gun() -> GunUnit {
        GunUnit::new(PidTable::default().params(Device::Gun))
    }

    fn feed_temp(unit: &mut GunUnit, raw: u16, n: usize) {
        for _ in 0..n {
            unit.update_temp(raw);
        }
    }

    #[test]
    fn test_duty_is_half_cycles() {
        let mut unit = gun();
        unit.set_temp(2400);
        unit.switch_power(true);
        feed_temp(&mut unit, 500, 10);
        let duty = unit.power();
        assert!(duty > 0 && duty <= GUN_MAX_POWER);
    }

    #[test]
    fn test_fan_keeps_blowing_through_cooling() {
        let mut unit = gun();
        unit.set_fan(1200);
        unit.set_temp(2400);
        unit.switch_power(true);
        feed_temp(&mut unit, 2400, 20);
        assert_eq!(unit.fan_power(), 1200);

        // Heater off while still hot: the fan keeps running
        unit.switch_power(false);
        assert_eq!(unit.power(), 0);
        assert!(unit.is_fan_working());

        // Gun cooled down: the fan stops
        feed_temp(&mut unit, 100, 50);
        assert!(unit.is_cold());
        assert!(!unit.is_fan_working());
    }

    #[test]
    fn test_fast_cooling_uses_full_fan() {
        let mut unit = gun();
        unit.set_fan(800);
        unit.set_fast_cooling(true);
        unit.set_temp(2400);
        unit.switch_power(true);
        feed_temp(&mut unit, 2400, 20);

        unit.switch_power(false);
        assert_eq!(unit.fan_power(), FAN_MAX_SPEED);
    }

    #[test]
    fn test_fan_preset_is_clamped() {
        let mut unit = gun();
        unit.set_fan(10);
        assert_eq!(unit.fan_preset(), FAN_MIN_SPEED);
        unit.set_fan(5000);
        assert_eq!(unit.fan_preset(), FAN_MAX_SPEED);
    }

    #[test]
    fn test_missing_fan_current_disconnects() {
        let mut unit = gun();
        unit.set_temp(2400);
        unit.switch_power(true);
        feed_temp(&mut unit, 2400, 10);
        for _ in 0..20 {
            unit.update_current(0);
        }
        assert!(!unit.is_connected());
        assert_eq!(unit.power(), 0);
        assert!(!unit.is_on());
    }

    #[test]
    fn test_safety_trip() {
        let mut unit = gun();
        unit.set_temp(2400);
        unit.switch_power(true);
        feed_temp(&mut unit, 3800, 50);
        assert_eq!(unit.power(), 0);
        assert_eq!(unit.fault(), Some(UnitFault::OverTemperature));
    }
}
