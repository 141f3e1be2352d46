//! The iron channel
//!
//! Drives whichever handle is plugged in (T12 or JBC). The duty is a timer
//! compare value inside a mains half-cycle; the pipeline recomputes it on
//! every temperature frame. Connection is detected from the current sensor:
//! an armed iron must show a minimum current within a short window, and a
//! persistent absence reports the iron as missing.

use stannum_core::config::PidParams;
use stannum_core::filter::Ema;
use stannum_core::traits::{UnitController, UnitFault};

use super::{Overlay, Regulator};

/// Iron PWM timer period; duties beyond this saturate
pub const IRON_MAX_POWER: u16 = 1999;
/// Minimum raw current of a connected iron
const MIN_CURRENT: u16 = 100;
/// Current samples to collect after arming before judging connection
const CHECK_WINDOW: u16 = 8;

pub struct IronUnit {
    reg: Regulator,
    current: Ema,
    /// Current samples seen since the output was armed
    powered_samples: u16,
    connected: bool,
    /// Connection checking is off while no T12 handle is present
    check_enabled: bool,
}

impl IronUnit {
    pub fn new(params: PidParams) -> Self {
        Self {
            reg: Regulator::new(params, IRON_MAX_POWER),
            current: Ema::new(4),
            powered_samples: 0,
            connected: true,
            check_enabled: false,
        }
    }

    pub fn load_pid(&mut self, params: PidParams) {
        self.reg.pid.load(params);
    }

    pub fn dump_pid(&self) -> PidParams {
        self.reg.pid.dump()
    }

    /// Enable or disable the current-sense connection check
    pub fn enable_check(&mut self, enabled: bool) {
        self.check_enabled = enabled;
        if !enabled {
            self.connected = true;
        }
        self.powered_samples = 0;
    }

    /// Forget averaged history (tip changed)
    pub fn reset(&mut self) {
        self.reg.switch_power(false);
        self.powered_samples = 0;
        self.connected = true;
    }
}

impl UnitController for IronUnit {
    fn set_temp(&mut self, raw: u16) {
        self.reg.set_temp(raw);
    }

    fn preset_temp(&self) -> u16 {
        self.reg.pid.target()
    }

    fn switch_power(&mut self, on: bool) {
        if on {
            self.powered_samples = 0;
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
        self.current.update(raw as i32);
        if self.reg.on && self.check_enabled {
            if self.powered_samples < CHECK_WINDOW {
                self.powered_samples += 1;
            } else {
                self.connected = self.current.read() >= MIN_CURRENT as i32;
            }
        }
    }

    fn update_temp(&mut self, raw: u16) {
        self.reg.update_temp(raw);
    }

    fn power(&mut self) -> u16 {
        if self.check_enabled && !self.connected {
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
        self.current.read().clamp(0, u16::MAX as i32) as u16
    }

    fn is_connected(&self) -> bool {
        !self.check_enabled || self.connected
    }

    fn is_cold(&self) -> bool {
        self.reg.is_cold()
    }

    fn max_power(&self) -> u16 {
        IRON_MAX_POWER
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

    fn iron() -> IronUnit {
        IronUnit::new(PidTable::default().params(Device::T12))
    }

    fn feed_temp(unit: &mut IronUnit, raw: u16, n: usize) {
        for _ in 0..n {
            unit.update_temp(raw);
        }
    }

    #[test]
    fn test_disarmed_power_is_zero() {
        let mut unit = iron();
        unit.set_temp(2400);
        feed_temp(&mut unit, 1000, 10);
        assert_eq!(unit.power(), 0);

        unit.switch_power(true);
        assert!(unit.power() > 0);

        unit.switch_power(false);
        assert_eq!(unit.power(), 0);
    }

    #[test]
    fn test_fix_power_overrides_pid() {
        let mut unit = iron();
        unit.set_temp(2400);
        feed_temp(&mut unit, 2400, 10);
        unit.fix_power(333);
        assert_eq!(unit.power(), 333);

        // Zero fixed power disarms
        unit.fix_power(0);
        assert!(!unit.is_on());
        assert_eq!(unit.power(), 0);
    }

    #[test]
    fn test_fix_power_is_clamped() {
        let mut unit = iron();
        unit.fix_power(60_000u16.min(u16::MAX));
        assert_eq!(unit.power(), IRON_MAX_POWER);
    }

    #[test]
    fn test_overlays_move_setpoint_and_power_restores_it() {
        let mut unit = iron();
        unit.set_temp(2400);
        unit.switch_power(true);
        assert_eq!(unit.preset_temp(), 2400);

        unit.low_power_mode(1500);
        assert_eq!(unit.preset_temp(), 1500);

        // Re-arming drops the overlay
        unit.switch_power(true);
        assert_eq!(unit.preset_temp(), 2400);

        unit.boost_power_mode(2700);
        assert_eq!(unit.preset_temp(), 2700);
        unit.switch_power(true);
        assert_eq!(unit.preset_temp(), 2400);
    }

    #[test]
    fn test_safety_trip_latches() {
        let mut unit = iron();
        unit.set_temp(2400);
        unit.switch_power(true);
        feed_temp(&mut unit, 3900, 50);
        assert_eq!(unit.power(), 0);
        assert_eq!(unit.fault(), Some(UnitFault::OverTemperature));

        // Re-arming is refused while the fault is latched
        unit.switch_power(true);
        assert!(!unit.is_on());
        assert_eq!(unit.power(), 0);
    }

    #[test]
    fn test_connection_check() {
        let mut unit = iron();
        unit.enable_check(true);
        unit.set_temp(2400);
        unit.switch_power(true);
        assert!(unit.is_connected()); // no verdict yet

        // Armed but no current: reported missing after the window
        for _ in 0..20 {
            unit.update_current(0);
        }
        assert!(!unit.is_connected());
        // The next power computation disarms the output
        assert_eq!(unit.power(), 0);
        assert!(!unit.is_on());
    }

    #[test]
    fn test_connection_check_passes_with_current() {
        let mut unit = iron();
        unit.enable_check(true);
        unit.set_temp(2400);
        unit.switch_power(true);
        for _ in 0..20 {
            unit.update_current(800);
        }
        assert!(unit.is_connected());
        feed_temp(&mut unit, 1000, 5);
        assert!(unit.power() > 0);
    }

    #[test]
    fn test_power_percent() {
        let mut unit = iron();
        unit.fix_power(IRON_MAX_POWER);
        for _ in 0..200 {
            unit.power();
        }
        assert!(unit.avg_power_pcnt() >= 99);
    }
}
