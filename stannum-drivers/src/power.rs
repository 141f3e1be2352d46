//! Acquisition and power pipeline
//!
//! Two ADC groups run under DMA, triggered by output-compare events of the
//! mains-synchronised timer: group A samples currents plus the gun and MCU
//! housekeeping channels, group B oversamples the iron temperature 4x and
//! the ambient sensor. This module owns the three-state `adc_mode`
//! handshake between the triggers and the completions, the duty clamps, the
//! AC-sense watchdog and the reentrancy error counter.
//!
//! Samples for a heater strictly alternate current/temperature, and the
//! duty computed from a temperature frame is handed back to the caller
//! before the next frame can start; a trigger that arrives while the
//! pipeline is busy zeroes every output and is counted.

use crate::unit::{GunUnit, IronUnit};
use stannum_core::traits::UnitController;

/// Quiet time before the temperature sample, timer counts (microseconds)
pub const IRON_PWM_GUARD: u16 = 40;
/// Heater duty limit of the gun, half-cycles
pub const MAX_GUN_PWM: u16 = 99;
/// Spacing of the AC-sense watchdog checks
pub const AC_CHECK_PERIOD_MS: u32 = 41;

/// The ADC handshake: `Idle -> Current -> Idle -> Temp -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcMode {
    Idle,
    Current,
    Temp,
}

/// A trigger arrived while the previous conversion was still in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reentrancy;

/// Group A: `[iron_current, fan_current, gun_temp, vref_int, mcu_temp]`
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentFrame {
    pub iron_current: u16,
    pub fan_current: u16,
    pub gun_temp: u16,
    pub vref: u16,
    pub mcu_temp: u16,
}

impl From<[u16; 5]> for CurrentFrame {
    fn from(raw: [u16; 5]) -> Self {
        Self {
            iron_current: raw[0],
            fan_current: raw[1],
            gun_temp: raw[2],
            vref: raw[3],
            mcu_temp: raw[4],
        }
    }
}

/// Group B: `[iron_temp x4, ambient]`
#[derive(Debug, Clone, Copy, Default)]
pub struct TempFrame {
    pub iron: [u16; 4],
    pub ambient: u16,
}

impl From<[u16; 5]> for TempFrame {
    fn from(raw: [u16; 5]) -> Self {
        Self {
            iron: [raw[0], raw[1], raw[2], raw[3]],
            ambient: raw[4],
        }
    }
}

/// The pipeline state shared between trigger and completion context
pub struct PowerPipeline {
    mode: AdcMode,
    errors: u32,
    max_iron_pwm: u16,
    ac_ok: bool,
    ac_counter: u16,
    ac_check_at: u32,
}

impl PowerPipeline {
    /// `iron_pwm_period` is the iron timer period; the duty stops a guard
    /// interval short of it so switching noise cannot reach the next
    /// temperature sample
    pub fn new(iron_pwm_period: u16) -> Self {
        Self {
            mode: AdcMode::Idle,
            errors: 0,
            max_iron_pwm: iron_pwm_period.saturating_sub(IRON_PWM_GUARD),
            ac_ok: false,
            ac_counter: 0,
            ac_check_at: 0,
        }
    }

    pub fn mode(&self) -> AdcMode {
        self.mode
    }

    /// Reentrancy faults seen so far
    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn ac_ok(&self) -> bool {
        self.ac_ok
    }

    /// Output-compare trigger: start the current acquisition
    ///
    /// On `Err` the caller must force every PWM to zero before continuing.
    pub fn begin_current(&mut self) -> Result<(), Reentrancy> {
        self.begin(AdcMode::Current)
    }

    /// Output-compare trigger: start the temperature acquisition
    pub fn begin_temp(&mut self) -> Result<(), Reentrancy> {
        self.begin(AdcMode::Temp)
    }

    fn begin(&mut self, mode: AdcMode) -> Result<(), Reentrancy> {
        if self.mode != AdcMode::Idle {
            self.errors += 1;
            self.mode = AdcMode::Idle;
            return Err(Reentrancy);
        }
        self.mode = mode;
        Ok(())
    }

    /// Group A conversion complete
    ///
    /// Current readings only count while the matching output was actually
    /// powered; an idle winding reads noise.
    pub fn complete_current(
        &mut self,
        frame: &CurrentFrame,
        iron: &mut IronUnit,
        gun: &mut GunUnit,
        iron_powered: bool,
        fan_powered: bool,
    ) {
        if iron_powered {
            iron.update_current(frame.iron_current);
        }
        if fan_powered {
            gun.update_current(frame.fan_current);
        }
        gun.update_temp(frame.gun_temp);
        self.mode = AdcMode::Idle;
    }

    /// Group B conversion complete; returns the iron duty to program
    pub fn complete_temp(&mut self, frame: &TempFrame, iron: &mut IronUnit) -> u16 {
        let sum: u32 = frame.iron.iter().map(|&s| s as u32).sum();
        let average = ((sum + 2) >> 2) as u16;
        iron.update_temp(average);

        let duty = iron.power().min(self.max_iron_pwm);
        self.mode = AdcMode::Idle;
        if self.ac_ok {
            duty
        } else {
            0
        }
    }

    /// Gun-timer callback; returns the heater duty in half-cycles
    pub fn gun_tick(&mut self, gun: &mut GunUnit) -> u16 {
        let duty = gun.power().min(MAX_GUN_PWM);
        if self.ac_ok {
            duty
        } else {
            0
        }
    }

    /// AC-sense watchdog: `counter` is clocked by the zero-crossing signal
    ///
    /// If it has not advanced between two checks the mains is gone and all
    /// outputs stay at zero until it comes back.
    pub fn check_ac(&mut self, counter: u16, now_ms: u32) -> bool {
        if now_ms >= self.ac_check_at {
            self.ac_ok = counter != self.ac_counter;
            self.ac_counter = counter;
            self.ac_check_at = now_ms + AC_CHECK_PERIOD_MS;
        }
        self.ac_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stannum_core::config::PidTable;
    use stannum_core::device::Device;

    fn units() -> (IronUnit, GunUnit) {
        let table = PidTable::default();
        (
            IronUnit::new(table.params(Device::T12)),
            GunUnit::new(table.params(Device::Gun)),
        )
    }

    fn pipeline_with_ac() -> PowerPipeline {
        let mut p = PowerPipeline::new(1999);
        p.check_ac(1, 0);
        p
    }

    fn temp_frame(raw: u16) -> TempFrame {
        TempFrame {
            iron: [raw, raw, raw, raw],
            ambient: 2000,
        }
    }

    #[test]
    fn test_handshake_cycle() {
        let (mut iron, mut gun) = units();
        let mut p = pipeline_with_ac();

        assert_eq!(p.mode(), AdcMode::Idle);
        p.begin_current().unwrap();
        assert_eq!(p.mode(), AdcMode::Current);
        p.complete_current(&CurrentFrame::default(), &mut iron, &mut gun, false, false);
        assert_eq!(p.mode(), AdcMode::Idle);

        p.begin_temp().unwrap();
        assert_eq!(p.mode(), AdcMode::Temp);
        p.complete_temp(&temp_frame(1000), &mut iron);
        assert_eq!(p.mode(), AdcMode::Idle);
        assert_eq!(p.errors(), 0);
    }

    #[test]
    fn test_reentrancy_counts_and_recovers() {
        let mut p = pipeline_with_ac();
        p.begin_current().unwrap();
        // The temperature trigger fires before the current conversion
        // finished
        assert_eq!(p.begin_temp(), Err(Reentrancy));
        assert_eq!(p.errors(), 1);
        // The pipeline resets and accepts the next trigger
        p.begin_temp().unwrap();
    }

    #[test]
    fn test_iron_duty_is_clamped_below_the_guard() {
        let (mut iron, _) = units();
        let mut p = pipeline_with_ac();
        iron.set_temp(3000);
        iron.switch_power(true);

        p.begin_temp().unwrap();
        let duty = p.complete_temp(&temp_frame(500), &mut iron);
        assert_eq!(duty, 1999 - IRON_PWM_GUARD);
    }

    #[test]
    fn test_disarmed_units_read_zero_duty() {
        let (mut iron, mut gun) = units();
        let mut p = pipeline_with_ac();
        iron.set_temp(3000);
        gun.set_temp(2500);

        p.begin_temp().unwrap();
        assert_eq!(p.complete_temp(&temp_frame(500), &mut iron), 0);
        assert_eq!(p.gun_tick(&mut gun), 0);
    }

    #[test]
    fn test_no_ac_forces_zero_output() {
        let (mut iron, mut gun) = units();
        let mut p = PowerPipeline::new(1999);
        iron.set_temp(3000);
        iron.switch_power(true);
        gun.set_temp(2500);
        gun.switch_power(true);

        // The counter never advances: watchdog reports no mains
        p.check_ac(5, 0);
        p.check_ac(5, 50);
        assert!(!p.ac_ok());

        p.begin_temp().unwrap();
        assert_eq!(p.complete_temp(&temp_frame(500), &mut iron), 0);
        for _ in 0..10 {
            gun.update_temp(500);
        }
        assert_eq!(p.gun_tick(&mut gun), 0);

        // Mains back: output resumes without user action
        p.check_ac(9, 100);
        assert!(p.ac_ok());
        p.begin_temp().unwrap();
        assert!(p.complete_temp(&temp_frame(500), &mut iron) > 0);
    }

    #[test]
    fn test_watchdog_respects_check_spacing() {
        let mut p = PowerPipeline::new(1999);
        p.check_ac(1, 0);
        // Within the spacing the verdict does not flip
        let before = p.ac_ok();
        p.check_ac(1, 10);
        assert_eq!(p.ac_ok(), before);
    }

    #[test]
    fn test_temperature_oversampling_average() {
        let (mut iron, _) = units();
        let mut p = pipeline_with_ac();
        let frame = TempFrame {
            iron: [1000, 1002, 1004, 1006],
            ambient: 2000,
        };
        p.begin_temp().unwrap();
        p.complete_temp(&frame, &mut iron);
        // Seeded from zero, one EMA step moves towards 1003
        assert!(iron.average_temp() > 0);
    }

    #[test]
    fn test_current_routing_requires_powered_outputs() {
        let (mut iron, mut gun) = units();
        let mut p = pipeline_with_ac();
        let frame = CurrentFrame {
            iron_current: 900,
            fan_current: 900,
            gun_temp: 450,
            vref: 1489,
            mcu_temp: 1774,
        };
        p.begin_current().unwrap();
        p.complete_current(&frame, &mut iron, &mut gun, false, false);
        assert_eq!(iron.unit_current(), 0);

        p.begin_current().unwrap();
        p.complete_current(&frame, &mut iron, &mut gun, true, true);
        assert!(iron.unit_current() > 0);
        assert!(gun.unit_current() > 0);
        // The gun temperature rides the current frame
        assert!(gun.average_temp() > 0);
    }

    #[test]
    fn test_gun_duty_clamped_to_half_cycles() {
        let (_, mut gun) = units();
        let mut p = pipeline_with_ac();
        gun.set_temp(3000);
        gun.switch_power(true);
        for _ in 0..10 {
            gun.update_temp(500);
        }
        assert_eq!(p.gun_tick(&mut gun), MAX_GUN_PWM);
    }
}
