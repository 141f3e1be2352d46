//! Heater unit controllers
//!
//! [`IronUnit`] and [`GunUnit`] implement the shared
//! [`stannum_core::traits::UnitController`] capability set. The common
//! regulation state (PID, averages, setpoint overlays, safety envelope)
//! lives in the private [`Regulator`] and is composed, not inherited.

pub mod gun;
pub mod iron;

pub use gun::GunUnit;
pub use iron::IronUnit;

use stannum_core::config::PidParams;
use stannum_core::filter::DispersionMeter;
use stannum_core::tip::calibration::RAW_MAX;
use stannum_core::traits::UnitFault;

use crate::heater::Pid;

/// Averaged temperature that trips the safety envelope
const TEMP_TRIP_RAW: u16 = RAW_MAX;
/// Averaged temperature below which a heater counts as cold
const COLD_TEMP_RAW: u16 = 200;
/// Equivalent length of the temperature average
const TEMP_EMA_LEN: i32 = 8;
/// Equivalent length of the applied-power average
const POWER_EMA_LEN: i32 = 16;

/// Setpoint overlays on top of the stored preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlay {
    None,
    LowPower,
    Boost,
}

/// Shared closed-loop regulation state
struct Regulator {
    pid: Pid,
    temp: DispersionMeter,
    applied: DispersionMeter,
    /// The working setpoint behind any overlay
    preset: u16,
    overlay: Overlay,
    on: bool,
    fixed: Option<u16>,
    fault: Option<UnitFault>,
    max_power: u16,
}

impl Regulator {
    fn new(params: PidParams, max_power: u16) -> Self {
        Self {
            pid: Pid::new(params, max_power),
            temp: DispersionMeter::new(TEMP_EMA_LEN),
            applied: DispersionMeter::new(POWER_EMA_LEN),
            preset: 0,
            overlay: Overlay::None,
            on: false,
            fixed: None,
            fault: None,
            max_power,
        }
    }

    fn set_temp(&mut self, raw: u16) {
        self.preset = raw;
        self.overlay = Overlay::None;
        self.pid.set_target(raw);
    }

    fn switch_power(&mut self, on: bool) {
        if on {
            if self.fault.is_some() {
                return;
            }
            self.fixed = None;
            if self.overlay != Overlay::None {
                // Leaving an overlay restores the stored preset
                self.overlay = Overlay::None;
                self.pid.set_target(self.preset);
            }
            self.on = true;
        } else {
            // The requested duty drops with the flag in the same update;
            // the pipeline reads them through one call
            self.fixed = None;
            self.on = false;
        }
    }

    fn fix_power(&mut self, power: u16) {
        if power == 0 {
            self.fixed = None;
            self.on = false;
        } else if self.fault.is_none() {
            self.fixed = Some(power.min(self.max_power));
            self.on = true;
        }
    }

    fn overlay_setpoint(&mut self, overlay: Overlay, raw: u16) {
        if self.fault.is_some() {
            return;
        }
        self.overlay = overlay;
        self.pid.set_target(raw);
        self.on = true;
    }

    fn update_temp(&mut self, raw: u16) {
        self.temp.update(raw as i32);
    }

    /// Next duty value; zero whenever the unit must stay quiet
    fn power(&mut self) -> u16 {
        if self.temp.average() >= TEMP_TRIP_RAW as i32 {
            self.fault = Some(UnitFault::OverTemperature);
            self.fixed = None;
            self.on = false;
        }
        let duty = if !self.on {
            0
        } else if let Some(fixed) = self.fixed {
            fixed
        } else {
            self.pid.compute(self.temp.average())
        };
        self.applied.update(duty as i32);
        duty
    }

    fn average_temp(&self) -> u16 {
        self.temp.average().clamp(0, u16::MAX as i32) as u16
    }

    fn avg_power(&self) -> u16 {
        self.applied.average().clamp(0, u16::MAX as i32) as u16
    }

    fn avg_power_pcnt(&self) -> u8 {
        let pcnt = self.avg_power() as u32 * 100 / self.max_power as u32;
        pcnt.min(100) as u8
    }

    fn is_cold(&self) -> bool {
        self.temp.average() < COLD_TEMP_RAW as i32
    }
}
