//! PID coefficient sets
//!
//! Coefficients are unsigned 16-bit fixed-point values (hundredths). Each
//! device keeps a working set; a second, static "smooth" profile is used
//! during tip calibration to keep overshoot down while the curve is still
//! unknown.

use serde::{Deserialize, Serialize};

use crate::device::Device;

/// One PID coefficient triple, hundredths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidParams {
    pub kp: u16,
    pub ki: u16,
    pub kd: u16,
}

impl PidParams {
    pub const fn new(kp: u16, ki: u16, kd: u16) -> Self {
        Self { kp, ki, kd }
    }
}

/// Working coefficients for the three heater channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidTable {
    pub t12: PidParams,
    pub jbc: PidParams,
    pub gun: PidParams,
}

impl Default for PidTable {
    fn default() -> Self {
        Self {
            t12: PidParams::new(2300, 50, 735),
            jbc: PidParams::new(1479, 59, 507),
            gun: PidParams::new(200, 64, 195),
        }
    }
}

impl PidTable {
    pub fn params(&self, device: Device) -> PidParams {
        match device {
            Device::T12 => self.t12,
            Device::Jbc => self.jbc,
            Device::Gun => self.gun,
        }
    }

    pub fn set_params(&mut self, device: Device, params: PidParams) {
        match device {
            Device::T12 => self.t12 = params,
            Device::Jbc => self.jbc = params,
            Device::Gun => self.gun = params,
        }
    }

    /// Conservative profile loaded while calibrating an unknown tip
    pub const fn smooth(device: Device) -> PidParams {
        match device {
            Device::T12 => PidParams::new(575, 10, 200),
            Device::Jbc => PidParams::new(500, 3, 1700),
            Device::Gun => PidParams::new(150, 64, 50),
        }
    }
}
