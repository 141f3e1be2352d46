//! The heater device model
//!
//! The station drives three physically distinct heaters. The two irons share
//! one power channel at runtime (the plugged-in handle decides which), but
//! each keeps its own configuration, calibration and PID set, so most of the
//! code is indexed by `Device`.

use serde::{Deserialize, Serialize};

/// Lowest settable iron temperature, Celsius
pub const IRON_TEMP_MIN_C: u16 = 200;
/// Highest settable iron temperature, Celsius
pub const IRON_TEMP_MAX_C: u16 = 450;
/// Iron limit with the safe-iron-mode flag set
pub const IRON_TEMP_MAX_SAFE_C: u16 = 400;
/// Lowest settable hot-air-gun temperature, Celsius
pub const GUN_TEMP_MIN_C: u16 = 100;
/// Highest settable hot-air-gun temperature, Celsius
pub const GUN_TEMP_MAX_C: u16 = 500;
/// Floor applied instead of the device minimum for standby setpoints
pub const BELOW_MIN_FLOOR_C: u16 = 100;

/// A heater channel of the station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Device {
    /// Hakko T12 cartridge iron
    T12 = 0,
    /// JBC iron (C245 cartridges use the same channel)
    Jbc = 1,
    /// Hot-air gun with DC fan
    Gun = 2,
}

/// Number of devices, used to size per-device tables
pub const DEVICE_COUNT: usize = 3;

impl Device {
    /// Per-device table index
    pub const fn index(self) -> usize {
        self as usize
    }

    /// True for either iron channel
    pub const fn is_iron(self) -> bool {
        matches!(self, Device::T12 | Device::Jbc)
    }

    /// Lowest settable temperature, Celsius
    pub const fn temp_min_c(self) -> u16 {
        match self {
            Device::T12 | Device::Jbc => IRON_TEMP_MIN_C,
            Device::Gun => GUN_TEMP_MIN_C,
        }
    }

    /// Highest settable temperature, Celsius
    ///
    /// Safe-iron-mode lowers the iron ceiling; the gun is unaffected.
    pub const fn temp_max_c(self, safe_iron_mode: bool) -> u16 {
        match self {
            Device::T12 | Device::Jbc => {
                if safe_iron_mode {
                    IRON_TEMP_MAX_SAFE_C
                } else {
                    IRON_TEMP_MAX_C
                }
            }
            Device::Gun => GUN_TEMP_MAX_C,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits() {
        assert_eq!(Device::T12.temp_min_c(), 200);
        assert_eq!(Device::T12.temp_max_c(false), 450);
        assert_eq!(Device::Jbc.temp_max_c(true), 400);
        assert_eq!(Device::Gun.temp_min_c(), 100);
        assert_eq!(Device::Gun.temp_max_c(true), 500);
    }

    #[test]
    fn test_indices_are_stable() {
        // Persisted records rely on these indices
        assert_eq!(Device::T12.index(), 0);
        assert_eq!(Device::Jbc.index(), 1);
        assert_eq!(Device::Gun.index(), 2);
    }
}
