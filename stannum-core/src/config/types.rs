//! Configuration record layout
//!
//! One record describes the whole station. It is persisted as a postcard
//! blob (see the persist module); everything here is plain data plus the
//! packing rules for the boost byte and the flag word.

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::tip::{RadixName, TipType};

/// Bytes reserved for the language name
pub const LANG_LENGTH: usize = 8;
/// Language selected when the record carries none
pub const DEFAULT_LANGUAGE: &str = "english";
/// Auto-off timeouts are capped at half an hour
pub const MAX_OFF_TIMEOUT_MIN: u8 = 30;
/// Boost duration bounds, seconds
pub const BOOST_DURATION_MIN_S: u16 = 20;
pub const BOOST_DURATION_MAX_S: u16 = 320;
/// Boost increment bound, Celsius
pub const BOOST_TEMP_MAX_C: u8 = 75;

/// The user flag word
///
/// A plain bit mask rather than a bool-per-field struct so the spare-copy
/// comparison and persistence stay trivial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigFlags(pub u16);

impl ConfigFlags {
    pub const CELSIUS: u16 = 1;
    pub const BUZZER: u16 = 2;
    /// T12 idle switch type: reed (set) or tilt (clear)
    pub const REED: u16 = 4;
    /// Arm the T12 right after power-on
    pub const AUTO_START: u16 = 8;
    pub const UPPER_ENC_CLOCKWISE: u16 = 16;
    pub const LOWER_ENC_CLOCKWISE: u16 = 32;
    /// Cool the gun at maximum fan speed
    pub const FAST_COOLING: u16 = 64;
    /// 5-degree encoder steps instead of 1-degree
    pub const BIG_STEP: u16 = 128;
    /// Display panel type: IPS (set) or TFT (clear)
    pub const IPS_DISPLAY: u16 = 256;
    /// Limit the iron ceiling temperature
    pub const SAFE_IRON_MODE: u16 = 512;

    pub const fn contains(self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u16, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

/// The persisted station configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigRecord {
    /// Preset temperatures in display units (Celsius or Fahrenheit)
    pub t12_temp: u16,
    pub jbc_temp: u16,
    pub gun_temp: u16,
    /// Gun fan preset in PWM counts
    pub gun_fan_speed: u16,
    /// Current tip of each iron channel
    pub t12_tip: RadixName,
    pub jbc_tip: RadixName,
    /// T12 standby temperature, Celsius; 0 disables the tilt feature
    pub t12_low_temp: u16,
    /// T12 standby delay in 5-second units
    pub t12_low_to: u8,
    /// Packed boost byte, see [`ConfigRecord::boost_temp`]
    pub boost: u8,
    /// Auto-off timeouts, minutes; 0 switches off immediately
    pub t12_off_timeout: u8,
    pub jbc_low_temp: u16,
    pub jbc_off_timeout: u8,
    pub gun_low_temp: u16,
    pub gun_off_timeout: u8,
    pub flags: ConfigFlags,
    /// Display brightness percent, 1-100
    pub dspl_bright: u8,
    /// Display rotation, quarter turns 0-3
    pub dspl_rotation: u8,
    pub language: heapless::String<LANG_LENGTH>,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        let mut language = heapless::String::new();
        let _ = language.push_str(DEFAULT_LANGUAGE);
        Self {
            t12_temp: 235,
            jbc_temp: 235,
            gun_temp: 200,
            gun_fan_speed: 1200,
            t12_tip: RadixName::new(TipType::T12, "NONE").unwrap_or_default(),
            jbc_tip: RadixName::new(TipType::Jbc, "NONE").unwrap_or_default(),
            t12_low_temp: 180,
            t12_low_to: 5,
            boost: 80,
            t12_off_timeout: 5,
            jbc_low_temp: 180,
            jbc_off_timeout: 5,
            gun_low_temp: 180,
            gun_off_timeout: 0,
            flags: ConfigFlags(
                ConfigFlags::CELSIUS
                    | ConfigFlags::BUZZER
                    | ConfigFlags::UPPER_ENC_CLOCKWISE
                    | ConfigFlags::LOWER_ENC_CLOCKWISE
                    | ConfigFlags::BIG_STEP,
            ),
            dspl_bright: 100,
            dspl_rotation: 1,
            language,
        }
    }
}

impl ConfigRecord {
    /// Preset temperature of a device, display units
    pub fn preset(&self, device: Device) -> u16 {
        match device {
            Device::T12 => self.t12_temp,
            Device::Jbc => self.jbc_temp,
            Device::Gun => self.gun_temp,
        }
    }

    pub fn set_preset(&mut self, device: Device, temp: u16) {
        match device {
            Device::T12 => self.t12_temp = temp,
            Device::Jbc => self.jbc_temp = temp,
            Device::Gun => self.gun_temp = temp,
        }
    }

    /// Standby temperature, Celsius; 0 disables the feature
    pub fn low_temp(&self, device: Device) -> u16 {
        match device {
            Device::T12 => self.t12_low_temp,
            Device::Jbc => self.jbc_low_temp,
            Device::Gun => self.gun_low_temp,
        }
    }

    /// Auto-off timeout, minutes
    pub fn off_timeout(&self, device: Device) -> u8 {
        match device {
            Device::T12 => self.t12_off_timeout,
            Device::Jbc => self.jbc_off_timeout,
            Device::Gun => self.gun_off_timeout,
        }
    }

    /// Current tip name of an iron channel; the gun has no stored tip
    pub fn current_tip(&self, device: Device) -> Option<RadixName> {
        match device {
            Device::T12 => Some(self.t12_tip),
            Device::Jbc => Some(self.jbc_tip),
            Device::Gun => None,
        }
    }

    /// Boost increment in Celsius: upper nibble, 5 degrees per unit
    pub fn boost_temp(&self) -> u8 {
        (self.boost >> 4) * 5
    }

    /// Boost duration in seconds: lower nibble, `(n + 1) * 20`
    pub fn boost_duration(&self) -> u16 {
        ((self.boost & 0x0F) as u16 + 1) * 20
    }

    /// Pack and store the boost parameters
    pub fn set_boost(&mut self, temp_c: u8, duration_s: u16) {
        let temp = temp_c.min(BOOST_TEMP_MAX_C);
        let duration = duration_s.clamp(BOOST_DURATION_MIN_S, BOOST_DURATION_MAX_S);
        let temp_units = (temp + 4) / 5;
        let duration_units = ((duration - 1) / 20) as u8;
        self.boost = (temp_units << 4) | (duration_units & 0x0F);
    }

    pub fn language(&self) -> &str {
        if self.language.is_empty() {
            DEFAULT_LANGUAGE
        } else {
            self.language.as_str()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cold_start() {
        let cfg = ConfigRecord::default();
        assert_eq!(cfg.preset(Device::T12), 235);
        assert_eq!(cfg.preset(Device::Jbc), 235);
        assert_eq!(cfg.preset(Device::Gun), 200);
        assert!(cfg.flags.contains(ConfigFlags::CELSIUS));
        assert!(cfg.flags.contains(ConfigFlags::BUZZER));
        assert!(!cfg.flags.contains(ConfigFlags::SAFE_IRON_MODE));
        assert_eq!(cfg.t12_tip.tip_type(), TipType::T12);
    }

    #[test]
    fn test_boost_packing() {
        let mut cfg = ConfigRecord::default();
        cfg.set_boost(30, 40);
        assert_eq!(cfg.boost_temp(), 30);
        assert_eq!(cfg.boost_duration(), 40);

        // Bounds
        cfg.set_boost(200, 1000);
        assert_eq!(cfg.boost_temp(), BOOST_TEMP_MAX_C);
        assert_eq!(cfg.boost_duration(), BOOST_DURATION_MAX_S);

        cfg.set_boost(0, 0);
        assert_eq!(cfg.boost_temp(), 0);
        assert_eq!(cfg.boost_duration(), BOOST_DURATION_MIN_S);
    }

    #[test]
    fn test_boost_rounds_to_increment() {
        let mut cfg = ConfigRecord::default();
        // 23 degrees rounds to the nearest 5-degree unit above
        cfg.set_boost(23, 60);
        assert_eq!(cfg.boost_temp(), 25);
        assert_eq!(cfg.boost_duration(), 60);
    }

    #[test]
    fn test_flag_operations() {
        let mut flags = ConfigFlags(0);
        flags.set(ConfigFlags::REED, true);
        assert!(flags.contains(ConfigFlags::REED));
        flags.set(ConfigFlags::REED, false);
        assert!(!flags.contains(ConfigFlags::REED));
    }
}
