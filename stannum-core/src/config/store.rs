//! Active/spare configuration pair
//!
//! The active record is mutated freely from menus and phase transitions;
//! the spare copy tracks what persistence last saw. A write is issued only
//! when the two differ, so switch-off paths can call save unconditionally.

use super::pid::{PidParams, PidTable};
use super::types::{ConfigFlags, ConfigRecord, MAX_OFF_TIMEOUT_MIN};
use crate::device::Device;
use crate::util::{celsius_to_fahrenheit, fahrenheit_to_celsius};

/// The station configuration state
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    active: ConfigRecord,
    spare: ConfigRecord,
    pid: PidTable,
}

impl ConfigStore {
    /// Adopt a loaded record, clamping every field into its legal range
    pub fn load(&mut self, mut record: ConfigRecord) {
        Self::sanitize(&mut record);
        self.active = record;
        self.sync();
    }

    /// Reset to defaults (also used when persistence is unusable)
    pub fn set_defaults(&mut self) {
        self.active = ConfigRecord::default();
        self.sync();
    }

    pub fn load_pid(&mut self, table: PidTable) {
        self.pid = table;
    }

    pub fn record(&self) -> &ConfigRecord {
        &self.active
    }

    pub fn record_mut(&mut self) -> &mut ConfigRecord {
        &mut self.active
    }

    /// True when the active record differs from what was last persisted
    pub fn is_dirty(&self) -> bool {
        self.active != self.spare
    }

    /// Mark the active record as persisted
    pub fn sync(&mut self) {
        self.spare = self.active.clone();
    }

    /// Throw away unsaved changes
    pub fn restore(&mut self) {
        self.active = self.spare.clone();
    }

    pub fn pid(&self) -> &PidTable {
        &self.pid
    }

    pub fn pid_params(&self, device: Device) -> PidParams {
        self.pid.params(device)
    }

    pub fn set_pid_params(&mut self, device: Device, params: PidParams) {
        self.pid.set_params(device, params);
    }

    pub fn is_celsius(&self) -> bool {
        self.active.flags.contains(ConfigFlags::CELSIUS)
    }

    pub fn is_buzzer_enabled(&self) -> bool {
        self.active.flags.contains(ConfigFlags::BUZZER)
    }

    pub fn is_reed_type(&self) -> bool {
        self.active.flags.contains(ConfigFlags::REED)
    }

    pub fn is_auto_start(&self) -> bool {
        self.active.flags.contains(ConfigFlags::AUTO_START)
    }

    pub fn is_big_step(&self) -> bool {
        self.active.flags.contains(ConfigFlags::BIG_STEP)
    }

    pub fn is_fast_cooling(&self) -> bool {
        self.active.flags.contains(ConfigFlags::FAST_COOLING)
    }

    pub fn is_safe_iron_mode(&self) -> bool {
        self.active.flags.contains(ConfigFlags::SAFE_IRON_MODE)
    }

    pub fn is_upper_enc_clockwise(&self) -> bool {
        self.active.flags.contains(ConfigFlags::UPPER_ENC_CLOCKWISE)
    }

    pub fn is_lower_enc_clockwise(&self) -> bool {
        self.active.flags.contains(ConfigFlags::LOWER_ENC_CLOCKWISE)
    }

    /// Preset temperature in display units
    pub fn preset(&self, device: Device) -> u16 {
        self.active.preset(device)
    }

    /// Store a new preset, clamped to the device limits
    pub fn set_preset(&mut self, device: Device, temp: u16) {
        let temp = temp.clamp(self.temp_min(device), self.temp_max(device));
        self.active.set_preset(device, temp);
    }

    pub fn gun_fan_preset(&self) -> u16 {
        self.active.gun_fan_speed
    }

    pub fn save_gun_preset(&mut self, temp: u16, fan: u16) {
        let temp = temp.clamp(self.temp_min(Device::Gun), self.temp_max(Device::Gun));
        self.active.gun_temp = temp;
        self.active.gun_fan_speed = fan;
    }

    /// Lowest settable temperature, display units
    ///
    /// Fahrenheit values are rounded down to a multiple of ten, the way the
    /// encoder presents them.
    pub fn temp_min(&self, device: Device) -> u16 {
        let t = device.temp_min_c();
        if self.is_celsius() {
            t
        } else {
            let f = celsius_to_fahrenheit(t as i16) as u16;
            f - f % 10
        }
    }

    /// Highest settable temperature, display units, honouring safe mode
    pub fn temp_max(&self, device: Device) -> u16 {
        let t = device.temp_max_c(self.is_safe_iron_mode());
        if self.is_celsius() {
            t
        } else {
            let f = celsius_to_fahrenheit(t as i16) as u16;
            f + 10 - f % 10
        }
    }

    /// Main setup page: units, buzzer, steps, encoders, display, safe mode
    #[allow(clippy::too_many_arguments)]
    pub fn setup(
        &mut self,
        buzzer: bool,
        celsius: bool,
        big_step: bool,
        upper_clockwise: bool,
        lower_clockwise: bool,
        ips_display: bool,
        safe_iron_mode: bool,
        brightness: u8,
    ) {
        if self.is_celsius() != celsius {
            // Convert the presets so the user sees the same temperature
            let convert = if celsius {
                fahrenheit_to_celsius
            } else {
                celsius_to_fahrenheit
            };
            self.active.t12_temp = convert(self.active.t12_temp as i16) as u16;
            self.active.jbc_temp = convert(self.active.jbc_temp as i16) as u16;
            self.active.gun_temp = convert(self.active.gun_temp as i16) as u16;
        }
        let preserved = self.active.flags.0 & (ConfigFlags::REED | ConfigFlags::AUTO_START);
        let mut flags = ConfigFlags(preserved);
        flags.set(ConfigFlags::CELSIUS, celsius);
        flags.set(ConfigFlags::BUZZER, buzzer);
        flags.set(ConfigFlags::BIG_STEP, big_step);
        flags.set(ConfigFlags::UPPER_ENC_CLOCKWISE, upper_clockwise);
        flags.set(ConfigFlags::LOWER_ENC_CLOCKWISE, lower_clockwise);
        flags.set(ConfigFlags::IPS_DISPLAY, ips_display);
        flags.set(ConfigFlags::SAFE_IRON_MODE, safe_iron_mode);
        self.active.flags = flags;
        self.active.dspl_bright = brightness.clamp(1, 100);
        if safe_iron_mode {
            let t_max = self.temp_max(Device::T12);
            self.active.t12_temp = self.active.t12_temp.min(t_max);
            self.active.jbc_temp = self.active.jbc_temp.min(t_max);
        }
    }

    /// T12 page: idle switch, auto start, timeouts, boost
    pub fn setup_t12(
        &mut self,
        reed: bool,
        auto_start: bool,
        off_timeout: u8,
        low_temp: u16,
        low_to: u8,
        boost_temp: u8,
        boost_duration: u16,
    ) {
        self.active.t12_off_timeout = off_timeout.min(MAX_OFF_TIMEOUT_MIN);
        self.active.t12_low_temp = low_temp;
        self.active.t12_low_to = low_to;
        self.active.flags.set(ConfigFlags::REED, reed);
        self.active.flags.set(ConfigFlags::AUTO_START, auto_start);
        self.active.set_boost(boost_temp, boost_duration);
    }

    /// JBC page: standby temperature and auto-off timeout
    pub fn setup_jbc(&mut self, off_timeout: u8, standby_temp: u16) {
        self.active.jbc_off_timeout = off_timeout.min(MAX_OFF_TIMEOUT_MIN);
        self.active.jbc_low_temp = standby_temp;
    }

    /// Gun page: fast cooling, standby timeout and temperature
    pub fn setup_gun(&mut self, fast_cooling: bool, standby_timeout: u8, standby_temp: u16) {
        self.active.flags.set(ConfigFlags::FAST_COOLING, fast_cooling);
        self.active.gun_off_timeout = standby_timeout.min(MAX_OFF_TIMEOUT_MIN);
        self.active.gun_low_temp = standby_temp;
    }

    fn sanitize(record: &mut ConfigRecord) {
        let celsius = record.flags.contains(ConfigFlags::CELSIUS);
        for device in [Device::T12, Device::Jbc, Device::Gun] {
            let mut t = record.preset(device) as i16;
            if !celsius {
                t = fahrenheit_to_celsius(t);
            }
            t = t.clamp(
                device.temp_min_c() as i16,
                device.temp_max_c(record.flags.contains(ConfigFlags::SAFE_IRON_MODE)) as i16,
            );
            if !celsius {
                t = celsius_to_fahrenheit(t);
            }
            record.set_preset(device, t as u16);
        }
        record.t12_off_timeout = record.t12_off_timeout.min(MAX_OFF_TIMEOUT_MIN);
        record.jbc_off_timeout = record.jbc_off_timeout.min(MAX_OFF_TIMEOUT_MIN);
        record.gun_off_timeout = record.gun_off_timeout.min(MAX_OFF_TIMEOUT_MIN);
        record.dspl_bright = record.dspl_bright.clamp(1, 100);
        record.dspl_rotation &= 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ConfigFlags;

    #[test]
    fn test_dirty_tracking() {
        let mut store = ConfigStore::default();
        store.set_defaults();
        assert!(!store.is_dirty());

        store.set_preset(Device::T12, 300);
        assert!(store.is_dirty());

        store.sync();
        assert!(!store.is_dirty());

        // Setting the same value again stays clean
        store.set_preset(Device::T12, 300);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_restore_discards_changes() {
        let mut store = ConfigStore::default();
        store.set_defaults();
        store.set_preset(Device::Gun, 350);
        store.restore();
        assert_eq!(store.preset(Device::Gun), 200);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_preset_is_clamped() {
        let mut store = ConfigStore::default();
        store.set_defaults();
        store.set_preset(Device::T12, 900);
        assert_eq!(store.preset(Device::T12), 450);
        store.set_preset(Device::T12, 10);
        assert_eq!(store.preset(Device::T12), 200);
    }

    #[test]
    fn test_sanitize_on_load() {
        let mut record = ConfigRecord::default();
        record.t12_temp = 9999;
        record.t12_off_timeout = 240;
        record.dspl_bright = 0;
        record.dspl_rotation = 7;

        let mut store = ConfigStore::default();
        store.load(record);
        assert_eq!(store.preset(Device::T12), 450);
        assert_eq!(store.record().t12_off_timeout, 30);
        assert_eq!(store.record().dspl_bright, 1);
        assert_eq!(store.record().dspl_rotation, 3);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_unit_switch_converts_presets() {
        let mut store = ConfigStore::default();
        store.set_defaults();
        store.setup(true, false, true, true, true, false, false, 100);
        assert!(!store.is_celsius());
        assert_eq!(store.preset(Device::T12), 455); // 235 C in Fahrenheit

        store.setup(true, true, true, true, true, false, false, 100);
        assert_eq!(store.preset(Device::T12), 235);
    }

    #[test]
    fn test_fahrenheit_limits_round_to_ten() {
        let mut store = ConfigStore::default();
        store.set_defaults();
        store.setup(true, false, true, true, true, false, false, 100);
        assert_eq!(store.temp_min(Device::T12) % 10, 0);
        assert_eq!(store.temp_max(Device::T12) % 10, 0);
        assert!(store.temp_max(Device::T12) > store.temp_min(Device::T12));
    }

    #[test]
    fn test_safe_mode_pulls_presets_down() {
        let mut store = ConfigStore::default();
        store.set_defaults();
        store.set_preset(Device::T12, 440);
        store.setup(true, true, true, true, true, false, true, 100);
        assert!(store.is_safe_iron_mode());
        assert_eq!(store.preset(Device::T12), 400);
    }

    #[test]
    fn test_setup_preserves_switch_bits() {
        let mut store = ConfigStore::default();
        store.set_defaults();
        store.setup_t12(true, true, 10, 170, 4, 25, 60);
        assert!(store.is_reed_type());
        assert!(store.is_auto_start());

        store.setup(false, true, false, false, false, true, false, 50);
        assert!(store.is_reed_type());
        assert!(store.is_auto_start());
        assert!(!store.is_buzzer_enabled());
        assert!(store.record().flags.contains(ConfigFlags::IPS_DISPLAY));
    }
}
