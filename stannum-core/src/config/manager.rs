//! The configuration facade
//!
//! Composes the active/spare store, the tip catalog and the thermal model,
//! and owns every conversion between internal raw readings and the
//! temperatures a person sees. Persistence itself stays outside; this layer
//! only decides what the records mean.

use super::store::ConfigStore;
use crate::device::Device;
use crate::tip::radix::MAX_TEXT_LEN;
use crate::tip::{RadixName, TempModel, TipCatalog, TipCurve};
use crate::util::{celsius_to_fahrenheit, fahrenheit_to_celsius};

/// Aggregated configuration state of the station
#[derive(Default)]
pub struct StationConfig {
    pub store: ConfigStore,
    pub catalog: TipCatalog,
    pub model: TempModel,
}

impl StationConfig {
    /// Internal raw reading to display units (Celsius or Fahrenheit)
    pub fn temp_to_human(&self, raw: u16, ambient: i16, device: Device) -> u16 {
        let celsius = self.model.raw_to_celsius(raw, ambient, device);
        if self.store.is_celsius() {
            celsius
        } else {
            celsius_to_fahrenheit(celsius as i16) as u16
        }
    }

    /// Display units to the internal raw reading the regulator holds
    pub fn human_to_temp(&self, temp: u16, ambient: i16, device: Device) -> u16 {
        self.human_to_temp_limited(temp, ambient, device, false)
    }

    /// Like [`Self::human_to_temp`] but with the standby floor (100 °C)
    /// instead of the device working minimum
    pub fn human_to_temp_low(&self, temp: u16, ambient: i16, device: Device) -> u16 {
        self.human_to_temp_limited(temp, ambient, device, true)
    }

    fn human_to_temp_limited(
        &self,
        temp: u16,
        ambient: i16,
        device: Device,
        allow_below_min: bool,
    ) -> u16 {
        let celsius = if self.store.is_celsius() {
            temp
        } else {
            fahrenheit_to_celsius(temp as i16).max(0) as u16
        };
        self.model.celsius_to_raw(
            celsius,
            ambient,
            device,
            allow_below_min,
            self.store.is_safe_iron_mode(),
        )
    }

    /// The tip currently selected for a device
    ///
    /// The gun always reports the virtual tip at catalog index 0, with the
    /// catalog's activation/calibration flags.
    pub fn current_tip(&self, device: Device) -> RadixName {
        match self.store.record().current_tip(device) {
            Some(name) => self
                .catalog
                .index_of(name)
                .map(|i| self.catalog.name(i))
                .unwrap_or(name),
            None => self.catalog.name(0),
        }
    }

    /// Catalog index of the current tip, 0 when it is not listed
    pub fn current_tip_index(&self, device: Device) -> usize {
        self.catalog
            .index_of(self.current_tip(device))
            .unwrap_or(0)
    }

    /// Full text name of the current tip
    pub fn tip_name(&self, device: Device) -> heapless::String<MAX_TEXT_LEN> {
        self.current_tip(device).to_text()
    }

    pub fn is_tip_calibrated(&self, device: Device) -> bool {
        self.current_tip(device).is_calibrated()
    }

    /// Install a persisted curve for a tip, defaulting when absent/invalid
    ///
    /// `curve` is the record loaded for the tip's persist slot, or `None`
    /// when the tip has no slot. Returns whether a valid persisted curve
    /// was applied.
    pub fn install_tip_curve(&mut self, name: RadixName, curve: Option<TipCurve>) -> bool {
        let device = name.device();
        match curve {
            Some(curve) if name.is_calibrated() => self.model.load(curve, device),
            _ => {
                self.model.reset_default(device);
                false
            }
        }
    }

    /// Make `name` the current tip of its channel
    ///
    /// The caller follows up with [`Self::install_tip_curve`] using the
    /// record found for the tip, then persists the configuration.
    pub fn change_tip(&mut self, name: RadixName) {
        match name.device() {
            Device::T12 => self.store.record_mut().t12_tip = name,
            Device::Jbc => self.store.record_mut().jbc_tip = name,
            Device::Gun => {}
        }
    }

    /// Standby temperature for a device, kept below the working preset
    pub fn standby_temp(&self, device: Device) -> u16 {
        let low = self.store.record().low_temp(device);
        let preset = self.store.preset(device);
        if low >= preset {
            preset.saturating_sub(10)
        } else {
            low
        }
    }

    /// Resolve both iron channels to usable tips after a catalog rebuild
    pub fn resolve_current_tips(&mut self) {
        for device in [Device::T12, Device::Jbc] {
            if let Some(current) = self.store.record().current_tip(device) {
                let resolved = self.catalog.nearest_active(current);
                self.change_tip(resolved);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tip::calibration::CALIB_DEFAULT;
    use crate::tip::TipCatalog;

    fn config() -> StationConfig {
        let mut config = StationConfig::default();
        config.store.set_defaults();
        config.catalog = TipCatalog::from_lines(["T12-K", "T12-BC2", "JBC-I"].into_iter());
        config
    }

    #[test]
    fn test_human_round_trip_celsius() {
        let config = config();
        let raw = config.human_to_temp(300, 25, Device::T12);
        let human = config.temp_to_human(raw, 25, Device::T12);
        assert!((human as i32 - 300).abs() <= 1);
    }

    #[test]
    fn test_human_round_trip_fahrenheit() {
        let mut config = config();
        config
            .store
            .setup(true, false, true, true, true, false, false, 100);
        let raw = config.human_to_temp(572, 25, Device::T12); // 300 C
        let human = config.temp_to_human(raw, 25, Device::T12);
        assert!((human as i32 - 572).abs() <= 2);
    }

    #[test]
    fn test_gun_reports_virtual_tip() {
        let config = config();
        let tip = config.current_tip(Device::Gun);
        assert_eq!(tip.to_text().as_str(), "HOT-GUN");
        assert_eq!(config.current_tip_index(Device::Gun), 0);
    }

    #[test]
    fn test_change_tip_updates_record() {
        let mut config = config();
        let name = RadixName::from_text("T12-BC2").unwrap();
        config.change_tip(name);
        assert!(config.current_tip(Device::T12).matches(name));
        assert!(config.store.is_dirty());
    }

    #[test]
    fn test_install_curve_requires_calibrated_flag() {
        let mut config = config();
        let mut name = RadixName::from_text("T12-K").unwrap();
        let curve = TipCurve {
            points: [1000, 1700, 2400, 3100],
            ambient: 22,
        };
        // Uncalibrated name: curve ignored, defaults applied
        assert!(!config.install_tip_curve(name, Some(curve)));
        assert_eq!(config.model.point(0, Device::T12), CALIB_DEFAULT[0]);

        name.set_calibrated();
        assert!(config.install_tip_curve(name, Some(curve)));
        assert_eq!(config.model.point(0, Device::T12), 1000);
    }

    #[test]
    fn test_standby_temp_stays_below_preset() {
        let mut config = config();
        config.store.record_mut().t12_low_temp = 180;
        assert_eq!(config.standby_temp(Device::T12), 180);

        config.store.record_mut().t12_low_temp = 300;
        // Preset is 235; standby must stay below it
        assert_eq!(config.standby_temp(Device::T12), 225);
    }

    #[test]
    fn test_resolve_current_tips_picks_active() {
        let mut config = config();
        let mut active = RadixName::from_text("T12-BC2").unwrap();
        active.set_activated();
        config.catalog.apply_calibration(active, 3);

        // Configured tip is the default T12-NONE, which is not listed
        config.resolve_current_tips();
        assert!(config.current_tip(Device::T12).matches(active));
    }
}
