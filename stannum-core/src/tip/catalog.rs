//! The in-memory tip catalog
//!
//! Built once at boot from the tip-list text. Entry 0 is reserved for the
//! virtual hot-gun tip so that the gun calibration rides the same persisted
//! table as the iron tips. Each entry maps the tip name to the index of its
//! record in the persisted calibration table, or [`NO_SLOT`] when the tip
//! has never been calibrated.

use super::radix::{RadixName, TipType};
use crate::device::Device;

/// Sentinel slot for "no persisted calibration"
pub const NO_SLOT: u8 = 255;

/// Catalog capacity; the shipped tip list is well under this
pub const MAX_TIPS: usize = 200;

/// Body of the virtual hot-gun catalog entry
const HOTGUN_TIP_BODY: &str = "GUN";

/// One catalog entry
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TipEntry {
    /// Tip name with the activation/calibration flags
    pub name: RadixName,
    /// Record index in the persisted calibration table, or [`NO_SLOT`]
    pub slot: u8,
}

/// All known tips, in tip-list order
pub struct TipCatalog {
    entries: heapless::Vec<TipEntry, MAX_TIPS>,
}

impl Default for TipCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TipCatalog {
    /// Create a catalog holding only the virtual hot-gun tip
    pub fn new() -> Self {
        let mut entries = heapless::Vec::new();
        // Construction from a literal cannot fail
        let gun = RadixName::new(TipType::HotGun, HOTGUN_TIP_BODY).unwrap_or_default();
        let _ = entries.push(TipEntry {
            name: gun,
            slot: NO_SLOT,
        });
        Self { entries }
    }

    /// Build from the tip-list text, one full name per line
    ///
    /// Lines that fail to parse and duplicate names are skipped; a parse
    /// failure never aborts the build.
    pub fn from_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Self {
        let mut catalog = Self::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Ok(name) = RadixName::from_text(line) {
                catalog.add(name);
            }
        }
        catalog
    }

    fn add(&mut self, name: RadixName) -> bool {
        if name.is_empty() || self.index_of(name).is_some() {
            return false;
        }
        self.entries
            .push(TipEntry {
                name,
                slot: NO_SLOT,
            })
            .is_ok()
    }

    /// Total number of entries, including the hot-gun entry
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// True when the tip list contributed nothing beyond the hot-gun entry
    pub fn is_bare(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Name at `index`, or the empty name when out of range
    pub fn name(&self, index: usize) -> RadixName {
        self.entries
            .get(index)
            .map(|e| e.name)
            .unwrap_or_default()
    }

    /// Persist slot of the entry at `index`
    pub fn slot(&self, index: usize) -> u8 {
        self.entries.get(index).map(|e| e.slot).unwrap_or(NO_SLOT)
    }

    /// Linear scan for a name, ignoring flag bits
    pub fn index_of(&self, name: RadixName) -> Option<usize> {
        self.entries.iter().position(|e| e.name.matches(name))
    }

    /// Record a persisted calibration for `name`
    ///
    /// Stores the slot and copies the activation/calibration flags carried
    /// by the persisted name. Returns false when the tip is unknown.
    pub fn apply_calibration(&mut self, name: RadixName, slot: u8) -> bool {
        let Some(index) = self.index_of(name) else {
            return false;
        };
        let entry = &mut self.entries[index];
        entry.slot = slot;
        entry.name.set_flag_mask(name.flag_mask());
        true
    }

    /// Drop every persist slot and flag; used when the calibration table
    /// is erased
    pub fn clear_all(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.slot = NO_SLOT;
            entry.name.set_flag_mask(0);
        }
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &TipEntry> {
        self.entries.iter()
    }

    /// Fill `out` with a window of entries around `current` for a menu
    ///
    /// Seeks a few eligible entries backwards so the current tip sits near
    /// the top of the window, then fills forward. Entry 0 (the hot gun) is
    /// never listed. `active_only` keeps deactivated tips out; `device`
    /// restricts to one heater channel; without a device filter, extra
    /// (untyped) tips are hidden because they can only be picked manually.
    pub fn window(
        &self,
        current: usize,
        out: &mut [TipEntry],
        active_only: bool,
        device: Option<Device>,
    ) -> usize {
        let eligible = |e: &TipEntry| -> bool {
            if active_only && !e.name.is_activated() {
                return false;
            }
            match device {
                Some(dev) => e.name.device() == dev,
                None => true,
            }
        };

        // Seek up to three eligible entries backwards
        let mut start = current.min(self.entries.len());
        let mut back = 3;
        while start > 1 {
            if eligible(&self.entries[start - 1]) {
                back -= 1;
                if back == 0 {
                    break;
                }
            }
            start -= 1;
        }

        let mut loaded = 0;
        for (index, entry) in self.entries.iter().enumerate().skip(start.max(1)) {
            if loaded >= out.len() {
                break;
            }
            if index == 0 || !eligible(entry) {
                continue;
            }
            if device.is_none() && entry.name.is_extra() {
                continue;
            }
            out[loaded] = *entry;
            loaded += 1;
        }
        for slot in out.iter_mut().skip(loaded) {
            slot.name = RadixName::empty();
            slot.slot = NO_SLOT;
        }
        loaded
    }

    /// Resolve `current` to a usable tip of the same type
    ///
    /// If the tip exists and is activated it is returned as-is. Otherwise
    /// the nearest activated entry (by catalog distance) wins; failing
    /// that, any entry of the type; failing that, the name itself.
    pub fn nearest_active(&self, current: RadixName) -> RadixName {
        let Some(index) = self.index_of(current) else {
            // Unknown name: the first activated tip of the same type wins;
            // with none activated, the last entry of the type stands in
            let tip_type = current.tip_type();
            let mut fallback = RadixName::empty();
            for entry in self.entries.iter() {
                if entry.name.tip_type() == tip_type {
                    if entry.name.is_activated() {
                        return entry.name;
                    }
                    fallback = entry.name;
                }
            }
            return if fallback.is_empty() { current } else { fallback };
        };
        if index == 0 {
            // The hot gun is the only tip of its type
            return self.entries[0].name;
        }
        let found = &self.entries[index];
        if found.name.is_activated() {
            return found.name;
        }

        let below = self.entries[1..index]
            .iter()
            .rposition(|e| e.name.is_activated())
            .map(|p| p + 1);
        let above = self.entries[index + 1..]
            .iter()
            .position(|e| e.name.is_activated())
            .map(|p| p + index + 1);
        match (below, above) {
            (None, None) => found.name,
            (Some(b), None) => self.entries[b].name,
            (None, Some(a)) => self.entries[a].name,
            (Some(b), Some(a)) => {
                if index - b < a - index {
                    self.entries[b].name
                } else {
                    self.entries[a].name
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TipCatalog {
        TipCatalog::from_lines(
            [
                "T12-B",
                "T12-BC2",
                "T12-D24",
                "T12-K",
                "JBC-C210",
                "JBC-I",
                "C245-903",
            ]
            .into_iter(),
        )
    }

    #[test]
    fn test_build_reserves_gun_entry() {
        let c = catalog();
        assert_eq!(c.total(), 8);
        assert_eq!(c.name(0).tip_type(), TipType::HotGun);
        assert_eq!(c.slot(0), NO_SLOT);
    }

    #[test]
    fn test_build_skips_bad_lines_and_duplicates() {
        let c = TipCatalog::from_lines(["T12-B", "", "GARBAGE-X", "T12-B", "t12-b", "T12-K"].into_iter());
        // gun + B + K; the bad line, the blank line and both duplicates skipped
        assert_eq!(c.total(), 3);
    }

    #[test]
    fn test_lookup_ignores_flags() {
        let c = catalog();
        let mut name = RadixName::from_text("T12-K").unwrap();
        name.set_activated();
        assert_eq!(c.index_of(name), Some(4));
    }

    #[test]
    fn test_apply_and_clear_calibration() {
        let mut c = catalog();
        let mut name = RadixName::from_text("T12-BC2").unwrap();
        name.set_activated();
        name.set_calibrated();
        assert!(c.apply_calibration(name, 7));

        let index = c.index_of(name).unwrap();
        assert_eq!(c.slot(index), 7);
        assert!(c.name(index).is_calibrated());

        c.clear_all();
        assert_eq!(c.slot(index), NO_SLOT);
        assert!(!c.name(index).is_calibrated());
    }

    #[test]
    fn test_unknown_tip_not_applied() {
        let mut c = catalog();
        let name = RadixName::from_text("T12-ZZZ").unwrap();
        assert!(!c.apply_calibration(name, 1));
    }

    #[test]
    fn test_nearest_active_prefers_self() {
        let mut c = catalog();
        let mut name = RadixName::from_text("T12-K").unwrap();
        name.set_activated();
        c.apply_calibration(name, 0);
        assert!(c.nearest_active(name).matches(name));
    }

    #[test]
    fn test_nearest_active_picks_neighbor() {
        let mut c = catalog();
        let mut active = RadixName::from_text("T12-BC2").unwrap();
        active.set_activated();
        c.apply_calibration(active, 0);

        let wanted = RadixName::from_text("T12-K").unwrap();
        assert!(c.nearest_active(wanted).matches(active));
    }

    #[test]
    fn test_nearest_active_for_unknown_name() {
        let mut c = catalog();
        let mut active = RadixName::from_text("JBC-I").unwrap();
        active.set_activated();
        c.apply_calibration(active, 0);

        let unknown = RadixName::from_text("JBC-ZZ").unwrap();
        assert!(c.nearest_active(unknown).matches(active));
    }

    #[test]
    fn test_nearest_active_unknown_name_without_activated_tips() {
        // Nothing activated: the last catalog entry of the type stands in
        let c = catalog();
        let unknown = RadixName::from_text("T12-ZZZ").unwrap();
        let last_t12 = RadixName::from_text("T12-K").unwrap();
        assert!(c.nearest_active(unknown).matches(last_t12));

        // Type tags are matched exactly: C245 entries do not stand in for
        // a JBC-tagged name
        let unknown = RadixName::from_text("JBC-ZZ").unwrap();
        let last_jbc = RadixName::from_text("JBC-I").unwrap();
        assert!(c.nearest_active(unknown).matches(last_jbc));
    }

    #[test]
    fn test_window_filters() {
        let mut c = catalog();
        for text in ["T12-B", "T12-K", "JBC-I"] {
            let mut name = RadixName::from_text(text).unwrap();
            name.set_activated();
            c.apply_calibration(name, NO_SLOT);
        }
        let empty = TipEntry {
            name: RadixName::empty(),
            slot: NO_SLOT,
        };
        let mut out = [empty; 5];

        let n = c.window(1, &mut out, true, Some(Device::T12));
        assert_eq!(n, 2);
        assert_eq!(out[0].name.to_text().as_str(), "T12-B");
        assert_eq!(out[1].name.to_text().as_str(), "T12-K");

        let n = c.window(1, &mut out, true, Some(Device::Jbc));
        assert_eq!(n, 1);
        assert_eq!(out[0].name.to_text().as_str(), "JBC-I");

        // Without the active filter every iron tip shows up
        let n = c.window(1, &mut out, false, Some(Device::T12));
        assert_eq!(n, 4);
    }
}
