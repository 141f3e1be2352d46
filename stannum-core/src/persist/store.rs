//! Load/save policy over a [`FlashStore`]
//!
//! Blob records are verified on load; on a checksum failure the rotated
//! backup is tried, and when both fail the caller falls back to defaults
//! and writes the valid default back. Saving first rotates the current
//! record into the backup key, then writes the new one.

use super::records::{
    decode_blob, encode_blob, TipRecord, CONFIG_MAGIC, MAX_TIP_RECORDS, PID_MAGIC,
    TIP_RECORD_SIZE,
};
use super::{FlashStore, StorageKey, StoreError};
use crate::config::{ConfigRecord, ConfigStore, PidTable, StationConfig};
use crate::device::Device;
use crate::tip::{RadixName, TipCatalog};

/// Scratch size for blob records
const BLOB_BUF: usize = 512;
/// Scratch size for the tip-list text
pub const TIP_LIST_BUF: usize = 4096;

/// Outcome of the boot-time load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootStatus {
    /// Everything loaded
    Ok,
    /// Tip list present but no tip activated yet; run tip activation
    NoTip,
    /// No tip list on the flash; the station cannot pick tips
    NoTipList,
    /// The storage backend failed; defaults are active, nothing rewritten
    ReadError,
}

/// The persistence layer of the station
pub struct PersistStore<S: FlashStore> {
    flash: S,
}

impl<S: FlashStore> PersistStore<S> {
    pub fn new(flash: S) -> Self {
        Self { flash }
    }

    pub fn into_inner(self) -> S {
        self.flash
    }

    /// Load the configuration, falling back to the rotated backup
    pub async fn load_config(&mut self) -> Result<ConfigRecord, StoreError> {
        self.load_blob(CONFIG_MAGIC, StorageKey::Config, Some(StorageKey::ConfigBackup))
            .await
    }

    /// Persist the configuration when it differs from the spare copy
    ///
    /// Returns whether a write actually happened. The previous record is
    /// rotated into the backup key first.
    pub async fn save_config(&mut self, config: &mut ConfigStore) -> Result<bool, StoreError> {
        if !config.is_dirty() {
            return Ok(false);
        }
        self.rotate(StorageKey::Config, StorageKey::ConfigBackup).await;
        self.save_blob(CONFIG_MAGIC, StorageKey::Config, config.record())
            .await?;
        config.sync();
        Ok(true)
    }

    pub async fn load_pid(&mut self) -> Result<PidTable, StoreError> {
        self.load_blob(PID_MAGIC, StorageKey::Pid, None).await
    }

    pub async fn save_pid(&mut self, table: &PidTable) -> Result<(), StoreError> {
        self.save_blob(PID_MAGIC, StorageKey::Pid, table).await
    }

    /// Load the packed tip table
    ///
    /// Slot indices are positions in the returned vector; a record that
    /// fails its checksum is re-read from the rotated backup table before
    /// its slot comes back as `None`, so the indices of the records behind
    /// it stay valid either way. A missing or unreadable primary table
    /// falls back to the backup wholesale.
    pub async fn load_tip_records(
        &mut self,
    ) -> Result<heapless::Vec<Option<TipRecord>, MAX_TIP_RECORDS>, StoreError> {
        let mut primary = [0u8; MAX_TIP_RECORDS * TIP_RECORD_SIZE];
        let mut backup = [0u8; MAX_TIP_RECORDS * TIP_RECORD_SIZE];
        let backup_len = self
            .flash
            .read(StorageKey::TipTableBackup, &mut backup)
            .await
            .unwrap_or(0);
        let primary_len = match self.flash.read(StorageKey::TipTable, &mut primary).await {
            Ok(len) => len,
            Err(e) => {
                if backup_len == 0 {
                    return match e {
                        StoreError::NotFound => Ok(heapless::Vec::new()),
                        other => Err(other),
                    };
                }
                primary[..backup_len].copy_from_slice(&backup[..backup_len]);
                backup_len
            }
        };

        let mut records = heapless::Vec::new();
        for (slot, chunk) in primary[..primary_len]
            .chunks_exact(TIP_RECORD_SIZE)
            .enumerate()
        {
            let record = TipRecord::decode(chunk).ok().or_else(|| {
                backup[..backup_len]
                    .chunks_exact(TIP_RECORD_SIZE)
                    .nth(slot)
                    .and_then(|chunk| TipRecord::decode(chunk).ok())
            });
            let _ = records.push(record);
        }
        Ok(records)
    }

    /// Load one tip record by its persist slot
    pub async fn load_tip_record(&mut self, slot: u8) -> Result<TipRecord, StoreError> {
        let records = self.load_tip_records().await?;
        records
            .get(slot as usize)
            .copied()
            .flatten()
            .ok_or(StoreError::NotFound)
    }

    /// Write a tip record, reusing the slot of a record with the same name
    ///
    /// Returns the slot the record landed in. The previous table is rotated
    /// into the backup key.
    pub async fn save_tip_record(&mut self, record: &TipRecord) -> Result<u8, StoreError> {
        let mut buf = [0u8; MAX_TIP_RECORDS * TIP_RECORD_SIZE];
        let len = match self.flash.read(StorageKey::TipTable, &mut buf).await {
            Ok(len) => len - len % TIP_RECORD_SIZE,
            Err(StoreError::NotFound) => 0,
            Err(e) => return Err(e),
        };

        let mut slot = None;
        for (index, chunk) in buf[..len].chunks_exact(TIP_RECORD_SIZE).enumerate() {
            if let Ok(existing) = TipRecord::decode(chunk) {
                if existing.name.matches(record.name) {
                    slot = Some(index);
                    break;
                }
            }
        }
        let slot = match slot {
            Some(slot) => slot,
            None => {
                let next = len / TIP_RECORD_SIZE;
                if next >= MAX_TIP_RECORDS {
                    return Err(StoreError::BufferTooSmall);
                }
                next
            }
        };

        buf[slot * TIP_RECORD_SIZE..(slot + 1) * TIP_RECORD_SIZE]
            .copy_from_slice(&record.encode());
        let new_len = len.max((slot + 1) * TIP_RECORD_SIZE);
        if len > 0 {
            self.rotate(StorageKey::TipTable, StorageKey::TipTableBackup)
                .await;
        }
        self.flash.write(StorageKey::TipTable, &buf[..new_len]).await?;
        Ok(slot as u8)
    }

    /// Drop every persisted calibration
    pub async fn clear_tip_records(&mut self) -> Result<(), StoreError> {
        self.rotate(StorageKey::TipTable, StorageKey::TipTableBackup)
            .await;
        self.flash.write(StorageKey::TipTable, &[]).await
    }

    /// Read the tip-list text into `buf`, returning the text
    pub async fn load_tip_list<'a>(
        &mut self,
        buf: &'a mut [u8],
    ) -> Result<&'a str, StoreError> {
        let len = self.flash.read(StorageKey::TipList, buf).await?;
        core::str::from_utf8(&buf[..len]).map_err(|_| StoreError::Corrupt)
    }

    /// Boot-time load of the whole station state
    ///
    /// Fills the catalog from the tip list, applies persisted calibration
    /// slots, loads configuration and PID sets (writing defaults back when
    /// a record is unusable) and installs the thermal curves of the current
    /// tips. A backend failure leaves defaults active and rewrites nothing.
    pub async fn boot(&mut self, station: &mut StationConfig) -> BootStatus {
        let mut scratch = [0u8; TIP_LIST_BUF];
        let tip_list = match self.load_tip_list(&mut scratch).await {
            Ok(text) => Some(text),
            Err(StoreError::NotFound) | Err(StoreError::Corrupt) => None,
            Err(_) => {
                station.store.set_defaults();
                station.store.load_pid(PidTable::default());
                return BootStatus::ReadError;
            }
        };
        station.catalog = match tip_list {
            Some(text) => TipCatalog::from_lines(text.lines()),
            None => TipCatalog::new(),
        };

        // Attach persisted calibration slots to catalog entries
        let mut slots_applied = 0usize;
        match self.load_tip_records().await {
            Ok(records) => {
                for (slot, record) in records.iter().enumerate() {
                    if let Some(record) = record {
                        if record.curve().is_valid() {
                            if station.catalog.apply_calibration(record.name, slot as u8) {
                                slots_applied += 1;
                            }
                        } else {
                            // Keep the slot but drop the calibrated mark
                            let mut name = record.name;
                            name.clear_calibrated();
                            station.catalog.apply_calibration(name, slot as u8);
                        }
                    }
                }
            }
            Err(StoreError::NotFound) => {}
            Err(_) => {
                station.store.set_defaults();
                station.store.load_pid(PidTable::default());
                return BootStatus::ReadError;
            }
        }

        let config_ok = match self.load_config().await {
            Ok(record) => {
                station.store.load(record);
                station.resolve_current_tips();
                true
            }
            Err(StoreError::Storage) | Err(StoreError::BufferTooSmall)
            | Err(StoreError::Serialize) => {
                station.store.set_defaults();
                station.store.load_pid(PidTable::default());
                return BootStatus::ReadError;
            }
            Err(_) => {
                station.store.set_defaults();
                station.resolve_current_tips();
                false
            }
        };

        match self.load_pid().await {
            Ok(table) => station.store.load_pid(table),
            Err(_) => station.store.load_pid(PidTable::default()),
        }

        self.install_current_curves(station).await;
        station.store.sync();

        if !config_ok {
            // Write the valid default back so the next boot is clean
            let _ = self
                .save_blob(CONFIG_MAGIC, StorageKey::Config, station.store.record())
                .await;
        }

        if station.catalog.is_bare() {
            BootStatus::NoTipList
        } else if slots_applied == 0 && !station.catalog.iter().any(|e| e.name.is_activated()) {
            BootStatus::NoTip
        } else {
            BootStatus::Ok
        }
    }

    /// Load and install the curves of the gun and both current iron tips
    pub async fn install_current_curves(&mut self, station: &mut StationConfig) {
        for device in [Device::Gun, Device::T12, Device::Jbc] {
            let name = station.current_tip(device);
            let curve = match station.catalog.index_of(name) {
                Some(index) => {
                    let slot = station.catalog.slot(index);
                    if slot == crate::tip::NO_SLOT {
                        None
                    } else {
                        self.load_tip_record(slot).await.ok().map(|r| r.curve())
                    }
                }
                None => None,
            };
            station.install_tip_curve(name, curve);
        }
    }

    /// Toggle a tip's activation flag, persisting the change
    ///
    /// A tip without a stored record gets one with the default curve so
    /// the flag has somewhere to live. Returns the new activation state.
    pub async fn toggle_tip_activation(
        &mut self,
        catalog: &mut TipCatalog,
        index: usize,
    ) -> Result<bool, StoreError> {
        let name = catalog.name(index);
        if name.is_empty() {
            return Err(StoreError::NotFound);
        }
        let slot = catalog.slot(index);
        let mut record = if slot == crate::tip::NO_SLOT {
            TipRecord {
                points: crate::tip::calibration::CALIB_DEFAULT,
                name,
                ambient: crate::tip::calibration::DEFAULT_AMBIENT_C,
            }
        } else {
            self.load_tip_record(slot).await?
        };
        if record.name.is_activated() {
            record.name.clear_activated();
        } else {
            record.name.set_activated();
        }
        let slot = self.save_tip_record(&record).await?;
        catalog.apply_calibration(record.name, slot);
        Ok(record.name.is_activated())
    }

    /// Persist a freshly measured calibration for the current tip
    ///
    /// Marks the tip activated (and calibrated when `calibrated` is set),
    /// writes the record and attaches the slot to the catalog entry.
    pub async fn save_tip_calibration(
        &mut self,
        catalog: &mut TipCatalog,
        mut name: RadixName,
        points: [u16; 4],
        ambient: i8,
        calibrated: bool,
    ) -> Result<u8, StoreError> {
        name.set_activated();
        if calibrated {
            name.set_calibrated();
        } else {
            name.clear_calibrated();
        }
        let record = TipRecord {
            points,
            name,
            ambient,
        };
        let slot = self.save_tip_record(&record).await?;
        catalog.apply_calibration(name, slot);
        Ok(slot)
    }

    async fn load_blob<T: serde::de::DeserializeOwned>(
        &mut self,
        magic: u32,
        key: StorageKey,
        backup: Option<StorageKey>,
    ) -> Result<T, StoreError> {
        let mut buf = [0u8; BLOB_BUF];
        let primary = match self.flash.read(key, &mut buf).await {
            Ok(len) => decode_blob(magic, &buf[..len]),
            Err(e) => Err(e),
        };
        match primary {
            Ok(value) => Ok(value),
            Err(StoreError::Storage) => Err(StoreError::Storage),
            Err(first) => match backup {
                Some(backup_key) => {
                    let len = self.flash.read(backup_key, &mut buf).await?;
                    decode_blob(magic, &buf[..len]).map_err(|_| first)
                }
                None => Err(first),
            },
        }
    }

    async fn save_blob<T: serde::Serialize>(
        &mut self,
        magic: u32,
        key: StorageKey,
        value: &T,
    ) -> Result<(), StoreError> {
        let mut buf = [0u8; BLOB_BUF];
        let len = encode_blob(magic, value, &mut buf)?;
        self.flash.write(key, &buf[..len]).await
    }

    /// Copy the record under `from` to `to`; a missing source is fine
    async fn rotate(&mut self, from: StorageKey, to: StorageKey) {
        let mut buf = [0u8; MAX_TIP_RECORDS * TIP_RECORD_SIZE];
        if let Ok(len) = self.flash.read(from, &mut buf).await {
            let _ = self.flash.write(to, &buf[..len]).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    const KEYS: usize = 6;

    #[derive(Default)]
    struct MockFlash {
        slots: [Option<heapless::Vec<u8, 2048>>; KEYS],
        fail_reads: bool,
        writes: usize,
    }

    impl FlashStore for MockFlash {
        async fn read(&mut self, key: StorageKey, buf: &mut [u8]) -> Result<usize, StoreError> {
            if self.fail_reads {
                return Err(StoreError::Storage);
            }
            match &self.slots[key.id() as usize] {
                Some(data) => {
                    if buf.len() < data.len() {
                        return Err(StoreError::BufferTooSmall);
                    }
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(StoreError::NotFound),
            }
        }

        async fn write(&mut self, key: StorageKey, data: &[u8]) -> Result<(), StoreError> {
            self.writes += 1;
            let mut vec = heapless::Vec::new();
            vec.extend_from_slice(data).map_err(|_| StoreError::BufferTooSmall)?;
            self.slots[key.id() as usize] = Some(vec);
            Ok(())
        }

        async fn erase_all(&mut self) -> Result<(), StoreError> {
            self.slots = Default::default();
            Ok(())
        }
    }

    fn with_tip_list(list: &str) -> MockFlash {
        let mut flash = MockFlash::default();
        let mut vec = heapless::Vec::new();
        vec.extend_from_slice(list.as_bytes()).unwrap();
        flash.slots[StorageKey::TipList.id() as usize] = Some(vec);
        flash
    }

    #[test]
    fn test_config_round_trip_with_rotation() {
        block_on(async {
            let mut store = PersistStore::new(with_tip_list("T12-K\n"));
            let mut config = ConfigStore::default();
            config.set_defaults();
            config.set_preset(Device::T12, 300);

            assert!(store.save_config(&mut config).await.unwrap());
            config.set_preset(Device::T12, 320);
            assert!(store.save_config(&mut config).await.unwrap());

            // The previous record rotated into the backup
            let current = store.load_config().await.unwrap();
            assert_eq!(current.t12_temp, 320);
            let backup: ConfigRecord = store
                .load_blob(CONFIG_MAGIC, StorageKey::ConfigBackup, None)
                .await
                .unwrap();
            assert_eq!(backup.t12_temp, 300);
        });
    }

    #[test]
    fn test_save_config_skips_clean_record() {
        block_on(async {
            let mut store = PersistStore::new(MockFlash::default());
            let mut config = ConfigStore::default();
            config.set_defaults();
            config.set_preset(Device::Jbc, 300);
            assert!(store.save_config(&mut config).await.unwrap());
            let writes = store.flash.writes;

            // No mutation since the last save: zero writes
            assert!(!store.save_config(&mut config).await.unwrap());
            assert!(!store.save_config(&mut config).await.unwrap());
            assert_eq!(store.flash.writes, writes);
        });
    }

    #[test]
    fn test_corrupt_primary_falls_back_to_backup() {
        block_on(async {
            let mut store = PersistStore::new(MockFlash::default());
            let mut config = ConfigStore::default();
            config.set_defaults();
            config.set_preset(Device::T12, 260);
            store.save_config(&mut config).await.unwrap();
            config.set_preset(Device::T12, 280);
            store.save_config(&mut config).await.unwrap();

            // Corrupt the primary record
            let slot = &mut store.flash.slots[StorageKey::Config.id() as usize];
            slot.as_mut().unwrap()[7] ^= 0xFF;

            let loaded = store.load_config().await.unwrap();
            assert_eq!(loaded.t12_temp, 260);
        });
    }

    #[test]
    fn test_tip_record_slots_are_stable() {
        block_on(async {
            let mut store = PersistStore::new(MockFlash::default());
            let first = TipRecord {
                points: [1200, 1900, 2500, 2900],
                name: RadixName::from_text("T12-K").unwrap(),
                ambient: 25,
            };
            let second = TipRecord {
                points: [1100, 1800, 2400, 2800],
                name: RadixName::from_text("T12-BC2").unwrap(),
                ambient: 24,
            };
            assert_eq!(store.save_tip_record(&first).await.unwrap(), 0);
            assert_eq!(store.save_tip_record(&second).await.unwrap(), 1);

            // Updating an existing tip reuses its slot
            let updated = TipRecord {
                points: [1250, 1950, 2550, 2950],
                name: first.name,
                ambient: 20,
            };
            assert_eq!(store.save_tip_record(&updated).await.unwrap(), 0);
            assert_eq!(store.load_tip_record(0).await.unwrap(), updated);
            assert_eq!(store.load_tip_record(1).await.unwrap(), second);
        });
    }

    #[test]
    fn test_corrupt_tip_record_recovers_from_backup() {
        block_on(async {
            let mut store = PersistStore::new(MockFlash::default());
            let name = RadixName::from_text("T12-K").unwrap();
            let original = TipRecord {
                points: [1200, 1900, 2500, 2900],
                name,
                ambient: 25,
            };
            let updated = TipRecord {
                points: [1250, 1950, 2550, 2950],
                name,
                ambient: 20,
            };
            // The second save rotates the original into the backup table
            store.save_tip_record(&original).await.unwrap();
            store.save_tip_record(&updated).await.unwrap();

            // Corrupt the record in the primary table
            let slot = &mut store.flash.slots[StorageKey::TipTable.id() as usize];
            slot.as_mut().unwrap()[3] ^= 0xFF;

            // The slot recovers from the rotated copy instead of vanishing
            assert_eq!(store.load_tip_record(0).await.unwrap(), original);
        });
    }

    #[test]
    fn test_missing_tip_table_falls_back_to_backup() {
        block_on(async {
            let mut store = PersistStore::new(MockFlash::default());
            let name = RadixName::from_text("JBC-I").unwrap();
            let record = TipRecord {
                points: [1100, 1800, 2400, 2800],
                name,
                ambient: 24,
            };
            let rewritten = TipRecord {
                points: [1150, 1850, 2450, 2850],
                name,
                ambient: 23,
            };
            store.save_tip_record(&record).await.unwrap();
            store.save_tip_record(&rewritten).await.unwrap();

            // Primary table lost (power cut between rotation and write)
            store.flash.slots[StorageKey::TipTable.id() as usize] = None;

            assert_eq!(store.load_tip_record(0).await.unwrap(), record);
        });
    }

    #[test]
    fn test_boot_cold_start_defaults() {
        block_on(async {
            let mut store = PersistStore::new(with_tip_list("T12-K\nT12-BC2\nJBC-I\n"));
            let mut station = StationConfig::default();
            let status = store.boot(&mut station).await;

            assert_eq!(status, BootStatus::NoTip);
            assert_eq!(station.store.preset(Device::T12), 235);
            assert_eq!(station.store.preset(Device::Jbc), 235);
            assert_eq!(station.store.preset(Device::Gun), 200);
            assert!(station.store.is_celsius());
            assert!(station.store.is_buzzer_enabled());
            assert!(!station.store.is_dirty());
            assert_eq!(station.catalog.total(), 4);

            // The missing config was rewritten with defaults
            assert!(store.load_config().await.is_ok());
        });
    }

    #[test]
    fn test_boot_without_tip_list() {
        block_on(async {
            let mut store = PersistStore::new(MockFlash::default());
            let mut station = StationConfig::default();
            assert_eq!(store.boot(&mut station).await, BootStatus::NoTipList);
        });
    }

    #[test]
    fn test_boot_read_error_keeps_defaults_without_rewrite() {
        block_on(async {
            let mut flash = MockFlash::default();
            flash.fail_reads = true;
            let mut store = PersistStore::new(flash);
            let mut station = StationConfig::default();

            assert_eq!(store.boot(&mut station).await, BootStatus::ReadError);
            assert_eq!(station.store.preset(Device::T12), 235);
            assert_eq!(store.flash.writes, 0);
        });
    }

    #[test]
    fn test_toggle_tip_activation() {
        block_on(async {
            let mut store = PersistStore::new(MockFlash::default());
            let mut catalog = TipCatalog::from_lines(["T12-K", "JBC-I"].into_iter());
            let index = catalog
                .index_of(RadixName::from_text("T12-K").unwrap())
                .unwrap();

            // First toggle materialises a record with the default curve
            assert!(store.toggle_tip_activation(&mut catalog, index).await.unwrap());
            assert!(catalog.name(index).is_activated());
            assert_ne!(catalog.slot(index), crate::tip::NO_SLOT);

            // Second toggle deactivates but keeps the record
            assert!(!store.toggle_tip_activation(&mut catalog, index).await.unwrap());
            assert!(!catalog.name(index).is_activated());
            assert_ne!(catalog.slot(index), crate::tip::NO_SLOT);
        });
    }

    #[test]
    fn test_boot_applies_calibration_slots() {
        block_on(async {
            let mut store = PersistStore::new(with_tip_list("T12-K\nJBC-I\n"));
            let mut catalog = TipCatalog::from_lines(["T12-K", "JBC-I"].into_iter());
            let name = RadixName::from_text("T12-K").unwrap();
            store
                .save_tip_calibration(&mut catalog, name, [1210, 1910, 2510, 2910], 23, true)
                .await
                .unwrap();

            let mut station = StationConfig::default();
            assert_eq!(store.boot(&mut station).await, BootStatus::Ok);

            let index = station.catalog.index_of(name).unwrap();
            assert!(station.catalog.name(index).is_calibrated());
            assert_eq!(station.catalog.slot(index), 0);

            // The current T12 tip resolved to the calibrated one and its
            // curve got installed
            assert!(station.current_tip(Device::T12).matches(name));
            assert_eq!(station.model.point(0, Device::T12), 1210);
        });
    }
}
