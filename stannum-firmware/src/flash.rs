//! On-chip flash storage
//!
//! Implements the core [`FlashStore`] trait with wear-levelled key-value
//! records (sequential-storage) in the last 16 KiB of the F103's flash.
//! The blocking flash peripheral is adapted to the async storage stack.

use embassy_embedded_hal::adapter::BlockingAsync;
use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::peripherals::FLASH;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

use stannum_core::persist::{FlashStore, StorageKey, StoreError};

/// Total flash of the STM32F103RE
const FLASH_SIZE: u32 = 512 * 1024;
/// Key-value partition at the top of flash
const PARTITION_SIZE: u32 = 16 * 1024;
const PARTITION: core::ops::Range<u32> = (FLASH_SIZE - PARTITION_SIZE)..FLASH_SIZE;

/// Scratch large enough for the biggest record (the tip table)
const DATA_BUF: usize = 1152;

/// The station's persistent storage backend
pub struct StationFlash {
    flash: BlockingAsync<Flash<'static, Blocking>>,
}

impl StationFlash {
    pub fn new(flash: FLASH) -> Self {
        Self {
            flash: BlockingAsync::new(Flash::new_blocking(flash)),
        }
    }
}

impl FlashStore for StationFlash {
    async fn read(&mut self, key: StorageKey, buf: &mut [u8]) -> Result<usize, StoreError> {
        let mut data_buf = [0u8; DATA_BUF];
        let found = map::fetch_item::<u8, &[u8], _>(
            &mut self.flash,
            PARTITION,
            &mut NoCache::new(),
            &mut data_buf,
            &key.id(),
        )
        .await
        .map_err(|_| StoreError::Storage)?;

        match found {
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
        let mut data_buf = [0u8; DATA_BUF];
        map::store_item(
            &mut self.flash,
            PARTITION,
            &mut NoCache::new(),
            &mut data_buf,
            &key.id(),
            &data,
        )
        .await
        .map_err(|_| StoreError::Storage)
    }

    async fn erase_all(&mut self) -> Result<(), StoreError> {
        sequential_storage::erase_all(&mut self.flash, PARTITION)
            .await
            .map_err(|_| StoreError::Storage)
    }
}
