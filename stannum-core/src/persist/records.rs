//! Record codecs
//!
//! Two formats live on flash. The configuration and PID sets are postcard
//! blobs wrapped in a magic/version header and an IEEE CRC32 trailer. Tip
//! calibration records keep a fixed 16-byte layout with a one-byte
//! complement checksum, so a tip's persist slot is simply its offset in the
//! packed table.

use serde::{de::DeserializeOwned, Serialize};

use super::StoreError;
use crate::tip::{RadixName, TipCurve};

/// Identifies a configuration blob
pub const CONFIG_MAGIC: u32 = 0x4746_4353; // "SCFG"
/// Identifies a PID blob
pub const PID_MAGIC: u32 = 0x4449_5053; // "SPID"
/// Current blob format version
pub const RECORD_VERSION: u8 = 1;

/// Bytes of header (magic + version) in a blob
const HEADER_SIZE: usize = 5;
/// Bytes of the CRC32 trailer
const CRC_SIZE: usize = 4;

/// Size of one packed tip record
pub const TIP_RECORD_SIZE: usize = 16;
/// Capacity of the tip calibration table
pub const MAX_TIP_RECORDS: usize = 64;

/// IEEE 802.3 CRC32 over a byte run
pub fn crc32(seed: u32, data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc = seed;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Encode a postcard blob with header and CRC32 trailer
///
/// Returns the number of bytes written into `buf`.
pub fn encode_blob<T: Serialize>(magic: u32, value: &T, buf: &mut [u8]) -> Result<usize, StoreError> {
    if buf.len() < HEADER_SIZE + CRC_SIZE {
        return Err(StoreError::BufferTooSmall);
    }
    buf[..4].copy_from_slice(&magic.to_le_bytes());
    buf[4] = RECORD_VERSION;
    let body_end = HEADER_SIZE
        + postcard::to_slice(value, &mut buf[HEADER_SIZE..])
            .map_err(|_| StoreError::Serialize)?
            .len();
    if buf.len() < body_end + CRC_SIZE {
        return Err(StoreError::BufferTooSmall);
    }
    let crc = !crc32(0xFFFF_FFFF, &buf[..body_end]);
    buf[body_end..body_end + CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
    Ok(body_end + CRC_SIZE)
}

/// Decode a blob produced by [`encode_blob`], verifying magic, version
/// and CRC
pub fn decode_blob<T: DeserializeOwned>(magic: u32, data: &[u8]) -> Result<T, StoreError> {
    if data.len() < HEADER_SIZE + CRC_SIZE {
        return Err(StoreError::Corrupt);
    }
    let body_end = data.len() - CRC_SIZE;
    let mut stored = [0u8; 4];
    stored.copy_from_slice(&data[body_end..]);
    if u32::from_le_bytes(stored) != !crc32(0xFFFF_FFFF, &data[..body_end]) {
        return Err(StoreError::Corrupt);
    }
    let mut found = [0u8; 4];
    found.copy_from_slice(&data[..4]);
    if u32::from_le_bytes(found) != magic || data[4] != RECORD_VERSION {
        return Err(StoreError::Corrupt);
    }
    postcard::from_bytes(&data[HEADER_SIZE..body_end]).map_err(|_| StoreError::Corrupt)
}

/// One persisted tip calibration record
///
/// Layout: four raw points (little-endian u16), the packed name word, the
/// ambient temperature, two reserved bytes and the checksum byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TipRecord {
    pub points: [u16; 4],
    pub name: RadixName,
    pub ambient: i8,
}

impl TipRecord {
    /// Pack into the on-flash layout
    pub fn encode(&self) -> [u8; TIP_RECORD_SIZE] {
        let mut out = [0u8; TIP_RECORD_SIZE];
        for (i, point) in self.points.iter().enumerate() {
            out[i * 2..i * 2 + 2].copy_from_slice(&point.to_le_bytes());
        }
        out[8..12].copy_from_slice(&self.name.word().to_le_bytes());
        out[12] = self.ambient as u8;
        out[15] = Self::checksum(&out);
        out
    }

    /// Unpack and verify one record
    pub fn decode(data: &[u8]) -> Result<Self, StoreError> {
        if data.len() < TIP_RECORD_SIZE {
            return Err(StoreError::Corrupt);
        }
        if Self::checksum(data) != data[15] {
            return Err(StoreError::Corrupt);
        }
        let mut points = [0u16; 4];
        for (i, point) in points.iter_mut().enumerate() {
            *point = u16::from_le_bytes([data[i * 2], data[i * 2 + 1]]);
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&data[8..12]);
        Ok(Self {
            points,
            name: RadixName::from_word(u32::from_le_bytes(word)),
            ambient: data[12] as i8,
        })
    }

    /// The thermal curve carried by this record
    pub fn curve(&self) -> TipCurve {
        TipCurve {
            points: self.points,
            ambient: self.ambient,
        }
    }

    fn checksum(data: &[u8]) -> u8 {
        let sum: u8 = data[..TIP_RECORD_SIZE - 1]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        !sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigRecord, PidTable};

    #[test]
    fn test_blob_round_trip() {
        let cfg = ConfigRecord::default();
        let mut buf = [0u8; 256];
        let len = encode_blob(CONFIG_MAGIC, &cfg, &mut buf).unwrap();
        let back: ConfigRecord = decode_blob(CONFIG_MAGIC, &buf[..len]).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_blob_rejects_corruption() {
        let pid = PidTable::default();
        let mut buf = [0u8; 128];
        let len = encode_blob(PID_MAGIC, &pid, &mut buf).unwrap();

        let mut flipped = buf;
        flipped[HEADER_SIZE + 1] ^= 0x40;
        assert_eq!(
            decode_blob::<PidTable>(PID_MAGIC, &flipped[..len]).unwrap_err(),
            StoreError::Corrupt
        );
    }

    #[test]
    fn test_blob_rejects_wrong_magic() {
        let pid = PidTable::default();
        let mut buf = [0u8; 128];
        let len = encode_blob(PID_MAGIC, &pid, &mut buf).unwrap();
        assert_eq!(
            decode_blob::<PidTable>(CONFIG_MAGIC, &buf[..len]).unwrap_err(),
            StoreError::Corrupt
        );
    }

    #[test]
    fn test_tip_record_round_trip() {
        let mut name = RadixName::from_text("T12-BC2").unwrap();
        name.set_activated();
        name.set_calibrated();
        let record = TipRecord {
            points: [1210, 1905, 2509, 2906],
            name,
            ambient: -5,
        };
        let bytes = record.encode();
        assert_eq!(bytes.len(), TIP_RECORD_SIZE);
        let back = TipRecord::decode(&bytes).unwrap();
        assert_eq!(back, record);
        assert!(back.name.is_calibrated());
        assert_eq!(back.ambient, -5);
    }

    #[test]
    fn test_tip_record_checksum() {
        let record = TipRecord {
            points: [1200, 1900, 2500, 2900],
            name: RadixName::from_text("JBC-I").unwrap(),
            ambient: 25,
        };
        let mut bytes = record.encode();
        bytes[3] ^= 1;
        assert_eq!(TipRecord::decode(&bytes).unwrap_err(), StoreError::Corrupt);
    }
}
