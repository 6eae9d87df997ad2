//! Fixed-width header record codec
//!
//! Each record in a headers file is exactly [`RAW_HEADER_SIZE`] bytes,
//! little-endian, with no padding:
//!
//! ```text
//! offset  size  field
//!      0     8  id_timestamp  (i64)
//!      8     4  id_sequence   (i32)
//!     12     2  type_length   (i16)
//!     14     8  data_offset   (i64)
//!     22     4  data_length   (i32)
//! ```
//!
//! Record `n` describes the event at logical position `n`, so a read can seek
//! straight to `n * RAW_HEADER_SIZE`.

use eventvault_core::EventId;

use crate::error::StorageError;

/// Size of one encoded header record
pub const RAW_HEADER_SIZE: usize = 26;

const TIMESTAMP_AT: usize = 0;
const SEQUENCE_AT: usize = 8;
const TYPE_LENGTH_AT: usize = 12;
const DATA_OFFSET_AT: usize = 14;
const DATA_LENGTH_AT: usize = 22;

/// On-disk description of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub id_timestamp: i64,
    pub id_sequence: i32,
    /// Number of meaningful bytes in the fixed-width type buffer
    pub type_length: i16,
    /// Offset of the event's type buffer in the data file
    pub data_offset: i64,
    /// Payload length, excluding the type buffer
    pub data_length: i32,
}

impl RawHeader {
    pub fn event_id(&self) -> Result<EventId, StorageError> {
        let sequence = u16::try_from(self.id_sequence).map_err(|_| {
            StorageError::corrupt(format!("event sequence {} out of range", self.id_sequence))
        })?;
        Ok(EventId::new(self.id_timestamp, sequence))
    }

    /// Encode into a record buffer
    pub fn encode(&self) -> [u8; RAW_HEADER_SIZE] {
        let mut buf = [0u8; RAW_HEADER_SIZE];
        buf[TIMESTAMP_AT..SEQUENCE_AT].copy_from_slice(&self.id_timestamp.to_le_bytes());
        buf[SEQUENCE_AT..TYPE_LENGTH_AT].copy_from_slice(&self.id_sequence.to_le_bytes());
        buf[TYPE_LENGTH_AT..DATA_OFFSET_AT].copy_from_slice(&self.type_length.to_le_bytes());
        buf[DATA_OFFSET_AT..DATA_LENGTH_AT].copy_from_slice(&self.data_offset.to_le_bytes());
        buf[DATA_LENGTH_AT..RAW_HEADER_SIZE].copy_from_slice(&self.data_length.to_le_bytes());
        buf
    }

    /// Decode a record buffer
    pub fn decode(buf: &[u8; RAW_HEADER_SIZE]) -> Self {
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&buf[TIMESTAMP_AT..SEQUENCE_AT]);
        let mut sequence = [0u8; 4];
        sequence.copy_from_slice(&buf[SEQUENCE_AT..TYPE_LENGTH_AT]);
        let mut type_length = [0u8; 2];
        type_length.copy_from_slice(&buf[TYPE_LENGTH_AT..DATA_OFFSET_AT]);
        let mut data_offset = [0u8; 8];
        data_offset.copy_from_slice(&buf[DATA_OFFSET_AT..DATA_LENGTH_AT]);
        let mut data_length = [0u8; 4];
        data_length.copy_from_slice(&buf[DATA_LENGTH_AT..RAW_HEADER_SIZE]);

        Self {
            id_timestamp: i64::from_le_bytes(timestamp),
            id_sequence: i32::from_le_bytes(sequence),
            type_length: i16::from_le_bytes(type_length),
            data_offset: i64::from_le_bytes(data_offset),
            data_length: i32::from_le_bytes(data_length),
        }
    }

    /// Reject values no writer could have produced
    pub fn validate(&self, max_type_length: usize) -> Result<(), StorageError> {
        if self.type_length < 0 || self.type_length as usize > max_type_length {
            return Err(StorageError::corrupt(format!(
                "type length {} out of range",
                self.type_length
            )));
        }
        if self.data_offset < 0 {
            return Err(StorageError::corrupt(format!(
                "negative data offset {}",
                self.data_offset
            )));
        }
        if self.data_length < 0 {
            return Err(StorageError::corrupt(format!(
                "negative data length {}",
                self.data_length
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawHeader {
        RawHeader {
            id_timestamp: 0x0102_0304_0506_0708,
            id_sequence: 0x0A0B_0C0D,
            type_length: 0x1122,
            data_offset: 0x2122_2324_2526_2728,
            data_length: 0x3132_3334,
        }
    }

    #[test]
    fn test_field_offsets_are_pinned() {
        let buf = sample().encode();
        assert_eq!(buf.len(), 26);
        assert_eq!(&buf[0..8], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[8..12], &[0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(&buf[12..14], &[0x22, 0x11]);
        assert_eq!(&buf[14..22], &[0x28, 0x27, 0x26, 0x25, 0x24, 0x23, 0x22, 0x21]);
        assert_eq!(&buf[22..26], &[0x34, 0x33, 0x32, 0x31]);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let header = sample();
        assert_eq!(RawHeader::decode(&header.encode()), header);
    }

    #[test]
    fn test_negative_values_survive() {
        let header = RawHeader {
            id_timestamp: -5,
            id_sequence: -1,
            type_length: -2,
            data_offset: -3,
            data_length: -4,
        };
        assert_eq!(RawHeader::decode(&header.encode()), header);
        assert!(header.validate(64).is_err());
    }

    #[test]
    fn test_event_id() {
        let header = RawHeader {
            id_timestamp: 99,
            id_sequence: 7,
            type_length: 3,
            data_offset: 0,
            data_length: 0,
        };
        assert_eq!(header.event_id().unwrap(), EventId::new(99, 7));

        let bad = RawHeader {
            id_sequence: 70_000,
            ..header
        };
        assert!(matches!(bad.event_id(), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_validate_type_length_bound() {
        let header = RawHeader {
            id_timestamp: 1,
            id_sequence: 0,
            type_length: 65,
            data_offset: 0,
            data_length: 10,
        };
        assert!(header.validate(64).is_err());
        assert!(RawHeader { type_length: 64, ..header }.validate(64).is_ok());
    }
}
