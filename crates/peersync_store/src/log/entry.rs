//! Log entry types and their on-disk framing.
//!
//! Frame layout:
//!
//! ```text
//! magic "PSKV" (4) | version u16 (2) | type u8 (1) | len u32 (4) | CBOR payload (len) | crc32 (4)
//! ```
//!
//! The CRC covers every byte before it. All integers are little-endian.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Magic bytes opening every log entry.
pub const LOG_MAGIC: [u8; 4] = *b"PSKV";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// A single mutation of the key-value log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Insert or overwrite `key` in `namespace`.
    Put {
        /// Namespace (the member id).
        namespace: String,
        /// Key inside the namespace.
        key: String,
        /// Stored value.
        value: String,
    },
    /// Remove `key` from `namespace`.
    Delete {
        /// Namespace (the member id).
        namespace: String,
        /// Key inside the namespace.
        key: String,
    },
    /// Remove every key of `namespace`.
    Clear {
        /// Namespace (the member id).
        namespace: String,
    },
}

impl LogEntry {
    /// Returns the type byte written in the frame header.
    #[must_use]
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::Put { .. } => 1,
            Self::Delete { .. } => 2,
            Self::Clear { .. } => 3,
        }
    }

    /// Returns the namespace this entry touches.
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Put { namespace, .. }
            | Self::Delete { namespace, .. }
            | Self::Clear { namespace } => namespace,
        }
    }

    /// Encodes the entry into a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR encoding fails or the payload does not fit
    /// the length field.
    pub fn encode_frame(&self) -> StoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload)
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StoreError::EntryTooLarge(payload.len()))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
        frame.push(self.type_byte());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);

        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }
}

/// Outcome of decoding the frame at the start of a buffer.
#[derive(Debug)]
pub(crate) enum Frame {
    /// A valid entry occupying `len` bytes.
    Complete { entry: LogEntry, len: usize },
    /// The buffer ends before the frame does.
    Incomplete,
    /// The frame is whole but its checksum does not match.
    BadChecksum { len: usize },
}

/// Decodes the frame starting at `buf[0]`. `offset` is only used for errors.
pub(crate) fn decode_frame(buf: &[u8], offset: u64) -> StoreResult<Frame> {
    if buf.len() < HEADER_SIZE {
        return Ok(Frame::Incomplete);
    }
    if buf[0..4] != LOG_MAGIC {
        return Err(StoreError::corrupted(offset, "bad magic"));
    }
    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if version != LOG_VERSION {
        return Err(StoreError::corrupted(
            offset,
            format!("unsupported log version {version}"),
        ));
    }
    let type_byte = buf[6];
    let payload_len = u32::from_le_bytes([buf[7], buf[8], buf[9], buf[10]]) as usize;
    let total = HEADER_SIZE + payload_len + CRC_SIZE;
    if buf.len() < total {
        return Ok(Frame::Incomplete);
    }

    let body_end = HEADER_SIZE + payload_len;
    let stored_crc = u32::from_le_bytes([
        buf[body_end],
        buf[body_end + 1],
        buf[body_end + 2],
        buf[body_end + 3],
    ]);
    if compute_crc32(&buf[..body_end]) != stored_crc {
        return Ok(Frame::BadChecksum { len: total });
    }

    let entry: LogEntry = ciborium::from_reader(&buf[HEADER_SIZE..body_end])
        .map_err(|e| StoreError::corrupted(offset, format!("undecodable payload: {e}")))?;
    if entry.type_byte() != type_byte {
        return Err(StoreError::corrupted(
            offset,
            format!(
                "type byte {type_byte} does not match payload type {}",
                entry.type_byte()
            ),
        ));
    }

    Ok(Frame::Complete { entry, len: total })
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}
