//! Stream and compilation headers
//!
//! Both headers share one layout contract:
//!
//! ```text
//! preamble  : delimiter(4) · endianness(1) · header size(2) · postamble CRC-32(4)
//! postamble : version(1) · consist id(16) · car id(16) · device id(16)
//!             · recorder id(2) · recorder version(2) · header-specific fields
//! ```
//!
//! The postamble CRC is computed with the same CRC-32 as the payload checksum
//! and is always the last field populated. Stream headers end with
//! `timestamp · receive time · payload size · payload CRC · sample count`;
//! compilation headers end with `first timestamp · last timestamp · stream count`.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::codec::{
    IDENTIFIER_LEN, crc32, pad_identifier, read_identifier, read_u8, read_u16_be, read_u32_be,
};
use crate::{RecorderError, Result, Timestamp};

/// Marker at the start of every stream/log record.
pub const STREAM_DELIMITER: [u8; 4] = *b"RSTR";
/// Marker at the start of the compilation header in an export file.
pub const COMPILATION_DELIMITER: [u8; 4] = *b"RCMP";
/// Endianness flag; multi-byte fields are always big-endian.
pub const BIG_ENDIAN_FLAG: u8 = 0;
/// Layout version written in every postamble.
pub const FORMAT_VERSION: u8 = 1;

/// Bytes before the CRC-protected postamble.
pub const PREAMBLE_LEN: usize = 11;
pub const STREAM_HEADER_LEN: usize = 85;
pub const COMPILATION_HEADER_LEN: usize = 80;

/// Bytes counted by the payload size field on top of the payload itself:
/// the size field, the payload CRC and the sample count.
pub const PAYLOAD_SIZE_OVERHEAD: usize = 2 + 4 + 2;
/// Largest payload whose size the 16-bit size field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - PAYLOAD_SIZE_OVERHEAD;

const CRC_OFFSET: usize = 7;
const IDENTITY_OFFSET: usize = PREAMBLE_LEN + 1;
const IDENTITY_BLOCK_LEN: usize = 1 + 3 * IDENTIFIER_LEN + 2 + 2;
const PAYLOAD_SIZE_OFFSET: usize = 77;

/// Who produced a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderIdentity {
    pub consist_id: String,
    pub car_id: String,
    pub device_id: String,
    pub recorder_id: u16,
    pub recorder_version: u16,
}

/// Which header a delimiter introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Stream,
    Compilation,
}

impl HeaderKind {
    pub fn from_delimiter(bytes: &[u8]) -> Option<Self> {
        match bytes.get(..4)? {
            d if d == &STREAM_DELIMITER[..] => Some(HeaderKind::Stream),
            d if d == &COMPILATION_DELIMITER[..] => Some(HeaderKind::Compilation),
            _ => None,
        }
    }

    pub const fn header_len(&self) -> usize {
        match self {
            HeaderKind::Stream => STREAM_HEADER_LEN,
            HeaderKind::Compilation => COMPILATION_HEADER_LEN,
        }
    }

    const fn delimiter(&self) -> [u8; 4] {
        match self {
            HeaderKind::Stream => STREAM_DELIMITER,
            HeaderKind::Compilation => COMPILATION_DELIMITER,
        }
    }
}

/// Builds headers for one recorder identity.
///
/// The identity part of the postamble never changes at runtime, so it is
/// encoded once and copied into every header.
#[derive(Debug, Clone)]
pub struct BinaryFramer {
    identity_block: [u8; IDENTITY_BLOCK_LEN],
}

impl BinaryFramer {
    pub fn new(identity: &RecorderIdentity) -> Self {
        let mut identity_block = [0u8; IDENTITY_BLOCK_LEN];
        identity_block[0] = FORMAT_VERSION;
        identity_block[1..17].copy_from_slice(&pad_identifier(&identity.consist_id));
        identity_block[17..33].copy_from_slice(&pad_identifier(&identity.car_id));
        identity_block[33..49].copy_from_slice(&pad_identifier(&identity.device_id));
        identity_block[49..51].copy_from_slice(&identity.recorder_id.to_be_bytes());
        identity_block[51..53].copy_from_slice(&identity.recorder_version.to_be_bytes());
        Self { identity_block }
    }

    fn begin(&self, kind: HeaderKind) -> Vec<u8> {
        let mut out = Vec::with_capacity(kind.header_len());
        out.extend_from_slice(&kind.delimiter());
        out.push(BIG_ENDIAN_FLAG);
        out.extend_from_slice(&(kind.header_len() as u16).to_be_bytes());
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&self.identity_block);
        out
    }

    fn seal(mut out: Vec<u8>) -> Vec<u8> {
        let crc = crc32(&out[PREAMBLE_LEN..]);
        out[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_be_bytes());
        out
    }

    /// Build the stream header for `payload`.
    ///
    /// `timestamp` is the time of the first sample in the payload. The receive
    /// time fields are reserved for the ground side and always zero.
    pub fn stream_header(
        &self,
        timestamp: Timestamp,
        payload: &[u8],
        sample_count: u16,
    ) -> Result<Vec<u8>> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(RecorderError::capacity_exceeded(
                "record payload",
                payload.len(),
                MAX_PAYLOAD_LEN,
            ));
        }

        let mut out = self.begin(HeaderKind::Stream);
        out.extend_from_slice(&timestamp.seconds.to_be_bytes());
        out.extend_from_slice(&timestamp.millis.to_be_bytes());
        out.push(timestamp.accuracy);
        out.extend_from_slice(&[0u8; 6]);
        out.extend_from_slice(&((payload.len() + PAYLOAD_SIZE_OVERHEAD) as u16).to_be_bytes());
        out.extend_from_slice(&crc32(payload).to_be_bytes());
        out.extend_from_slice(&sample_count.to_be_bytes());
        debug_assert_eq!(out.len(), STREAM_HEADER_LEN);

        trace!(payload_len = payload.len(), sample_count, "Built stream header");
        Ok(Self::seal(out))
    }

    /// Build a complete record: stream header followed by the payload.
    pub fn frame_record(
        &self,
        timestamp: Timestamp,
        payload: &[u8],
        sample_count: u16,
    ) -> Result<Vec<u8>> {
        let mut record = self.stream_header(timestamp, payload, sample_count)?;
        record.extend_from_slice(payload);
        Ok(record)
    }

    /// Build the header placed in front of an exported ring.
    pub fn compilation_header(
        &self,
        first: Timestamp,
        last: Timestamp,
        stream_count: u32,
    ) -> Vec<u8> {
        let mut out = self.begin(HeaderKind::Compilation);
        out.extend_from_slice(&first.seconds.to_be_bytes());
        out.extend_from_slice(&first.millis.to_be_bytes());
        out.extend_from_slice(&last.seconds.to_be_bytes());
        out.extend_from_slice(&last.millis.to_be_bytes());
        out.extend_from_slice(&stream_count.to_be_bytes());
        debug_assert_eq!(out.len(), COMPILATION_HEADER_LEN);
        Self::seal(out)
    }
}

/// Check delimiter, endianness flag, declared size and postamble CRC.
///
/// `bytes` may extend past the header; only the header itself is inspected.
pub fn verify_header(bytes: &[u8]) -> bool {
    let Some(kind) = HeaderKind::from_delimiter(bytes) else {
        return false;
    };
    let len = kind.header_len();
    if bytes.len() < len || bytes[4] != BIG_ENDIAN_FLAG {
        return false;
    }
    let (Ok(declared), Ok(stored)) = (read_u16_be(bytes, 5), read_u32_be(bytes, CRC_OFFSET)) else {
        return false;
    };
    usize::from(declared) == len && crc32(&bytes[PREAMBLE_LEN..len]) == stored
}

fn parse_identity(data: &[u8]) -> Result<(u8, RecorderIdentity)> {
    let version = read_u8(data, PREAMBLE_LEN)?;
    let identity = RecorderIdentity {
        consist_id: read_identifier(data, IDENTITY_OFFSET)?,
        car_id: read_identifier(data, IDENTITY_OFFSET + IDENTIFIER_LEN)?,
        device_id: read_identifier(data, IDENTITY_OFFSET + 2 * IDENTIFIER_LEN)?,
        recorder_id: read_u16_be(data, 60)?,
        recorder_version: read_u16_be(data, 62)?,
    };
    Ok((version, identity))
}

fn require_valid(data: &[u8], kind: HeaderKind) -> Result<()> {
    if HeaderKind::from_delimiter(data) != Some(kind) {
        return Err(RecorderError::parse(
            "Header validation",
            format!("Expected {:?} delimiter", kind),
        ));
    }
    if !verify_header(data) {
        return Err(RecorderError::parse(
            "Header validation",
            format!("{:?} header is truncated or fails its CRC", kind),
        ));
    }
    Ok(())
}

/// Decoded stream/log record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub version: u8,
    pub identity: RecorderIdentity,
    pub timestamp: Timestamp,
    pub receive_time: Timestamp,
    pub payload_size_field: u16,
    pub payload_crc: u32,
    pub sample_count: u16,
}

impl StreamHeader {
    pub const LEN: usize = STREAM_HEADER_LEN;

    /// Parse and verify a stream header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        require_valid(data, HeaderKind::Stream)?;
        let (version, identity) = parse_identity(data)?;
        let payload_size_field = read_u16_be(data, PAYLOAD_SIZE_OFFSET)?;
        if usize::from(payload_size_field) < PAYLOAD_SIZE_OVERHEAD {
            return Err(RecorderError::parse(
                "Stream header",
                format!("Payload size field {} below minimum", payload_size_field),
            ));
        }

        Ok(Self {
            version,
            identity,
            timestamp: Timestamp {
                seconds: read_u32_be(data, 64)?,
                millis: read_u16_be(data, 68)?,
                accuracy: read_u8(data, 70)?,
            },
            receive_time: Timestamp {
                seconds: read_u32_be(data, 71)?,
                millis: read_u16_be(data, 75)?,
                accuracy: 0,
            },
            payload_size_field,
            payload_crc: read_u32_be(data, 79)?,
            sample_count: read_u16_be(data, 83)?,
        })
    }

    /// Payload bytes following the header.
    pub fn payload_len(&self) -> usize {
        usize::from(self.payload_size_field) - PAYLOAD_SIZE_OVERHEAD
    }

    /// Header plus payload.
    pub fn record_len(&self) -> usize {
        STREAM_HEADER_LEN + self.payload_len()
    }

    pub fn payload_matches(&self, payload: &[u8]) -> bool {
        payload.len() == self.payload_len() && crc32(payload) == self.payload_crc
    }
}

/// Decoded compilation header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationHeader {
    pub version: u8,
    pub identity: RecorderIdentity,
    pub first: Timestamp,
    pub last: Timestamp,
    pub stream_count: u32,
}

impl CompilationHeader {
    pub const LEN: usize = COMPILATION_HEADER_LEN;

    pub fn parse(data: &[u8]) -> Result<Self> {
        require_valid(data, HeaderKind::Compilation)?;
        let (version, identity) = parse_identity(data)?;
        Ok(Self {
            version,
            identity,
            first: Timestamp::new(read_u32_be(data, 64)?, read_u16_be(data, 68)?),
            last: Timestamp::new(read_u32_be(data, 70)?, read_u16_be(data, 74)?),
            stream_count: read_u32_be(data, 76)?,
        })
    }
}
