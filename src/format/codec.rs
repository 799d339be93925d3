//! Bounds-checked big-endian field access
//!
//! Every multi-byte field in the recorder's wire formats is written in network
//! byte order regardless of host order. These helpers read fields at fixed
//! offsets and turn short input into [`RecorderError::Parse`] instead of
//! panicking, so a truncated file can be diagnosed rather than crash recovery.

use crate::{RecorderError, Result};

/// Width of the fixed consist/car/device identifier fields.
pub const IDENTIFIER_LEN: usize = 16;

/// Padding byte for identifier fields. Underscore rather than NUL keeps the
/// field printable and the record length fixed.
pub const IDENTIFIER_PAD: u8 = b'_';

fn field<'a>(data: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    data.get(offset..offset + len).ok_or_else(|| {
        RecorderError::parse(
            format!("{} parsing", what),
            format!(
                "Insufficient data at offset {} (need {} bytes, have {})",
                offset,
                len,
                data.len().saturating_sub(offset)
            ),
        )
    })
}

pub fn read_u8(data: &[u8], offset: usize) -> Result<u8> {
    Ok(field(data, offset, 1, "Byte")?[0])
}

pub fn read_u16_be(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = field(data, offset, 2, "u16")?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub fn read_u32_be(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = field(data, offset, 4, "u32")?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Right-pad an identifier with underscores to the fixed field width.
///
/// Longer identifiers are rejected at configuration time; here they are cut
/// at the field width so a record can never change length.
pub fn pad_identifier(id: &str) -> [u8; IDENTIFIER_LEN] {
    let mut out = [IDENTIFIER_PAD; IDENTIFIER_LEN];
    let bytes = id.as_bytes();
    let len = bytes.len().min(IDENTIFIER_LEN);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

/// Read an identifier field, dropping the underscore padding.
pub fn read_identifier(data: &[u8], offset: usize) -> Result<String> {
    let bytes = field(data, offset, IDENTIFIER_LEN, "Identifier")?;
    let end = bytes.iter().rposition(|&b| b != IDENTIFIER_PAD).map_or(0, |p| p + 1);
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// CRC-32 used for both header postambles and payloads.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
