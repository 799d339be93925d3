//! Signal type definitions

use serde::{Deserialize, Serialize};

/// Supported signal widths.
///
/// The recorder only samples fixed-width integers; every value is written in
/// network byte order at its native width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    /// 8-bit unsigned integer
    U8,
    /// 8-bit signed integer
    I8,
    /// 16-bit unsigned integer
    U16,
    /// 16-bit signed integer
    I16,
    /// 32-bit unsigned integer
    U32,
    /// 32-bit signed integer
    I32,
}

impl SignalType {
    /// Returns the size in bytes of a value of this type.
    pub const fn size(&self) -> usize {
        match self {
            SignalType::U8 | SignalType::I8 => 1,
            SignalType::U16 | SignalType::I16 => 2,
            SignalType::U32 | SignalType::I32 => 4,
        }
    }

    /// Lowercase name as used in configuration files.
    pub const fn name(&self) -> &'static str {
        match self {
            SignalType::U8 => "u8",
            SignalType::I8 => "i8",
            SignalType::U16 => "u16",
            SignalType::I16 => "i16",
            SignalType::U32 => "u32",
            SignalType::I32 => "i32",
        }
    }
}

/// A sampled signal value at its native width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
}

impl SignalValue {
    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalValue::U8(_) => SignalType::U8,
            SignalValue::I8(_) => SignalType::I8,
            SignalValue::U16(_) => SignalType::U16,
            SignalValue::I16(_) => SignalType::I16,
            SignalValue::U32(_) => SignalType::U32,
            SignalValue::I32(_) => SignalType::I32,
        }
    }

    /// Append the big-endian encoding of this value.
    pub fn write_be(&self, out: &mut Vec<u8>) {
        match *self {
            SignalValue::U8(v) => out.push(v),
            SignalValue::I8(v) => out.extend_from_slice(&v.to_be_bytes()),
            SignalValue::U16(v) => out.extend_from_slice(&v.to_be_bytes()),
            SignalValue::I16(v) => out.extend_from_slice(&v.to_be_bytes()),
            SignalValue::U32(v) => out.extend_from_slice(&v.to_be_bytes()),
            SignalValue::I32(v) => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    /// Decode a big-endian value of the given type from the start of `data`.
    pub fn read_be(signal_type: SignalType, data: &[u8]) -> crate::Result<Self> {
        let bytes = data.get(..signal_type.size()).ok_or_else(|| {
            crate::RecorderError::parse(
                "Signal value decoding",
                format!(
                    "Need {} bytes for {}, have {}",
                    signal_type.size(),
                    signal_type.name(),
                    data.len()
                ),
            )
        })?;

        Ok(match signal_type {
            SignalType::U8 => SignalValue::U8(bytes[0]),
            SignalType::I8 => SignalValue::I8(bytes[0] as i8),
            SignalType::U16 => SignalValue::U16(u16::from_be_bytes([bytes[0], bytes[1]])),
            SignalType::I16 => SignalValue::I16(i16::from_be_bytes([bytes[0], bytes[1]])),
            SignalType::U32 => {
                SignalValue::U32(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            SignalType::I32 => {
                SignalValue::I32(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
        })
    }
}
