//! Per-sample header and payload decoding

use std::collections::HashMap;

use super::{SignalType, SignalValue, Timestamp};
use crate::format::codec::{read_u8, read_u16_be, read_u32_be};
use crate::{RecorderError, Result};

/// Header written in front of every sample's delta bytes.
///
/// Layout: seconds(4) · millis(2) · accuracy(1) · changed signal count(2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleHeader {
    pub timestamp: Timestamp,
    pub changed_count: u16,
}

impl SampleHeader {
    pub const ENCODED_LEN: usize = 9;

    pub fn new(timestamp: Timestamp, changed_count: u16) -> Self {
        Self { timestamp, changed_count }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.timestamp.seconds.to_be_bytes());
        out.extend_from_slice(&self.timestamp.millis.to_be_bytes());
        out.push(self.timestamp.accuracy);
        out.extend_from_slice(&self.changed_count.to_be_bytes());
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let seconds = read_u32_be(data, 0)?;
        let millis = read_u16_be(data, 4)?;
        let accuracy = read_u8(data, 6)?;
        let changed_count = read_u16_be(data, 7)?;
        Ok(Self { timestamp: Timestamp { seconds, millis, accuracy }, changed_count })
    }
}

/// One decoded sample: its header and the (id, value) pairs it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSample {
    pub header: SampleHeader,
    pub values: Vec<(u16, SignalValue)>,
}

/// Split a record payload back into samples.
///
/// Signal types are not carried on the wire, so the caller supplies the
/// id-to-type map from the configuration that produced the payload.
pub fn decode_samples(
    payload: &[u8],
    sample_count: u16,
    types: &HashMap<u16, SignalType>,
) -> Result<Vec<DecodedSample>> {
    let mut samples = Vec::with_capacity(usize::from(sample_count));
    let mut pos = 0usize;

    for _ in 0..sample_count {
        let header = SampleHeader::parse(&payload[pos.min(payload.len())..])?;
        pos += SampleHeader::ENCODED_LEN;

        let mut values = Vec::with_capacity(usize::from(header.changed_count));
        for _ in 0..header.changed_count {
            let id = read_u16_be(payload, pos)?;
            let signal_type = types.get(&id).copied().ok_or_else(|| {
                RecorderError::parse("Sample decoding", format!("Unknown signal id {}", id))
            })?;
            pos += 2;
            let value = SignalValue::read_be(signal_type, &payload[pos.min(payload.len())..])?;
            pos += signal_type.size();
            values.push((id, value));
        }

        samples.push(DecodedSample { header, values });
    }

    if pos != payload.len() {
        return Err(RecorderError::parse(
            "Sample decoding",
            format!("{} trailing bytes after {} samples", payload.len() - pos, sample_count),
        ));
    }

    Ok(samples)
}
