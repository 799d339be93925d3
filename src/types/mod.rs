//! Core types for signal sampling.
//!
//! ## Architecture
//!
//! - [`SignalType`] / [`SignalValue`] describe the closed set of recordable widths
//! - [`SignalSource`] is a typed handle onto a live control-system value
//! - [`SignalDescriptor`] binds a configured id to its source and tracks the
//!   last time it was reported
//! - [`Timestamp`] is the wire representation of sample time
//! - [`SampleHeader`] precedes every sample's delta bytes
//!
//! ## Usage Example
//!
//! ```rust
//! use railrec::types::{SignalDescriptor, SignalSource, SignalValue};
//!
//! let source = SignalSource::from_value(SignalValue::U16(750));
//! let descriptor = SignalDescriptor::new(1, "LineVoltage", source.clone());
//!
//! let mut snapshot = Vec::new();
//! descriptor.write_snapshot(&mut snapshot);
//! assert_eq!(snapshot, vec![0x00, 0x01, 0x02, 0xEE]);
//! ```

mod sample;
mod signal;
mod signal_type;
mod timestamp;

pub use sample::{DecodedSample, SampleHeader, decode_samples};
pub use signal::{SignalDescriptor, SignalRegistry, SignalSource, bind_signals};
pub use signal_type::{SignalType, SignalValue};
pub use timestamp::Timestamp;

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = SignalValue> {
        prop_oneof![
            any::<u8>().prop_map(SignalValue::U8),
            any::<i8>().prop_map(SignalValue::I8),
            any::<u16>().prop_map(SignalValue::U16),
            any::<i16>().prop_map(SignalValue::I16),
            any::<u32>().prop_map(SignalValue::U32),
            any::<i32>().prop_map(SignalValue::I32),
        ]
    }

    proptest! {
        #[test]
        fn prop_encoded_width_matches_type(value in arb_value()) {
            let mut out = Vec::new();
            value.write_be(&mut out);
            prop_assert_eq!(out.len(), value.signal_type().size());
            let decoded = SignalValue::read_be(value.signal_type(), &out);
            prop_assert_eq!(decoded.ok(), Some(value));
        }

        #[test]
        fn prop_source_reads_what_was_stored(initial in arb_value(), next in arb_value()) {
            let source = SignalSource::from_value(initial);
            prop_assert_eq!(source.read(), initial);
            let stored = source.store(next);
            if next.signal_type() == initial.signal_type() {
                prop_assert!(stored.is_ok());
                prop_assert_eq!(source.read(), next);
            } else {
                prop_assert!(stored.is_err());
                prop_assert_eq!(source.read(), initial);
            }
        }
    }

    #[test]
    fn signal_type_sizes() {
        assert_eq!(SignalType::U8.size(), 1);
        assert_eq!(SignalType::I8.size(), 1);
        assert_eq!(SignalType::U16.size(), 2);
        assert_eq!(SignalType::I16.size(), 2);
        assert_eq!(SignalType::U32.size(), 4);
        assert_eq!(SignalType::I32.size(), 4);
    }

    #[test]
    fn short_input_is_a_parse_error() {
        let result = SignalValue::read_be(SignalType::U32, &[0, 1]);
        assert!(matches!(result, Err(crate::RecorderError::Parse { .. })));
    }
}
