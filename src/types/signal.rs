//! Typed signal sources and descriptors
//!
//! The control system publishes each recorded signal through an atomic cell of
//! its native width. A [`SignalRegistry`] maps configured names to those cells,
//! and [`SignalDescriptor::bind`] resolves each configured signal exactly once
//! at startup, so the per-cycle path reads a typed cell and never looks up a
//! name or reinterprets an untyped address.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI8, AtomicI16, AtomicI32, AtomicU8, AtomicU16, AtomicU32, Ordering};

use super::{SignalType, SignalValue, Timestamp};
use crate::config::SignalSpec;
use crate::{RecorderError, Result};

/// Read access to one live control-system value.
#[derive(Debug, Clone)]
pub enum SignalSource {
    U8(Arc<AtomicU8>),
    I8(Arc<AtomicI8>),
    U16(Arc<AtomicU16>),
    I16(Arc<AtomicI16>),
    U32(Arc<AtomicU32>),
    I32(Arc<AtomicI32>),
}

impl SignalSource {
    /// Create a fresh cell holding `initial`, returning the source for it.
    pub fn from_value(initial: SignalValue) -> Self {
        match initial {
            SignalValue::U8(v) => SignalSource::U8(Arc::new(AtomicU8::new(v))),
            SignalValue::I8(v) => SignalSource::I8(Arc::new(AtomicI8::new(v))),
            SignalValue::U16(v) => SignalSource::U16(Arc::new(AtomicU16::new(v))),
            SignalValue::I16(v) => SignalSource::I16(Arc::new(AtomicI16::new(v))),
            SignalValue::U32(v) => SignalSource::U32(Arc::new(AtomicU32::new(v))),
            SignalValue::I32(v) => SignalSource::I32(Arc::new(AtomicI32::new(v))),
        }
    }

    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalSource::U8(_) => SignalType::U8,
            SignalSource::I8(_) => SignalType::I8,
            SignalSource::U16(_) => SignalType::U16,
            SignalSource::I16(_) => SignalType::I16,
            SignalSource::U32(_) => SignalType::U32,
            SignalSource::I32(_) => SignalType::I32,
        }
    }

    /// Read the current value.
    pub fn read(&self) -> SignalValue {
        match self {
            SignalSource::U8(cell) => SignalValue::U8(cell.load(Ordering::Acquire)),
            SignalSource::I8(cell) => SignalValue::I8(cell.load(Ordering::Acquire)),
            SignalSource::U16(cell) => SignalValue::U16(cell.load(Ordering::Acquire)),
            SignalSource::I16(cell) => SignalValue::I16(cell.load(Ordering::Acquire)),
            SignalSource::U32(cell) => SignalValue::U32(cell.load(Ordering::Acquire)),
            SignalSource::I32(cell) => SignalValue::I32(cell.load(Ordering::Acquire)),
        }
    }

    /// Publish a new value. Fails if the value's width does not match the cell.
    pub fn store(&self, value: SignalValue) -> Result<()> {
        match (self, value) {
            (SignalSource::U8(cell), SignalValue::U8(v)) => cell.store(v, Ordering::Release),
            (SignalSource::I8(cell), SignalValue::I8(v)) => cell.store(v, Ordering::Release),
            (SignalSource::U16(cell), SignalValue::U16(v)) => cell.store(v, Ordering::Release),
            (SignalSource::I16(cell), SignalValue::I16(v)) => cell.store(v, Ordering::Release),
            (SignalSource::U32(cell), SignalValue::U32(v)) => cell.store(v, Ordering::Release),
            (SignalSource::I32(cell), SignalValue::I32(v)) => cell.store(v, Ordering::Release),
            (source, value) => {
                return Err(RecorderError::parse(
                    "Signal store",
                    format!(
                        "Cannot store {} value in {} cell",
                        value.signal_type().name(),
                        source.signal_type().name()
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Name-to-source map provided by the control system.
#[derive(Debug, Clone, Default)]
pub struct SignalRegistry {
    sources: HashMap<String, SignalSource>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, source: SignalSource) {
        self.sources.insert(name.into(), source);
    }

    pub fn get(&self, name: &str) -> Option<&SignalSource> {
        self.sources.get(name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// A configured signal bound to its live source.
#[derive(Debug, Clone)]
pub struct SignalDescriptor {
    /// Identifier written in front of every recorded value
    pub id: u16,
    /// Configured name, kept for diagnostics
    pub name: String,
    source: SignalSource,
    /// Time the value last changed or was last force-reported
    pub last_change: Option<Timestamp>,
}

impl SignalDescriptor {
    /// Create a descriptor directly from a source.
    pub fn new(id: u16, name: impl Into<String>, source: SignalSource) -> Self {
        Self { id, name: name.into(), source, last_change: None }
    }

    /// Resolve a configured signal against the registry.
    pub fn bind(spec: &SignalSpec, registry: &SignalRegistry) -> Result<Self> {
        let source = registry
            .get(&spec.name)
            .ok_or_else(|| RecorderError::signal_binding(&spec.name, "no such source registered"))?;

        if source.signal_type() != spec.signal_type {
            return Err(RecorderError::signal_binding(
                &spec.name,
                format!(
                    "configured as {} but source is {}",
                    spec.signal_type.name(),
                    source.signal_type().name()
                ),
            ));
        }

        Ok(Self::new(spec.id, spec.name.clone(), source.clone()))
    }

    pub fn signal_type(&self) -> SignalType {
        self.source.signal_type()
    }

    /// Bytes this signal occupies in a snapshot: identifier plus value.
    pub fn encoded_len(&self) -> usize {
        2 + self.signal_type().size()
    }

    /// Read the live value.
    pub fn read(&self) -> SignalValue {
        self.source.read()
    }

    /// Append identifier and current value in network byte order.
    pub fn write_snapshot(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_be_bytes());
        self.read().write_be(out);
    }
}

/// Bind every configured signal, preserving configuration order.
pub fn bind_signals(
    specs: &[SignalSpec],
    registry: &SignalRegistry,
) -> Result<Vec<SignalDescriptor>> {
    specs.iter().map(|spec| SignalDescriptor::bind(spec, registry)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, id: u16, signal_type: SignalType) -> SignalSpec {
        SignalSpec { name: name.to_string(), id, signal_type }
    }

    #[test]
    fn bind_resolves_matching_source() {
        let mut registry = SignalRegistry::new();
        registry.register("LineVoltage", SignalSource::from_value(SignalValue::U16(750)));

        let descriptor = SignalDescriptor::bind(&spec("LineVoltage", 7, SignalType::U16), &registry)
            .expect("binding should succeed");
        assert_eq!(descriptor.id, 7);
        assert_eq!(descriptor.read(), SignalValue::U16(750));
        assert_eq!(descriptor.encoded_len(), 4);
        assert!(descriptor.last_change.is_none());
    }

    #[test]
    fn bind_rejects_missing_and_mistyped_sources() {
        let mut registry = SignalRegistry::new();
        registry.register("DoorState", SignalSource::from_value(SignalValue::U8(0)));

        let missing = SignalDescriptor::bind(&spec("Brake", 1, SignalType::U8), &registry);
        assert!(matches!(missing, Err(RecorderError::SignalBinding { .. })));

        let mistyped = SignalDescriptor::bind(&spec("DoorState", 2, SignalType::I32), &registry);
        assert!(matches!(mistyped, Err(RecorderError::SignalBinding { .. })));
    }

    #[test]
    fn snapshot_encoding_is_big_endian() {
        let descriptor = SignalDescriptor::new(
            0x0102,
            "Traction",
            SignalSource::from_value(SignalValue::I32(-2)),
        );
        let mut out = Vec::new();
        descriptor.write_snapshot(&mut out);
        assert_eq!(out, vec![0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn store_checks_width() {
        let source = SignalSource::from_value(SignalValue::U16(1));
        source.store(SignalValue::U16(9)).expect("same width store");
        assert_eq!(source.read(), SignalValue::U16(9));
        assert!(source.store(SignalValue::U8(1)).is_err());
    }
}
