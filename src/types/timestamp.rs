//! Sample timestamps

use serde::{Deserialize, Serialize};

/// Wall-clock time of a sample as carried on the wire.
///
/// Seconds since the Unix epoch, a millisecond fraction below 1000, and the
/// accuracy flag reported by the time source. Comparisons between timestamps
/// use [`Timestamp::as_millis`]; the accuracy flag never affects ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: u32,
    pub millis: u16,
    pub accuracy: u8,
}

impl Timestamp {
    /// Accuracy flag for a clock that is not externally synchronized.
    pub const UNSYNCHRONIZED: u8 = 0;
    /// Accuracy flag for a clock synchronized to train time.
    pub const SYNCHRONIZED: u8 = 1;

    /// Create a timestamp, normalizing a millisecond part of 1000 or more.
    pub const fn new(seconds: u32, millis: u16) -> Self {
        Self {
            seconds: seconds.saturating_add((millis / 1000) as u32),
            millis: millis % 1000,
            accuracy: Self::UNSYNCHRONIZED,
        }
    }

    pub const fn with_accuracy(mut self, accuracy: u8) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Build a timestamp from milliseconds since the epoch.
    pub fn from_millis(total: u64) -> Self {
        let seconds = u32::try_from(total / 1000).unwrap_or(u32::MAX);
        Self { seconds, millis: (total % 1000) as u16, accuracy: Self::UNSYNCHRONIZED }
    }

    /// Milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        u64::from(self.seconds) * 1000 + u64::from(self.millis)
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn millis_since(&self, earlier: &Timestamp) -> u64 {
        self.as_millis().saturating_sub(earlier.as_millis())
    }

    /// Whether at least `limit_ms` have passed since `since`.
    pub fn has_elapsed(&self, since: &Timestamp, limit_ms: u64) -> bool {
        self.millis_since(since) >= limit_ms
    }

    /// Return this timestamp advanced by `ms` milliseconds.
    pub fn plus_millis(&self, ms: u64) -> Self {
        Self::from_millis(self.as_millis() + ms).with_accuracy(self.accuracy)
    }
}
