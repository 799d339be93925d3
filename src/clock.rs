//! Wall-clock access
//!
//! Every threshold in the pipeline (staleness, max-wait, file span) is
//! evaluated against timestamps from a [`Clock`], so tests can drive time
//! explicitly instead of sleeping.

use chrono::Utc;

use crate::Timestamp;

/// Source of sample timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// UTC system time with a fixed accuracy flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    accuracy: u8,
}

impl SystemClock {
    pub fn new(synchronized: bool) -> Self {
        let accuracy =
            if synchronized { Timestamp::SYNCHRONIZED } else { Timestamp::UNSYNCHRONIZED };
        Self { accuracy }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = Utc::now();
        let seconds = u32::try_from(now.timestamp()).unwrap_or(0);
        let millis = now.timestamp_subsec_millis().min(999) as u16;
        Timestamp::new(seconds, millis).with_accuracy(self.accuracy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_reports_current_time() {
        let clock = SystemClock::new(true);
        let ts = clock.now();
        assert_eq!(ts.accuracy, Timestamp::SYNCHRONIZED);
        assert!(ts.millis < 1000);
        // 2020-01-01T00:00:00Z
        assert!(ts.seconds > 1_577_836_800);
    }
}
