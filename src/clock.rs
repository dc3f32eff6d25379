//! Clock
//!
//! Date eligibility and voting windows are evaluated in the campaign's
//! configured timezone, so every component reads time through this trait.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// Source of the current instant plus the configured local offset
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Configured local offset
    fn offset(&self) -> FixedOffset;

    /// Current wall-clock time in the configured timezone
    fn local_now(&self) -> NaiveDateTime {
        self.now().with_timezone(&self.offset()).naive_local()
    }

    /// Current calendar day in the configured timezone
    fn today(&self) -> NaiveDate {
        self.local_now().date()
    }
}

/// Wall clock with a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Manually driven clock for deterministic tests
#[cfg(test)]
pub struct ManualClock {
    offset: FixedOffset,
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    /// Create a clock reading `local` in the given offset
    pub fn at_local(offset: FixedOffset, local: NaiveDateTime) -> Self {
        Self {
            offset,
            now: std::sync::Mutex::new(Self::to_utc(offset, local)),
        }
    }

    /// Jump to a new local wall-clock time
    pub fn set_local(&self, local: NaiveDateTime) {
        *self.now.lock().unwrap() = Self::to_utc(self.offset, local);
    }

    fn to_utc(offset: FixedOffset, local: NaiveDateTime) -> DateTime<Utc> {
        let utc = local - chrono::Duration::seconds(offset.local_minus_utc() as i64);
        DateTime::from_naive_utc_and_offset(utc, Utc)
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
