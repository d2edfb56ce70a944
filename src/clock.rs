//! Civil clock: the one place where "now" is turned into the institution's
//! local date and time. Stores and state machines only ever see civil values.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// A moment expressed in the institution's fixed zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilNow {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl CivilNow {
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        Self {
            date: dt.date(),
            // stored times carry whole seconds
            time: dt.time().with_nanosecond(0).unwrap_or(dt.time()),
        }
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

pub trait CivilClock: Send + Sync {
    fn now(&self) -> CivilNow;
}

/// Wall clock normalized to a fixed IANA zone.
#[derive(Debug, Clone)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl CivilClock for SystemClock {
    fn now(&self) -> CivilNow {
        CivilNow::from_datetime(Utc::now().with_timezone(&self.tz).naive_local())
    }
}

#[cfg(test)]
pub use fixed::FixedClock;
