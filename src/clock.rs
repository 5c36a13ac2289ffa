//! Reference timezone and window boundaries.
//!
//! Every timestamp the service stores or compares is expressed in one
//! fixed IANA zone (America/New_York unless configured otherwise), never
//! the host's local zone. Daily stake windows roll over at local
//! midnight, weekly windows at local Monday 00:00.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::types::Timestamp;

pub const DEFAULT_TIMEZONE: &str = "America/New_York";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceZone {
    tz: Tz,
}

impl Default for ReferenceZone {
    fn default() -> Self {
        Self {
            tz: chrono_tz::America::New_York,
        }
    }
}

impl ReferenceZone {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Parse an IANA zone name such as `America/New_York`.
    pub fn from_name(name: &str) -> Result<Self> {
        let tz: Tz = name
            .parse()
            .map_err(|e| anyhow!("Unknown timezone {name}: {e}"))?;
        Ok(Self { tz })
    }

    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    /// Current instant in the reference zone.
    pub fn now(&self) -> Timestamp {
        self.stamp(Utc::now())
    }

    pub fn stamp(&self, instant: DateTime<Utc>) -> Timestamp {
        instant.with_timezone(&self.tz).fixed_offset()
    }

    /// Interpret a wall-clock time in the reference zone. Ambiguous times
    /// (DST fall-back) take the earlier instant; skipped times yield `None`.
    pub fn resolve_local(&self, naive: NaiveDateTime) -> Option<Timestamp> {
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.fixed_offset())
    }

    fn local_date(&self, ts: &Timestamp) -> NaiveDate {
        ts.with_timezone(&self.tz).date_naive()
    }

    fn midnight(&self, date: NaiveDate) -> Timestamp {
        let naive = date.and_time(NaiveTime::MIN);
        self.resolve_local(naive)
            .unwrap_or_else(|| self.stamp(Utc.from_utc_datetime(&naive)))
    }

    /// Start of the local day containing `ts`.
    pub fn day_start(&self, ts: &Timestamp) -> Timestamp {
        self.midnight(self.local_date(ts))
    }

    /// Start of the next local day after `ts`.
    pub fn next_day_start(&self, ts: &Timestamp) -> Timestamp {
        let date = self.local_date(ts);
        self.midnight(date.succ_opt().unwrap_or(date))
    }

    /// Start of the ISO week (Monday) containing `ts`.
    pub fn week_start(&self, ts: &Timestamp) -> Timestamp {
        let date = self.local_date(ts);
        let back = i64::from(date.weekday().num_days_from_monday());
        self.midnight(date - Duration::days(back))
    }

    /// Render a timestamp as local wall-clock text, e.g. `Oct 14, 2025 11:59 PM EDT`.
    pub fn display(&self, ts: &Timestamp) -> String {
        ts.with_timezone(&self.tz)
            .format("%b %d, %Y %I:%M %p %Z")
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
