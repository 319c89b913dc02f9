//! Exchange session gate.
//!
//! Decides whether the exchange is in regular trading hours so the main
//! loop can skip cycles (and poll more slowly) while it is closed. Hours
//! are exchange-local, expressed through a fixed UTC offset.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::RadarError;

/// Loaded from `[scanner.session]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Off: scan around the clock.
    pub enabled: bool,
    /// Exchange-local offset from UTC (Istanbul is +180, no DST).
    pub utc_offset_minutes: i32,
    /// Local hour the session opens (inclusive).
    pub open_hour: u32,
    /// Local hour the session closes (inclusive, on the hour).
    pub close_hour: u32,
    pub weekdays: Vec<Weekday>,
    /// Polling period while closed.
    pub closed_poll_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            utc_offset_minutes: 180,
            open_hour: 10,
            close_hour: 18,
            weekdays: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            closed_poll_secs: 300,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), RadarError> {
        if self.utc_offset().is_none() {
            return Err(RadarError::Config(format!(
                "session: utc_offset_minutes {} out of range",
                self.utc_offset_minutes
            )));
        }
        if !(self.open_hour < self.close_hour && self.close_hour <= 23) {
            return Err(RadarError::Config(
                "session: need open_hour < close_hour <= 23".into(),
            ));
        }
        if self.enabled && self.weekdays.is_empty() {
            return Err(RadarError::Config("session: no trading weekdays".into()));
        }
        if self.closed_poll_secs == 0 {
            return Err(RadarError::Config("session: closed_poll_secs must be > 0".into()));
        }
        Ok(())
    }

    fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
    }

    /// Whether `now` falls inside trading hours. Always true when disabled.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }
        let offset = self.utc_offset().unwrap_or_else(|| Utc.fix());
        let local = now.with_timezone(&offset);
        if !self.weekdays.contains(&local.weekday()) {
            return false;
        }
        let (Some(open), Some(close)) = (
            NaiveTime::from_hms_opt(self.open_hour, 0, 0),
            NaiveTime::from_hms_opt(self.close_hour, 0, 0),
        ) else {
            return false;
        };
        let time = local.time();
        open <= time && time <= close
    }

    /// How long to wait before the next tick: the scan interval while
    /// open, `closed_poll_secs` while closed.
    pub fn poll_period(&self, now: DateTime<Utc>, scan_interval: Duration) -> Duration {
        if self.is_open(now) {
            scan_interval
        } else {
            Duration::from_secs(self.closed_poll_secs)
        }
    }
}
