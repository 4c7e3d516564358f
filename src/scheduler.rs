//! Delayed program start.
//!
//! A start request may carry a wall-clock time of day (`"HH:MM"`).  The
//! request resolves to the next occurrence of that time: today if it is
//! still ahead, otherwise the same time tomorrow.  The tick loop polls
//! [`ScheduledStart::is_due`] while idle and performs the start itself.

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigFault;

/// Parse a 24-hour `"HH:MM"` string.
///
/// Single-digit hours (`"7:05"`) are accepted; minutes must have two digits.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime, ConfigFault> {
    let (h, m) = s.trim().split_once(':').ok_or(ConfigFault::InvalidTimeString)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(ConfigFault::InvalidTimeString);
    }
    let hour: u32 = h.parse().map_err(|_| ConfigFault::InvalidTimeString)?;
    let minute: u32 = m.parse().map_err(|_| ConfigFault::InvalidTimeString)?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or(ConfigFault::InvalidTimeString)
}

/// Next wall-clock instant at `time` on or after `now`.
///
/// A time equal to `now` (to the minute) counts as already passed.
pub fn next_occurrence(now: NaiveDateTime, time: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(time);
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// A pending delayed start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledStart {
    pub at: NaiveDateTime,
    pub stage_index: usize,
}

impl ScheduledStart {
    /// Resolve `"HH:MM"` against `now`.
    pub fn from_time_string(s: &str, stage_index: usize, now: NaiveDateTime) -> Result<Self, ConfigFault> {
        let at = next_occurrence(now, parse_hhmm(s)?);
        info!("Scheduled start at {} (stage {})", at, stage_index);
        Ok(Self { at, stage_index })
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now >= self.at
    }

    /// Seconds until the start fires, zero once due.
    pub fn secs_until(&self, now: NaiveDateTime) -> i64 {
        (self.at - now).num_seconds().max(0)
    }
}
