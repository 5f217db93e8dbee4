//! Bedtime window evaluation and the grayscale effect applied while it's active.

pub mod filter;

use anyhow::{Context, Result};
use chrono::{NaiveTime, Timelike};

use crate::settings::entities::BedtimeSettings;

/// Parses an `HH:MM` time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("Can't parse {value:?} as HH:MM"))
}

fn minutes_since_midnight(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Returns whether `now` falls inside the bedtime window. A window whose start is after its end
/// wraps over midnight. Seconds are ignored.
pub fn is_bedtime_active(now: NaiveTime, bedtime: &BedtimeSettings) -> Result<bool> {
    if !bedtime.enabled {
        return Ok(false);
    }
    let current = minutes_since_midnight(now);
    let start = minutes_since_midnight(parse_time_of_day(&bedtime.start_time)?);
    let end = minutes_since_midnight(parse_time_of_day(&bedtime.end_time)?);

    if start <= end {
        Ok(start <= current && current < end)
    } else {
        Ok(current >= start || current < end)
    }
}
