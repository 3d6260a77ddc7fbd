use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Result, TriageError};

pub const NARRATIVE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Validates a lookback window such as `1h`, `30m` or `2d` and returns its length.
pub fn parse_lookback(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TriageError::InvalidArgument(
            "lookback must not be empty".to_string(),
        ));
    }
    humantime::parse_duration(trimmed)
        .map_err(|e| TriageError::InvalidArgument(format!("invalid lookback {trimmed}: {e}")))
}

pub fn micros_to_dt(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn format_micros(micros: i64) -> String {
    micros_to_dt(micros)
        .format(NARRATIVE_TIME_FORMAT)
        .to_string()
}
