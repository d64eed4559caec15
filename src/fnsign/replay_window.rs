use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::debug;

pub const TIMESTAMP_HEADER: &str = "x-feiniubus-date";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
pub const DEFAULT_TOLERANCE_SECS: u64 = 5 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("timestamp must be YYYYMMDDTHHMMSSZ")]
    Malformed,
    #[error("timestamp is {skew_secs}s away from server time, tolerance is {tolerance_secs}s")]
    OutOfWindow { skew_secs: i64, tolerance_secs: i64 },
}

/// Parses the fixed-width UTC signing timestamp, e.g. `20240101T120000Z`.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 16
        && bytes[8] == b'T'
        && bytes[15] == b'Z'
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[9..15].iter().all(u8::is_ascii_digit);

    if !well_formed {
        return Err(TimestampError::Malformed);
    }

    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            debug!("timestamp {:?} rejected: {}", value, e);
            TimestampError::Malformed
        })
}

pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Bounds the clock skew accepted between signer and verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayWindow {
    tolerance: Duration,
}

impl ReplayWindow {
    pub fn new(tolerance: std::time::Duration) -> Self {
        Self {
            tolerance: Duration::from_std(tolerance).unwrap_or(Duration::MAX),
        }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Accepts timestamps within `tolerance` of `now` in either direction, edges included.
    pub fn check(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), TimestampError> {
        let skew = now.signed_duration_since(timestamp);
        if skew.abs() > self.tolerance {
            return Err(TimestampError::OutOfWindow {
                skew_secs: skew.num_seconds(),
                tolerance_secs: self.tolerance.num_seconds(),
            });
        }

        Ok(())
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(DEFAULT_TOLERANCE_SECS))
    }
}
