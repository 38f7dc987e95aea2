//! Timestamp unit normalization.
//!
//! The upstream feed does not declare the unit of its timestamps, so the unit
//! is inferred from magnitude. Values are first brought to milliseconds and
//! then truncated to whole epoch seconds.

use crate::error::{AppError, Result};

/// 2000-01-01T00:00:00Z in epoch seconds.
const YEAR_2000_SECONDS: f64 = 946_684_800.0;
/// 2000-01-01T00:00:00Z in epoch milliseconds.
const YEAR_2000_MILLIS: f64 = 946_684_800_000.0;
/// Anything above this is microseconds (or larger), not milliseconds.
const MICROS_THRESHOLD: f64 = 100_000_000_000_000.0;
/// Digit count above which a value is taken to be nanoseconds.
const NANOS_MIN_DIGITS: usize = 17;

fn digit_count(value: f64) -> usize {
    format!("{:.0}", value.abs().trunc()).len()
}

/// Bring a raw timestamp of unknown unit to epoch milliseconds.
///
/// Rules, in order:
/// 1. more than 17 digits: nanoseconds, divide by 1e6 (and by 1e3 again if still oversized)
/// 2. above the microsecond threshold: divide by 1e3
/// 3. between year 2000 in seconds and year 2000 in milliseconds: seconds, multiply by 1e3
/// 4. re-apply rule 2 once more as a final clamp
pub fn normalize_millis(raw: f64) -> f64 {
    let mut value = raw;

    if digit_count(value) > NANOS_MIN_DIGITS {
        value /= 1e6;
        if value > MICROS_THRESHOLD {
            value /= 1e3;
        }
    }

    if value > MICROS_THRESHOLD {
        value /= 1e3;
    }

    if value < YEAR_2000_MILLIS && value > YEAR_2000_SECONDS {
        value *= 1e3;
    }

    if value > MICROS_THRESHOLD {
        value /= 1e3;
    }

    value
}

/// Normalize a raw timestamp to epoch seconds.
///
/// `NaN`, infinite and non-positive results are rejected; the caller drops
/// the event rather than substituting wall-clock time.
pub fn normalize(raw: f64) -> Result<i64> {
    if !raw.is_finite() {
        return Err(AppError::InvalidTimestamp(format!("non-finite value {}", raw)));
    }

    let millis = normalize_millis(raw);
    let seconds = (millis / 1000.0).floor();

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(AppError::InvalidTimestamp(format!(
            "{} normalized to non-positive seconds",
            raw
        )));
    }

    Ok(seconds as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECS: i64 = 1_755_623_700;

    #[test]
    fn test_seconds_input() {
        assert_eq!(normalize(1_755_623_700.0).unwrap(), SECS);
    }

    #[test]
    fn test_millis_input() {
        assert_eq!(normalize(1_755_623_700_123.0).unwrap(), SECS);
    }

    #[test]
    fn test_micros_input_uses_division_rule() {
        // 16 digits
        assert_eq!(normalize_millis(1_755_623_700_000_000.0), 1_755_623_700_000.0);
        assert_eq!(normalize(1_755_623_700_000_000.0).unwrap(), SECS);
    }

    #[test]
    fn test_nanos_input() {
        assert_eq!(normalize(1_755_623_700_123_456_789.0).unwrap(), SECS);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(normalize(f64::NAN).is_err());
        assert!(normalize(f64::INFINITY).is_err());
        assert!(normalize(0.0).is_err());
        assert!(normalize(-5.0).is_err());
        // Below year 2000 in seconds: left as milliseconds, truncates to zero seconds
        assert!(normalize(100.0).is_err());
    }

    #[test]
    fn test_digit_count() {
        assert_eq!(digit_count(0.5), 1);
        assert_eq!(digit_count(9.0), 1);
        assert_eq!(digit_count(10.0), 2);
        assert_eq!(digit_count(1_755_623_700_000_000.0), 16);
    }
}
