//! Human interval strings (`"30m"`, `"6h"`, `"1d"`, `"1y"`) to [`Duration`].

use std::time::Duration;

use crate::error::{Result, TaskopsError};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
/// Years are flat 365-day spans; no calendar awareness.
const YEAR: u64 = 365 * DAY;

/// Parse `<positive integer><unit>` where unit is one of `m`, `h`, `d`, `y`.
///
/// The unit is matched case-insensitively. Anything else (empty input, a
/// missing or unknown unit, a zero/signed/non-numeric prefix, or a value that
/// overflows) is rejected with [`TaskopsError::InvalidInterval`].
pub fn parse_interval(input: &str) -> Result<Duration> {
    let invalid = || TaskopsError::InvalidInterval {
        input: input.to_string(),
    };

    let unit = input.chars().last().ok_or_else(invalid)?;
    let digits = &input[..input.len() - unit.len_utf8()];

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(invalid());
    }

    let unit_secs = match unit.to_ascii_lowercase() {
        'm' => MINUTE,
        'h' => HOUR,
        'd' => DAY,
        'y' => YEAR,
        _ => return Err(invalid()),
    };

    // Keep the result representable as a chrono::Duration as well, since fire
    // times are computed in chrono.
    let secs = value
        .checked_mul(unit_secs)
        .filter(|s| *s <= i64::MAX as u64 / 1_000)
        .ok_or_else(invalid)?;

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: &str) -> u64 {
        parse_interval(s).unwrap().as_secs()
    }

    #[test]
    fn each_unit() {
        assert_eq!(secs("1m"), 60);
        assert_eq!(secs("2h"), 7_200);
        assert_eq!(secs("3d"), 259_200);
        assert_eq!(secs("1y"), 31_536_000);
    }

    #[test]
    fn multi_digit_prefix_and_uppercase_unit() {
        assert_eq!(secs("90m"), 5_400);
        assert_eq!(secs("12H"), 43_200);
    }

    #[test]
    fn rejects_unknown_or_missing_unit() {
        for bad in ["5x", "10", "m", "5s", "1w"] {
            let err = parse_interval(bad).unwrap_err();
            assert!(
                matches!(err, TaskopsError::InvalidInterval { ref input } if input == bad),
                "{bad} -> {err:?}"
            );
        }
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            parse_interval(""),
            Err(TaskopsError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_prefix() {
        for bad in ["0m", "-1h", "+1h", "1.5h", " 1h", "1 h"] {
            assert!(parse_interval(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_interval("99999999999999999999y").is_err());
        assert!(parse_interval("999999999999999y").is_err());
    }

    #[test]
    fn multibyte_suffix_does_not_panic() {
        assert!(parse_interval("5é").is_err());
        assert!(parse_interval("é").is_err());
    }
}
