//! Interval strings for `agg`: `300ms`, `1.5h`, `1m30s`.
//!
//! The grammar is a sequence of decimal numbers, each with an optional
//! fraction and a mandatory unit suffix. The bare string `0` is also accepted.

use std::time::Duration;
use thiserror::Error;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

/// Fraction digits beyond this cannot change the result at nanosecond
/// resolution for any unit and are ignored.
const MAX_FRACTION_DIGITS: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration '{0}'")]
    Invalid(String),
    #[error("missing unit in duration '{0}'")]
    MissingUnit(String),
    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit { unit: String, input: String },
    #[error("negative duration '{0}'")]
    Negative(String),
    #[error("duration '{0}' is too large")]
    Overflow(String),
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        // micro sign (U+00B5) and Greek mu (U+03BC)
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(NANOS_PER_MIN),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}

/// Parse an interval string such as `1h30m` or `2.5s`.
///
/// Negative values are rejected; the result must fit in `u64` nanoseconds.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let invalid = || DurationError::Invalid(input.to_string());

    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(DurationError::Empty);
    }
    if let Some(stripped) = rest.strip_prefix('-') {
        return if stripped == "0" {
            Ok(Duration::ZERO)
        } else {
            Err(DurationError::Negative(input.to_string()))
        };
    }
    rest = rest.strip_prefix('+').unwrap_or(rest);
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        // integer part
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, after_int) = rest.split_at(int_len);

        // optional fraction
        let (frac_digits, after_number) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(invalid());
        }

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, next) = after_number.split_at(unit_len);
        if unit.is_empty() {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let overflow = || DurationError::Overflow(input.to_string());
        let whole = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse::<u128>().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

        let kept = &frac_digits[..frac_digits.len().min(MAX_FRACTION_DIGITS as usize)];
        if !kept.is_empty() {
            let frac = kept.parse::<u128>().map_err(|_| invalid())?;
            let denom = 10u128.pow(kept.len() as u32);
            nanos = nanos.checked_add(frac * scale / denom).ok_or_else(overflow)?;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
        if total > u128::from(u64::MAX) {
            return Err(overflow());
        }
        rest = next;
    }

    let nanos = u64::try_from(total).map_err(|_| DurationError::Overflow(input.to_string()))?;
    Ok(Duration::from_nanos(nanos))
}

/// Render a duration the way it would be written: `1h0m0s`, `1m30s`, `1.5s`,
/// `500ms`, `0s`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_MICRO {
        return format!("{}ns", nanos);
    }
    if nanos < NANOS_PER_MILLI {
        return format!("{}\u{b5}s", decimal(nanos, 3));
    }
    if nanos < NANOS_PER_SEC {
        return format!("{}ms", decimal(nanos, 6));
    }

    let hours = nanos / NANOS_PER_HOUR;
    let minutes = (nanos % NANOS_PER_HOUR) / NANOS_PER_MIN;
    let seconds = decimal(nanos % NANOS_PER_MIN, 9);

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// `value / 10^digits` with trailing fraction zeros dropped
fn decimal(value: u128, digits: u32) -> String {
    let divisor = 10u128.pow(digits);
    let (whole, frac) = (value / divisor, value % divisor);
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = digits as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
