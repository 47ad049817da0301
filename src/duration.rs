//! Human-readable durations like "30m", "6h", "2w" for configuration files
//! and CLI flags.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;
const SECS_PER_WEEK: u64 = 7 * SECS_PER_DAY;

/// Units from largest to smallest; `format_duration` picks the first that divides evenly.
const UNITS: [(char, u64); 5] = [
    ('w', SECS_PER_WEEK),
    ('d', SECS_PER_DAY),
    ('h', SECS_PER_HOUR),
    ('m', SECS_PER_MINUTE),
    ('s', 1),
];

/// Parse a duration string like "2w", "14d", "6h", "30m", "45s".
///
/// The input is case-insensitive and surrounding whitespace is ignored.
///
/// ```
/// use pricekeep::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("6h").unwrap(), Duration::from_secs(6 * 60 * 60));
/// assert_eq!(parse_duration("2w").unwrap(), Duration::from_secs(14 * 24 * 60 * 60));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let unit = s.chars().last().context("Duration is empty")?;
    let multiplier = UNITS
        .iter()
        .find(|(u, _)| *u == unit)
        .map(|(_, secs)| *secs)
        .with_context(|| format!("Duration {s:?} must end with w, d, h, m, or s"))?;

    let num: u64 = s[..s.len() - unit.len_utf8()]
        .parse()
        .with_context(|| format!("Invalid number in duration {s:?}"))?;
    let secs = num
        .checked_mul(multiplier)
        .context("Duration is too large")?;

    Ok(Duration::from_secs(secs))
}

/// Format a duration using the largest unit that divides it evenly.
///
/// ```
/// use pricekeep::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(6 * 60 * 60)), "6h");
/// assert_eq!(format_duration(Duration::from_secs(90)), "90s");
/// ```
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    for (unit, size) in UNITS {
        if secs % size == 0 {
            return format!("{}{unit}", secs / size);
        }
    }
    format!("{secs}s")
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

/// Serde serializer writing the same compact form `deserialize_duration` reads.
pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}
