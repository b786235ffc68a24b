//! Duration text format used by the document and the environment.
//!
//! `250ms`, `30s`, `5m`, `1h`, and compounds such as `1m30s`. A unit is
//! always required; a bare number is rejected so `timeout: 30` is never
//! silently read as milliseconds or seconds.

use std::time::Duration;

const UNITS: &[(&str, u64)] = &[
    ("ms", 1),
    ("s", 1_000),
    ("m", 60_000),
    ("h", 3_600_000),
];

/// Parse a duration string into a [`Duration`] with millisecond resolution.
pub fn parse(input: &str) -> Result<Duration, String> {
    let text = input.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!(
            "duration '{}' needs a unit (ms, s, m, h), e.g. '{}s'",
            text, text
        ));
    }

    let mut total_ms: u64 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(format!("invalid duration '{}'", text));
        }
        let (number, tail) = rest.split_at(digits);
        let value: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration '{}'", text))?;

        let unit_len = tail.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        let (unit, tail) = tail.split_at(unit_len);
        let factor = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, factor)| *factor)
            .ok_or_else(|| format!("unknown duration unit '{}' in '{}'", unit, text))?;

        total_ms = value
            .checked_mul(factor)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| format!("duration '{}' is too large", text))?;
        rest = tail;
    }

    Ok(Duration::from_millis(total_ms))
}

/// Format a duration in the same syntax [`parse`] accepts, largest units first.
pub fn format(duration: Duration) -> String {
    let mut ms = duration.as_millis() as u64;
    if ms == 0 {
        return "0ms".to_string();
    }

    let mut out = String::new();
    for (unit, factor) in UNITS.iter().rev() {
        if ms >= *factor {
            let count = ms / factor;
            ms %= factor;
            out.push_str(&format!("{}{}", count, unit));
        }
    }
    out
}

/// Serde adapter storing a `Duration` as its text form.
pub mod serde_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(parse("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse(" 1h5m ").unwrap(), Duration::from_secs(3900));
    }

    #[test]
    fn test_parse_rejects_bare_number() {
        let err = parse("30").unwrap_err();
        assert!(err.contains("needs a unit"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("fast").is_err());
        assert!(parse("10 parsecs").is_err());
        assert!(parse("10d").is_err());
        assert!(parse("s10").is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format(Duration::from_millis(250)), "250ms");
        assert_eq!(format(Duration::from_secs(30)), "30s");
        assert_eq!(format(Duration::from_secs(90)), "1m30s");
        assert_eq!(format(Duration::from_millis(1500)), "1s500ms");
        assert_eq!(format(Duration::ZERO), "0ms");
    }
}
