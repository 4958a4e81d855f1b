//! Listing timestamps as they arrive from the upstream
//!
//! The catalog is not consistent about `createdAt`: it may be epoch
//! milliseconds, a numeric string, RFC 3339, or a plain `YYYY-MM-DD HH:MM:SS`
//! in UTC. Decoding never fails; unusable values simply have no millis.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Raw `createdAt` value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Epoch milliseconds
    Millis(i64),
    /// Textual form, parsed on demand
    Text(String),
    /// Anything else the upstream sent
    Other(serde_json::Value),
}

impl Timestamp {
    /// Epoch milliseconds, if the value is usable
    pub fn to_millis(&self) -> Option<i64> {
        match self {
            Timestamp::Millis(ms) => Some(*ms),
            Timestamp::Text(text) => parse_text(text),
            Timestamp::Other(value) => value
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f as i64),
        }
    }
}

impl From<i64> for Timestamp {
    fn from(ms: i64) -> Self {
        Timestamp::Millis(ms)
    }
}

impl From<&str> for Timestamp {
    fn from(text: &str) -> Self {
        Timestamp::Text(text.to_string())
    }
}

fn parse_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ms) = text.parse::<i64>() {
        return Some(ms);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc().timestamp_millis());
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_passthrough() {
        assert_eq!(Timestamp::Millis(100).to_millis(), Some(100));
    }

    #[test]
    fn test_numeric_string() {
        assert_eq!(Timestamp::from("1700000000000").to_millis(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(
            Timestamp::from("1970-01-01T00:00:01+00:00").to_millis(),
            Some(1000)
        );
    }

    #[test]
    fn test_plain_datetime_is_utc() {
        assert_eq!(
            Timestamp::from("1970-01-02 00:00:00").to_millis(),
            Some(86_400_000)
        );
        assert_eq!(Timestamp::from("1970-01-02").to_millis(), Some(86_400_000));
    }

    #[test]
    fn test_unusable_values() {
        assert_eq!(Timestamp::from("").to_millis(), None);
        assert_eq!(Timestamp::from("yesterday").to_millis(), None);
        assert_eq!(Timestamp::Other(serde_json::json!(true)).to_millis(), None);
    }

    #[test]
    fn test_decodes_mixed_json() {
        let values: Vec<Timestamp> =
            serde_json::from_str(r#"[100, "2024-05-01 08:00:00", 1.5, null]"#).unwrap();
        assert_eq!(values[0], Timestamp::Millis(100));
        assert!(matches!(values[1], Timestamp::Text(_)));
        assert_eq!(values[2].to_millis(), Some(1));
        assert_eq!(values[3].to_millis(), None);
    }
}
