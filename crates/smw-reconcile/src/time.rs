//! Timestamp rendering and lenient parsing.
//!
//! Reports render every timestamp as `YYYY-MM-DDTHH:MM:SS±HHMM`. Values are
//! held as `DateTime<Utc>` internally, so the rendered offset is always
//! `+0000`. Input timestamps without an explicit offset are taken as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Output format for all report timestamps.
pub const REPORT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Naive layouts accepted on input, interpreted as UTC.
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Render a timestamp in report format.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format(REPORT_TIME_FORMAT).to_string()
}

/// Parse a timestamp string, accepting RFC 3339, the report format, and
/// offset-less layouts (treated as UTC). A bare `YYYY-MM-DD` is midnight UTC.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, layout) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `serde(with = ...)` adapter for required report timestamps.
pub mod serde_ts {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&super::format_ts(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        super::parse_ts(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// `serde(with = ...)` adapter for optional report timestamps (`null` when absent).
pub mod serde_ts_opt {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, ser: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => ser.serialize_str(&super::format_ts(ts)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(de)? {
            None => Ok(None),
            Some(raw) => super::parse_ts(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_renders_with_plus_zero_offset() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_ts(&ts), "2024-01-02T03:04:05+0000");
    }

    #[test]
    fn offset_input_is_normalised_to_utc() {
        let got = parse_ts("2024-01-02T05:04:05+0200").unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn naive_input_is_taken_as_utc() {
        let got = parse_ts("2024-01-02 03:04:05").unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn solr_style_zulu_with_millis_parses() {
        let got = parse_ts("2024-01-02T03:04:05.250Z").unwrap();
        assert_eq!(got.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn bare_date_is_midnight() {
        let got = parse_ts("2024-01-02").unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_ts("").is_none());
        assert!(parse_ts("yesterday-ish").is_none());
    }
}
