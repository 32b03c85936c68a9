//! GMT timestamps in the `YYYY-MM-DD HH:MM:SS` form used on the wire
//!
//! Use with `#[serde(with = "newsnet_core::wp_date")]`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp in wire form
pub fn format(value: &DateTime<Utc>) -> String {
    value.format(FORMAT).to_string()
}

/// Parse a wire timestamp, also accepting RFC 3339
pub fn parse(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(value))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {raw}")))
}
