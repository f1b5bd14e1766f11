//! Lenient timestamp decoding for server payloads.
//!
//! The generation server writes `datetime.isoformat()` values, which
//! carry no offset (`2024-05-01T12:00:00.123456`). Other deployments
//! emit proper RFC 3339. Both forms are accepted; naive values are
//! taken to be UTC.

use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

use crate::types::Timestamp;

/// Parse an RFC 3339 or offset-less ISO-8601 datetime.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, chrono::ParseError> {
    let raw = raw.trim();
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(|_| rfc_err),
    }
}

/// `#[serde(with = "timestamp::optional")]` adapter for `Option<Timestamp>`.
///
/// Missing fields and `null` both decode to `None`.
pub mod optional {
    use super::*;

    pub fn serialize<S>(value: &Option<Timestamp>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| parse_timestamp(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
