//! Serde adapter for "absent vs null" timestamps in partial records; plain values
//! use `serde_with::rust::double_option`.
//!
//! Pair them with `#[serde(default, skip_serializing_if = "Option::is_none")]`: a missing
//! key stays `None`, an explicit `null` becomes `Some(None)`.

/// `Option<Option<OffsetDateTime>>` rendered as RFC 3339.
pub mod nullable_rfc3339 {
    use serde::{Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S>(value: &Option<Option<OffsetDateTime>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => time::serde::rfc3339::option::serialize(inner, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<OffsetDateTime>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        time::serde::rfc3339::option::deserialize(deserializer).map(Some)
    }
}
