use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod chunk_record;
pub mod entry;

/// Implemented by every record type persisted in SurrealDB. Records are
/// addressed by a natural key rather than a generated id, so repeated loads
/// of the same data overwrite in place.
pub trait StoredObject: Serialize + for<'de> Deserialize<'de> {
    fn table_name() -> &'static str;
    /// Name of the field holding the natural key, used for bulk upserts.
    fn key_field() -> &'static str;
    fn get_id(&self) -> &str;
}

pub fn serialize_datetime<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    Into::<surrealdb::sql::Datetime>::into(*date).serialize(serializer)
}

pub fn deserialize_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let dt = surrealdb::sql::Datetime::deserialize(deserializer)?;
    Ok(DateTime::<Utc>::from(dt))
}
