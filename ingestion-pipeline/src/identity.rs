use chrono::{DateTime, SecondsFormat, Utc};
use common::error::AppError;

pub const CHUNK_PREFIX: &str = "output";
pub const CHUNK_EXTENSION: &str = ".csv";

/// Identity of a chunk file, carried entirely in its filename so a chunk can
/// be processed with no lookup: `output-<timestamp millis>-<index>.csv`.
/// All chunks of one split share the timestamp, which doubles as the load
/// date of every row they contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkIdentity {
    pub timestamp_millis: i64,
    pub index: u32,
}

impl ChunkIdentity {
    pub fn new(timestamp_millis: i64, index: u32) -> Self {
        Self {
            timestamp_millis,
            index,
        }
    }

    pub fn filename(&self) -> String {
        format!(
            "{CHUNK_PREFIX}-{}-{}{CHUNK_EXTENSION}",
            self.timestamp_millis, self.index
        )
    }

    pub fn parse(filename: &str) -> Result<Self, AppError> {
        let segments: Vec<&str> = filename.split('-').collect();
        if segments.len() != 3 {
            return Err(AppError::MalformedIdentity(filename.to_string()));
        }

        let timestamp_millis = segments[1]
            .parse::<i64>()
            .map_err(|_| AppError::MalformedIdentity(filename.to_string()))?;
        let index = segments[2]
            .strip_suffix(CHUNK_EXTENSION)
            .ok_or_else(|| AppError::MalformedIdentity(filename.to_string()))?
            .parse::<u32>()
            .map_err(|_| AppError::MalformedIdentity(filename.to_string()))?;

        Ok(Self {
            timestamp_millis,
            index,
        })
    }

    /// The load date shared by every row of this chunk, as an RFC 3339
    /// timestamp with millisecond precision.
    pub fn load_date(&self) -> String {
        load_date_from_millis(self.timestamp_millis)
    }
}

pub fn load_date_from_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
