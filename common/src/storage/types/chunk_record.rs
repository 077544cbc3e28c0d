use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;

use crate::{
    error::AppError,
    storage::db::{QueryOperator, SurrealDbClient},
};

use super::{deserialize_datetime, serialize_datetime, StoredObject};

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChunkState {
    #[serde(rename = "pending")]
    #[default]
    Pending,
    #[serde(rename = "fulfilled")]
    Fulfilled,
    #[serde(rename = "rejected")]
    Rejected,
}

impl ChunkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkState::Pending => "pending",
            ChunkState::Fulfilled => "fulfilled",
            ChunkState::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkState::Fulfilled | ChunkState::Rejected)
    }
}

#[derive(Debug, Clone, Copy)]
enum ChunkTransition {
    Fulfil,
    Reject,
}

impl ChunkTransition {
    fn as_str(&self) -> &'static str {
        match self {
            ChunkTransition::Fulfil => "fulfil",
            ChunkTransition::Reject => "reject",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: ChunkLifecycleMachine,
        initial: Pending,
        states: [Pending, Fulfilled, Rejected],
        events {
            fulfil {
                transition: { from: Pending, to: Fulfilled }
            }
            reject {
                transition: { from: Pending, to: Rejected }
            }
        }
    }

    pub(super) fn pending() -> ChunkLifecycleMachine<(), Pending> {
        ChunkLifecycleMachine::new(())
    }
}

fn invalid_transition(state: &ChunkState, event: ChunkTransition) -> AppError {
    AppError::InvalidArgument(format!(
        "Invalid chunk transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

fn compute_next_state(state: &ChunkState, event: ChunkTransition) -> Result<ChunkState, AppError> {
    use lifecycle::pending;
    match (state, event) {
        (ChunkState::Pending, ChunkTransition::Fulfil) => pending()
            .fulfil()
            .map(|_| ChunkState::Fulfilled)
            .map_err(|_| invalid_transition(state, event)),
        (ChunkState::Pending, ChunkTransition::Reject) => pending()
            .reject()
            .map(|_| ChunkState::Rejected)
            .map_err(|_| invalid_transition(state, event)),
        _ => Err(invalid_transition(state, event)),
    }
}

/// Per-chunk bookkeeping record. One row per chunk file, keyed by the chunk
/// filename, created when a source file is split and resolved when the chunk
/// is committed or fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub filename: String,
    pub state: ChunkState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub load_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub src_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stored_by_item_count: Option<u64>,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime",
        default
    )]
    pub created_at: DateTime<Utc>,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime",
        default
    )]
    pub updated_at: DateTime<Utc>,
}

impl StoredObject for ChunkRecord {
    fn table_name() -> &'static str {
        "chunk_stat"
    }

    fn key_field() -> &'static str {
        "filename"
    }

    fn get_id(&self) -> &str {
        &self.filename
    }
}

impl ChunkRecord {
    pub fn pending(
        filename: String,
        load_date: String,
        src_filename: String,
        total_count: u64,
    ) -> Self {
        let now = Utc::now();

        Self {
            filename,
            state: ChunkState::Pending,
            load_date: Some(load_date),
            src_filename: Some(src_filename),
            total_count: Some(total_count),
            stored_by_item_count: Some(0),
            created_at: now,
            updated_at: now,
        }
    }

    /// Register one pending record per chunk of a freshly split source file.
    pub async fn create_pending_round(
        db: &SurrealDbClient,
        filenames: Vec<String>,
        load_date: &str,
        src_filename: &str,
        total_count: u64,
    ) -> Result<(), AppError> {
        let records: Vec<ChunkRecord> = filenames
            .into_iter()
            .map(|filename| {
                Self::pending(
                    filename,
                    load_date.to_string(),
                    src_filename.to_string(),
                    total_count,
                )
            })
            .collect();

        db.set_large_bulk(records).await
    }

    /// All chunk records still awaiting commit.
    pub async fn find_pending(db: &SurrealDbClient) -> Result<Vec<ChunkRecord>, AppError> {
        db.query_by_field(
            "state",
            QueryOperator::Equals,
            ChunkState::Pending.as_str().to_string(),
        )
        .await
    }

    /// Transition a pending record to fulfilled, recording how many rows were
    /// committed. Guarded on the stored state so a concurrent resolution of
    /// the same chunk cannot overwrite a terminal record.
    pub async fn mark_fulfilled(
        db: &SurrealDbClient,
        filename: &str,
        stored_by_item_count: u64,
    ) -> Result<ChunkRecord, AppError> {
        let next = compute_next_state(&ChunkState::Pending, ChunkTransition::Fulfil)?;
        debug_assert_eq!(next, ChunkState::Fulfilled);

        const FULFIL_QUERY: &str = r#"
            UPDATE type::thing($table, $filename)
            SET state = $fulfilled,
                stored_by_item_count = $count,
                updated_at = $now
            WHERE state = $pending
            RETURN AFTER;
        "#;

        let now = Utc::now();
        let mut result = db
            .client
            .query(FULFIL_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("filename", filename.to_string()))
            .bind(("fulfilled", ChunkState::Fulfilled.as_str()))
            .bind(("pending", ChunkState::Pending.as_str()))
            .bind(("count", stored_by_item_count))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<ChunkRecord> = result.take(0)?;
        updated.ok_or_else(|| {
            AppError::InvalidArgument(format!("No pending chunk record for {filename}"))
        })
    }

    /// Record a chunk failure. Works even when no pending record exists, so a
    /// chunk with an unparseable filename still leaves a trace.
    pub async fn mark_rejected(
        db: &SurrealDbClient,
        filename: &str,
        load_date: Option<String>,
    ) -> Result<ChunkRecord, AppError> {
        let existing: Option<ChunkRecord> = db.get_item(filename).await?;

        let now = Utc::now();
        let record = match existing {
            Some(mut record) => {
                compute_next_state(&record.state, ChunkTransition::Reject)?;
                record.state = ChunkState::Rejected;
                record.load_date = load_date.or(record.load_date);
                record.updated_at = now;
                record
            }
            None => ChunkRecord {
                filename: filename.to_string(),
                state: ChunkState::Rejected,
                load_date,
                src_filename: None,
                total_count: None,
                stored_by_item_count: None,
                created_at: now,
                updated_at: now,
            },
        };

        db.set_item(record.clone()).await?;
        Ok(record)
    }
}
