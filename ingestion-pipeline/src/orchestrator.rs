use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use common::{
    error::AppError,
    queue::MessageQueue,
    storage::{
        db::SurrealDbClient,
        store::{split_object_path, StorageManager},
        types::chunk_record::ChunkRecord,
        types::entry::RawEntry,
    },
    utils::config::AppConfig,
};
use csv_async::AsyncReaderBuilder;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    identity::ChunkIdentity,
    sink::{BatchSink, BatchSinkConfig},
    splitter::{split, SplitOptions},
};

/// Suffix inserted before the extension of a source file that was set aside
/// because an earlier round is still in flight.
pub const IGNORED_FILE_SUFFIX: &str = "-IGNORED";

fn ignored_name(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}{IGNORED_FILE_SUFFIX}.{ext}"),
        None => format!("{filename}{IGNORED_FILE_SUFFIX}"),
    }
}

/// True only when the suffix sits immediately before the extension, the
/// position `ignored_name` puts it in.
fn is_ignored_name(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((stem, _)) => stem.ends_with(IGNORED_FILE_SUFFIX),
        None => filename.ends_with(IGNORED_FILE_SUFFIX),
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub input_prefix: String,
    pub output_prefix: String,
    pub history_prefix: String,
    pub csv_chunk_size: usize,
    pub batch_size: usize,
    pub parallel_commit_size: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            input_prefix: config.input_prefix.clone(),
            output_prefix: config.output_prefix.clone(),
            history_prefix: config.history_prefix.clone(),
            csv_chunk_size: config.csv_chunk_size,
            batch_size: config.batch_size,
            parallel_commit_size: config.parallel_commit_size,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    /// A previous round is still pending; the source file was renamed and
    /// left in the input area.
    Ignored { renamed_to: String },
    Split { total_chunks: usize },
}

/// Message published for every chunk produced by a split.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkNotification {
    pub output_filename: String,
}

/// Message published when a chunk has been fully committed.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNotification {
    pub csv_filename: String,
    pub stored_by_item_count: u64,
}

pub struct Orchestrator {
    db: Arc<SurrealDbClient>,
    storage: StorageManager,
    queue: Option<Arc<dyn MessageQueue>>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        db: Arc<SurrealDbClient>,
        storage: StorageManager,
        queue: Option<Arc<dyn MessageQueue>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            db,
            storage,
            queue,
            settings,
        }
    }

    /// Run one ingestion round for a freshly arrived source file: move it to
    /// history, split it into chunk files, register a pending record per
    /// chunk and announce each chunk downstream.
    ///
    /// When any chunk of a previous round is still pending the new file is
    /// renamed in place and ignored, so overlapping loads never interleave.
    #[tracing::instrument(skip(self))]
    pub async fn ingest_round(&self, src_filename: &str) -> Result<RoundOutcome, AppError> {
        let pending = ChunkRecord::find_pending(&self.db).await?;
        if !pending.is_empty() {
            // Check-then-rename is not atomic; a chunk resolving in between
            // only delays this file until the next arrival.
            let renamed_to = ignored_name(src_filename);
            self.storage
                .rename(
                    &self.location(&self.settings.input_prefix, src_filename),
                    &self.location(&self.settings.input_prefix, &renamed_to),
                )
                .await?;
            warn!(
                %src_filename,
                pending = pending.len(),
                %renamed_to,
                "previous round still pending, ignoring source file"
            );
            return Ok(RoundOutcome::Ignored { renamed_to });
        }

        let history_location = self.location(&self.settings.history_prefix, src_filename);
        self.storage
            .rename(
                &self.location(&self.settings.input_prefix, src_filename),
                &history_location,
            )
            .await?;

        let timestamp_millis = Utc::now().timestamp_millis();
        let load_date = crate::identity::load_date_from_millis(timestamp_millis);

        let total_chunks = self
            .split_into_chunks(&history_location, timestamp_millis)
            .await?;

        let reader = self.storage.read_stream(&history_location).await?;
        let total_count = count_data_rows(reader).await?;

        let filenames: Vec<String> = (0..total_chunks)
            .map(|index| ChunkIdentity::new(timestamp_millis, index as u32).filename())
            .collect();
        ChunkRecord::create_pending_round(
            &self.db,
            filenames.clone(),
            &load_date,
            src_filename,
            total_count,
        )
        .await?;

        self.notify_chunks(&filenames).await?;

        info!(
            %src_filename,
            total_chunks,
            total_count,
            %load_date,
            "source file split and registered"
        );
        Ok(RoundOutcome::Split { total_chunks })
    }

    async fn split_into_chunks(
        &self,
        history_location: &str,
        timestamp_millis: i64,
    ) -> Result<usize, AppError> {
        let reader = self.storage.read_stream(history_location).await?;
        let options = SplitOptions::new(self.settings.csv_chunk_size);

        let result = split(reader, options, |index| {
            let filename = ChunkIdentity::new(timestamp_millis, index as u32).filename();
            let location = self.location(&self.settings.output_prefix, &filename);
            let writer = self.storage.write_stream(&location);
            async move { Ok(writer) }
        })
        .await?;

        Ok(result.total_chunks)
    }

    /// Commit one chunk file: parse its identity from the filename, stream
    /// its rows into the blocklist and resolve its record. The chunk file is
    /// deleted after a successful commit, a failed chunk stays in place for
    /// inspection.
    #[tracing::instrument(skip(self))]
    pub async fn process_chunk(&self, chunk_filename: &str) -> Result<u64, AppError> {
        let identity = match ChunkIdentity::parse(chunk_filename) {
            Ok(identity) => identity,
            Err(err) => {
                self.record_rejected(chunk_filename, None).await;
                return Err(err);
            }
        };
        let load_date = identity.load_date();

        match self.run_chunk_pipeline(chunk_filename, &load_date).await {
            Ok(stored_by_item_count) => {
                ChunkRecord::mark_fulfilled(&self.db, chunk_filename, stored_by_item_count).await?;
                self.notify_completion(chunk_filename, stored_by_item_count)
                    .await;
                info!(%chunk_filename, stored_by_item_count, "chunk committed");
                Ok(stored_by_item_count)
            }
            Err(err) => {
                self.record_rejected(chunk_filename, Some(load_date)).await;
                Err(err)
            }
        }
    }

    async fn run_chunk_pipeline(
        &self,
        chunk_filename: &str,
        load_date: &str,
    ) -> Result<u64, AppError> {
        let location = self.location(&self.settings.output_prefix, chunk_filename);
        let reader = self.storage.read_stream(&location).await?;
        let records = AsyncReaderBuilder::new()
            .create_deserializer(reader)
            .into_deserialize::<RawEntry>();
        let records = Box::pin(records.map(|record| record.map_err(AppError::from)));

        let capacity = (self.settings.batch_size * self.settings.parallel_commit_size).max(1);
        let (tx, mut rx) = mpsc::channel(capacity);
        let drain = tokio::spawn(async move {
            let mut forwarded = 0u64;
            while rx.recv().await.is_some() {
                forwarded += 1;
            }
            forwarded
        });

        let config = BatchSinkConfig::new(
            self.settings.batch_size,
            self.settings.parallel_commit_size,
            load_date.to_string(),
        );
        let stored = BatchSink::new(self.db.as_ref(), config)
            .run(records, tx)
            .await?;

        let forwarded = drain.await?;
        debug!(%chunk_filename, stored, forwarded, "chunk pipeline drained");

        self.storage.delete(&location).await?;
        Ok(stored)
    }

    /// One pass over the input and output areas: start a round for every new
    /// source file, then commit every unresolved chunk. Failures are logged
    /// per file so one bad file cannot stall the rest.
    pub async fn dispatch_once(&self) -> Result<(), AppError> {
        for filename in self.list_names(&self.settings.input_prefix).await? {
            if is_ignored_name(&filename) {
                continue;
            }
            if let Err(err) = self.ingest_round(&filename).await {
                error!(%filename, error = %err, "ingestion round failed");
            }
        }

        for filename in self.list_names(&self.settings.output_prefix).await? {
            let record: Option<ChunkRecord> = self.db.get_item(&filename).await?;
            if record.is_some_and(|record| record.state.is_terminal()) {
                continue;
            }
            if let Err(err) = self.process_chunk(&filename).await {
                error!(%filename, error = %err, "chunk processing failed");
            }
        }

        Ok(())
    }

    /// Announce every chunk of a freshly split round. A failed announcement
    /// fails the round; the pending records are already registered, so the
    /// chunks stay discoverable for a retry.
    async fn notify_chunks(&self, filenames: &[String]) -> Result<(), AppError> {
        let Some(queue) = &self.queue else {
            return Ok(());
        };

        for filename in filenames {
            let notification = ChunkNotification {
                output_filename: filename.clone(),
            };
            let message_id = publish_json(queue.as_ref(), &notification).await?;
            debug!(%filename, %message_id, "chunk announced");
        }

        Ok(())
    }

    async fn notify_completion(&self, chunk_filename: &str, stored_by_item_count: u64) {
        let Some(queue) = &self.queue else {
            return;
        };

        let notification = CompletionNotification {
            csv_filename: chunk_filename.to_string(),
            stored_by_item_count,
        };
        match publish_json(queue.as_ref(), &notification).await {
            Ok(message_id) => debug!(%chunk_filename, %message_id, "completion announced"),
            Err(err) => warn!(%chunk_filename, error = %err, "failed to announce completion"),
        }
    }

    async fn record_rejected(&self, chunk_filename: &str, load_date: Option<String>) {
        if let Err(err) = ChunkRecord::mark_rejected(&self.db, chunk_filename, load_date).await {
            warn!(%chunk_filename, error = %err, "failed to record chunk rejection");
        }
    }

    async fn list_names(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let metas = self.storage.list(Some(&format!("{prefix}/"))).await?;
        let mut names = Vec::with_capacity(metas.len());
        for meta in metas {
            let (_, name) = split_object_path(meta.location.as_ref())?;
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn location(&self, prefix: &str, filename: &str) -> String {
        format!("{prefix}/{filename}")
    }
}

async fn publish_json<T>(queue: &dyn MessageQueue, payload: &T) -> Result<String, AppError>
where
    T: Serialize,
{
    let bytes =
        serde_json::to_vec(payload).map_err(|err| AppError::BadPayload(err.to_string()))?;
    queue.publish(Bytes::from(bytes)).await
}

async fn count_data_rows<R>(reader: R) -> Result<u64, AppError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut records = AsyncReaderBuilder::new()
        .create_deserializer(reader)
        .into_deserialize::<RawEntry>();

    let mut count = 0u64;
    while let Some(record) = records.next().await {
        record?;
        count += 1;
    }
    Ok(count)
}
