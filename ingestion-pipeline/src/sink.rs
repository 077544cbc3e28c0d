use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::entry::{BlocklistEntry, RawEntry},
    },
};
use futures::{future::try_join_all, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::info;

/// Destination for batches of normalized records. Each call persists one
/// batch; calls for the same commit group run concurrently.
#[async_trait]
pub trait CommitTarget: Send + Sync {
    async fn commit(&self, records: Vec<BlocklistEntry>) -> Result<(), AppError>;
}

#[async_trait]
impl CommitTarget for SurrealDbClient {
    async fn commit(&self, records: Vec<BlocklistEntry>) -> Result<(), AppError> {
        self.set_bulk(records).await
    }
}

#[derive(Debug, Clone)]
pub struct BatchSinkConfig {
    pub batch_size: usize,
    pub parallel_commit_size: usize,
    pub load_date: String,
}

impl BatchSinkConfig {
    pub fn new(batch_size: usize, parallel_commit_size: usize, load_date: String) -> Self {
        Self {
            batch_size: batch_size.max(1),
            parallel_commit_size: parallel_commit_size.max(1),
            load_date,
        }
    }
}

/// Consumes a stream of raw rows, normalizes them, and commits them to the
/// target in batches. Full batches are staged until `parallel_commit_size`
/// of them have accumulated, then committed concurrently. Staged records are
/// forwarded downstream at hand-off time, so a record in a batch that is
/// still accumulating when the run aborts is never observed downstream.
pub struct BatchSink<'a> {
    target: &'a dyn CommitTarget,
    config: BatchSinkConfig,
    batch: Vec<BlocklistEntry>,
    staged: Vec<Vec<BlocklistEntry>>,
    stored_records: u64,
}

impl<'a> BatchSink<'a> {
    pub fn new(target: &'a dyn CommitTarget, config: BatchSinkConfig) -> Self {
        Self {
            target,
            config,
            batch: Vec::new(),
            staged: Vec::new(),
            stored_records: 0,
        }
    }

    /// Drain the record stream into the target. Returns the number of
    /// records committed. A commit failure aborts the run; records already
    /// committed stay committed, which is safe because commits are upserts.
    pub async fn run<S>(
        mut self,
        mut records: S,
        output: mpsc::Sender<BlocklistEntry>,
    ) -> Result<u64, AppError>
    where
        S: Stream<Item = Result<RawEntry, AppError>> + Unpin,
    {
        while let Some(record) = records.next().await {
            self.accept(record?, &output).await?;
        }
        self.finish(&output).await
    }

    async fn accept(
        &mut self,
        record: RawEntry,
        output: &mpsc::Sender<BlocklistEntry>,
    ) -> Result<(), AppError> {
        let entry = record.sanitize(&self.config.load_date);
        self.batch.push(entry);

        if self.batch.len() >= self.config.batch_size {
            self.stage_batch(output).await?;
        }
        if self.staged.len() >= self.config.parallel_commit_size {
            self.commit_group().await?;
        }

        Ok(())
    }

    async fn finish(mut self, output: &mpsc::Sender<BlocklistEntry>) -> Result<u64, AppError> {
        if !self.batch.is_empty() {
            self.stage_batch(output).await?;
        }
        if !self.staged.is_empty() {
            self.commit_group().await?;
        }

        Ok(self.stored_records)
    }

    async fn stage_batch(&mut self, output: &mpsc::Sender<BlocklistEntry>) -> Result<(), AppError> {
        let batch = std::mem::take(&mut self.batch);
        for entry in &batch {
            output
                .send(entry.clone())
                .await
                .map_err(|_| AppError::Processing("Downstream consumer dropped".to_string()))?;
        }
        self.staged.push(batch);
        Ok(())
    }

    async fn commit_group(&mut self) -> Result<(), AppError> {
        let group = std::mem::take(&mut self.staged);
        let record_count: u64 = group.iter().map(|batch| batch.len() as u64).sum();

        try_join_all(group.into_iter().map(|batch| self.target.commit(batch)))
            .await
            .map_err(|err| AppError::Commit(err.to_string()))?;

        self.stored_records += record_count;
        info!(
            committed = record_count,
            total = self.stored_records,
            "committed record group"
        );
        Ok(())
    }
}
