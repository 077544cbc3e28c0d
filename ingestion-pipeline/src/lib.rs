#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod identity;
pub mod orchestrator;
pub mod sink;
pub mod splitter;

pub use orchestrator::{Orchestrator, OrchestratorSettings, RoundOutcome};

use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, warn};
use uuid::Uuid;

/// Poll the input and output areas until shutdown, running one dispatch pass
/// per iteration.
pub async fn run_worker_loop(
    orchestrator: Arc<Orchestrator>,
) -> Result<(), Box<dyn std::error::Error>> {
    let worker_id = format!("ingestion-worker-{}", Uuid::new_v4());
    let idle_backoff = Duration::from_millis(500);

    loop {
        match orchestrator.dispatch_once().await {
            Ok(()) => {
                sleep(idle_backoff).await;
            }
            Err(err) => {
                error!(%worker_id, error = %err, "dispatch pass failed");
                warn!("Backing off for 1s after dispatch error");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
