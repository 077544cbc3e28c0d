use std::sync::Arc;

use common::{
    queue::{HttpQueueClient, MessageQueue},
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::get_config,
};
use ingestion_pipeline::{run_worker_loop, Orchestrator, OrchestratorSettings};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let storage = StorageManager::new(&config).await?;

    let queue: Option<Arc<dyn MessageQueue>> = match &config.queue_endpoint {
        Some(endpoint) => Some(Arc::new(HttpQueueClient::new(endpoint)?)),
        None => None,
    };
    if queue.is_none() {
        info!("no queue endpoint configured, chunk announcements disabled");
    }

    let settings = OrchestratorSettings::from_config(&config);
    let orchestrator = Arc::new(Orchestrator::new(db, storage, queue, settings));

    info!("starting ingestion worker");
    run_worker_loop(orchestrator).await
}
