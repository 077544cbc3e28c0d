use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_input_prefix")]
    pub input_prefix: String,
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    #[serde(default = "default_history_prefix")]
    pub history_prefix: String,
    /// HTTP push endpoint for chunk notifications. Publishing is skipped
    /// entirely when unset.
    #[serde(default)]
    pub queue_endpoint: Option<String>,
    #[serde(default = "default_csv_chunk_size")]
    pub csv_chunk_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_parallel_commit_size")]
    pub parallel_commit_size: usize,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_input_prefix() -> String {
    "input".to_string()
}

fn default_output_prefix() -> String {
    "output".to_string()
}

fn default_history_prefix() -> String {
    "history".to_string()
}

fn default_csv_chunk_size() -> usize {
    500
}

fn default_batch_size() -> usize {
    250
}

fn default_parallel_commit_size() -> usize {
    50
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl AppConfig {
    /// Config backed entirely by in-memory collaborators, for tests.
    pub fn test_memory() -> Self {
        Self {
            surrealdb_address: "mem://".into(),
            surrealdb_username: "test".into(),
            surrealdb_password: "test".into(),
            surrealdb_namespace: "test".into(),
            surrealdb_database: "test".into(),
            data_dir: "/tmp/unused".into(), // Ignored for memory storage
            storage: StorageKind::Memory,
            input_prefix: default_input_prefix(),
            output_prefix: default_output_prefix(),
            history_prefix: default_history_prefix(),
            queue_endpoint: None,
            csv_chunk_size: default_csv_chunk_size(),
            batch_size: default_batch_size(),
            parallel_commit_size: default_parallel_commit_size(),
        }
    }
}
