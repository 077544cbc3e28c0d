use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result as AnyResult};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use object_store::buffered::BufWriter;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Storage manager with persistent state and proper lifecycle management.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    local_base: Option<PathBuf>,
}

impl StorageManager {
    /// Create a new StorageManager with the specified configuration.
    ///
    /// This method validates the configuration and creates the appropriate
    /// storage backend with proper initialization.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let (store, local_base) = create_storage_backend(cfg).await?;

        Ok(Self { store, local_base })
    }

    /// Create a StorageManager with a custom storage backend.
    ///
    /// This method is useful for testing scenarios where you want to inject
    /// a specific storage backend.
    pub fn with_backend(store: DynStore) -> Self {
        Self {
            store,
            local_base: None,
        }
    }

    /// Access the resolved local base directory when using the local backend.
    pub fn local_base_path(&self) -> Option<&Path> {
        self.local_base.as_deref()
    }

    /// Store bytes at the specified location.
    pub async fn put(&self, location: &str, data: Bytes) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| ())
    }

    /// Retrieve bytes from the specified location.
    ///
    /// Returns the full contents buffered in memory.
    pub async fn get(&self, location: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    /// Get a streaming handle for large objects.
    ///
    /// Returns a fallible stream of Bytes chunks suitable for large file processing.
    pub async fn get_stream(
        &self,
        location: &str,
    ) -> object_store::Result<BoxStream<'static, object_store::Result<Bytes>>> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        Ok(result.into_stream())
    }

    /// Open an object as a buffered async reader, for line or record oriented
    /// consumption without loading the whole object into memory.
    pub async fn read_stream(
        &self,
        location: &str,
    ) -> object_store::Result<impl AsyncBufRead + Send + Unpin> {
        let stream = self.get_stream(location).await?;
        Ok(StreamReader::new(stream.map_err(std::io::Error::other)))
    }

    /// Open a buffered async writer for the specified location. The object
    /// becomes visible once the writer is shut down.
    pub fn write_stream(&self, location: &str) -> BufWriter {
        BufWriter::new(Arc::clone(&self.store), ObjPath::from(location))
    }

    /// Delete the object at the specified location.
    pub async fn delete(&self, location: &str) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        self.store.delete(&path).await
    }

    /// Move an object to a new location, overwriting any existing object.
    pub async fn rename(&self, from: &str, to: &str) -> object_store::Result<()> {
        self.store
            .rename(&ObjPath::from(from), &ObjPath::from(to))
            .await
    }

    /// Copy an object to a new location, leaving the source in place.
    pub async fn copy(&self, from: &str, to: &str) -> object_store::Result<()> {
        self.store
            .copy(&ObjPath::from(from), &ObjPath::from(to))
            .await
    }

    /// List all objects below the specified prefix.
    pub async fn list(
        &self,
        prefix: Option<&str>,
    ) -> object_store::Result<Vec<object_store::ObjectMeta>> {
        let prefix_path = prefix.map(ObjPath::from);
        self.store.list(prefix_path.as_ref()).try_collect().await
    }

    /// Check if an object exists at the specified location.
    pub async fn exists(&self, location: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(location);
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }
}

/// Create a storage backend based on configuration.
///
/// This factory function handles the creation and initialization of different
/// storage backends with proper error handling and validation.
async fn create_storage_backend(
    cfg: &AppConfig,
) -> object_store::Result<(DynStore, Option<PathBuf>)> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            tracing::debug!(base = %base.display(), "using local storage backend");
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await.map_err(|e| {
                    object_store::Error::Generic {
                        store: "LocalFileSystem",
                        source: e.into(),
                    }
                })?;
            }
            let store = LocalFileSystem::new_with_prefix(base.clone())?;
            Ok((Arc::new(store), Some(base)))
        }
        StorageKind::Memory => {
            let store = InMemory::new();
            Ok((Arc::new(store), None))
        }
    }
}

/// Resolve the absolute base directory used for local storage from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}

/// Split a logical object location `"a/b/c"` into `("a/b", "c")`.
pub fn split_object_path(path: &str) -> AnyResult<(String, String)> {
    if let Some((p, f)) = path.rsplit_once('/') {
        return Ok((p.to_string(), f.to_string()));
    }
    Err(anyhow!("Object path has no separator: {path}"))
}

#[cfg(any(test, feature = "test-utils"))]
impl StorageManager {
    /// Create a StorageManager backed by an in-memory store, for testing.
    pub fn memory() -> Self {
        Self::with_backend(Arc::new(InMemory::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_storage_manager_memory_basic_operations() {
        let storage = StorageManager::memory();
        assert!(storage.local_base_path().is_none());

        let location = "test/data/file.txt";
        let data = b"test data for storage manager";

        // Test put and get
        storage
            .put(location, Bytes::from(data.to_vec()))
            .await
            .expect("put");
        let retrieved = storage.get(location).await.expect("get");
        assert_eq!(retrieved.as_ref(), data);

        // Test exists
        assert!(storage.exists(location).await.expect("exists check"));

        // Test delete
        storage.delete(location).await.expect("delete");
        assert!(!storage
            .exists(location)
            .await
            .expect("exists check after delete"));
    }

    #[tokio::test]
    async fn test_storage_manager_local_basic_operations() {
        let base = format!("/tmp/ingest_storage_test_{}", Uuid::new_v4());
        let mut cfg = AppConfig::test_memory();
        cfg.storage = StorageKind::Local;
        cfg.data_dir = base.clone();

        let storage = StorageManager::new(&cfg)
            .await
            .expect("create storage manager");
        let resolved_base = storage
            .local_base_path()
            .expect("resolved base dir")
            .to_path_buf();
        assert_eq!(resolved_base, PathBuf::from(&base));

        let location = "input/file.csv";
        let data = b"email,eligible\na@example.com,true\n";

        storage
            .put(location, Bytes::from(data.to_vec()))
            .await
            .expect("put");
        let retrieved = storage.get(location).await.expect("get");
        assert_eq!(retrieved.as_ref(), data);

        // Clean up
        let _ = tokio::fs::remove_dir_all(&base).await;
    }

    #[tokio::test]
    async fn test_storage_manager_rename() {
        let storage = StorageManager::memory();
        let data = b"content to move";

        storage
            .put("input/upload.csv", Bytes::from(data.to_vec()))
            .await
            .expect("put");
        storage
            .rename("input/upload.csv", "history/upload.csv")
            .await
            .expect("rename");

        assert!(!storage
            .exists("input/upload.csv")
            .await
            .expect("source gone"));
        let moved = storage.get("history/upload.csv").await.expect("get moved");
        assert_eq!(moved.as_ref(), data);

        storage
            .copy("history/upload.csv", "backup/upload.csv")
            .await
            .expect("copy");
        assert!(storage
            .exists("history/upload.csv")
            .await
            .expect("source kept"));
        let copied = storage.get("backup/upload.csv").await.expect("get copy");
        assert_eq!(copied.as_ref(), data);
    }

    #[tokio::test]
    async fn test_storage_manager_list_operations() {
        let storage = StorageManager::memory();

        let files = vec![
            ("dir1/file1.txt", b"content1"),
            ("dir1/file2.txt", b"content2"),
            ("dir2/file3.txt", b"content3"),
        ];

        for (location, data) in &files {
            storage
                .put(location, Bytes::from(data.to_vec()))
                .await
                .expect("put");
        }

        let all_files = storage.list(None).await.expect("list all");
        assert_eq!(all_files.len(), 3);

        let dir1_files = storage.list(Some("dir1/")).await.expect("list dir1");
        assert_eq!(dir1_files.len(), 2);

        let empty_files = storage
            .list(Some("nonexistent/"))
            .await
            .expect("list nonexistent");
        assert_eq!(empty_files.len(), 0);
    }

    #[tokio::test]
    async fn test_storage_manager_stream_operations() {
        let storage = StorageManager::memory();

        let location = "stream/test.bin";
        let content = vec![42u8; 1024 * 64]; // 64KB of data

        storage
            .put(location, Bytes::from(content.clone()))
            .await
            .expect("put large data");

        let mut stream = storage.get_stream(location).await.expect("get stream");
        let mut collected = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.expect("stream chunk");
            collected.extend_from_slice(&chunk);
        }

        assert_eq!(collected, content);
    }

    #[tokio::test]
    async fn test_read_and_write_streams_round_trip() {
        let storage = StorageManager::memory();
        let location = "output/chunk.csv";

        let mut writer = storage.write_stream(location);
        writer.write_all(b"header\n").await.expect("write header");
        writer.write_all(b"row1\nrow2\n").await.expect("write rows");
        writer.shutdown().await.expect("finish write");

        let mut reader = storage.read_stream(location).await.expect("read stream");
        let mut lines = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line).await.expect("read line");
            if read == 0 {
                break;
            }
            lines.push(line.trim_end().to_string());
        }

        assert_eq!(lines, vec!["header", "row1", "row2"]);
    }

    #[tokio::test]
    async fn test_split_object_path() {
        let (prefix, name) = split_object_path("output/output-1-0.csv").expect("split");
        assert_eq!(prefix, "output");
        assert_eq!(name, "output-1-0.csv");

        assert!(split_object_path("no-separator").is_err());
    }
}
