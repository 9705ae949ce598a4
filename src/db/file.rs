//! JSON file backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::db::StoreBackend;
use crate::error::DatabaseError;
use crate::model::Store;

/// Persists the aggregate as one pretty-printed JSON document.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "store.json".into());
        name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }
}

/// Data must be on disk before the rename publishes it.
async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}

#[async_trait]
impl StoreBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn read(&self) -> Result<Store, DatabaseError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Store file missing, starting empty");
                return Ok(Store::default());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Store::default());
        }
        serde_json::from_str(&raw).map_err(|e| {
            DatabaseError::Serialization(format!("{}: {}", self.path.display(), e))
        })
    }

    async fn write(&self, store: &Store) -> Result<(), DatabaseError> {
        let body = serde_json::to_vec_pretty(store)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path();
        if let Err(e) = write_synced(&temp, &body).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::mappers::tests::sample_store;

    #[tokio::test]
    async fn missing_file_reads_as_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path().join("absent.json"));
        assert_eq!(backend.read().await.expect("read"), Store::default());
    }

    #[tokio::test]
    async fn write_then_read_returns_same_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path().join("nested/dir/store.json"));
        let store = sample_store();
        backend.write(&store).await.expect("write");
        assert_eq!(backend.read().await.expect("read"), store);
    }

    #[tokio::test]
    async fn write_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path().join("store.json"));
        backend.write(&sample_store()).await.expect("first");
        backend.write(&Store::default()).await.expect("second");

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["store.json".to_string()]);
    }

    #[tokio::test]
    async fn synced_write_replaces_previous_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ stale").expect("seed");

        write_synced(&path, b"{}").await.expect("synced write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "{}");

        let backend = FileBackend::new(&path);
        backend.write(&sample_store()).await.expect("write");
        let on_disk: Store =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(on_disk, sample_store());
    }

    #[tokio::test]
    async fn file_uses_camel_case_collection_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path().join("store.json"));
        backend.write(&sample_store()).await.expect("write");

        let raw = std::fs::read_to_string(backend.path()).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert!(value.get("statusUpdateComments").is_some());
        assert!(value.get("projectPropertiesByTeam").is_some());
        assert!(raw.contains('\n'), "document is pretty-printed");
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").expect("write");
        let err = FileBackend::new(&path).read().await.expect_err("corrupt");
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }

    #[tokio::test]
    async fn partial_document_fills_missing_collections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"issues":[{"id":"ISS-1","title":"t","date":"2026-01-01","status":"todo","teamId":"team-a"}]}"#)
            .expect("write");
        let store = FileBackend::new(&path).read().await.expect("read");
        assert_eq!(store.issues.len(), 1);
        assert!(store.teams.is_empty());
    }
}
