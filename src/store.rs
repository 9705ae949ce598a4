//! Cached access to the aggregate.
//!
//! `StoreHandle` is created once at startup and shared through the web
//! state. Reads hand out the cached `Arc<Store>`; writes go through
//! [`StoreHandle::mutate`], which serializes writers inside this process.
//! Separate processes sharing one backend still overwrite each other.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::db::StoreBackend;
use crate::error::DatabaseError;
use crate::model::Store;

pub struct StoreHandle {
    backend: Arc<dyn StoreBackend>,
    cache: RwLock<Option<Arc<Store>>>,
    writer: Mutex<()>,
}

impl StoreHandle {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            cache: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The cached aggregate, loaded and normalized on first use.
    ///
    /// Without an intervening save, repeated calls return the same `Arc`.
    pub async fn get_store(&self) -> Result<Arc<Store>, DatabaseError> {
        if let Some(store) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(store));
        }

        let mut slot = self.cache.write().await;
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }
        let loaded = Arc::new(self.backend.read().await?.normalized());
        tracing::debug!(
            backend = self.backend.name(),
            teams = loaded.teams.len(),
            issues = loaded.issues.len(),
            "Loaded store"
        );
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Replace the cache, then persist the whole aggregate.
    ///
    /// A backend failure is returned but the cache keeps the new value.
    pub async fn save_store(&self, store: Store) -> Result<Arc<Store>, DatabaseError> {
        let _writer = self.writer.lock().await;
        let store = Arc::new(store);
        *self.cache.write().await = Some(Arc::clone(&store));
        self.backend.write(&store).await?;
        Ok(store)
    }

    /// Read-modify-write under the writer lock.
    ///
    /// `f` runs against a clone of the cached aggregate. If it fails, nothing
    /// changes. If persisting fails, the previous snapshot is restored.
    pub async fn mutate<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Store) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let _writer = self.writer.lock().await;
        let current = self.get_store().await?;
        let mut next = Store::clone(&current);
        let output = f(&mut next)?;

        let next = Arc::new(next);
        *self.cache.write().await = Some(Arc::clone(&next));
        if let Err(e) = self.backend.write(&next).await {
            tracing::error!(backend = self.backend.name(), error = %e, "Failed to persist store");
            *self.cache.write().await = Some(current);
            return Err(e.into());
        }
        Ok(output)
    }

    /// Drop the cache so the next read goes to the backend.
    pub async fn reload(&self) {
        *self.cache.write().await = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ServiceError;
    use crate::model::{Issue, ProjectProperties, Team};

    /// In-memory backend that counts calls and can be told to fail writes.
    #[derive(Default)]
    pub(crate) struct MemoryBackend {
        pub stored: std::sync::Mutex<Store>,
        pub reads: AtomicUsize,
        pub writes: AtomicUsize,
        pub fail_writes: AtomicBool,
    }

    impl MemoryBackend {
        pub(crate) fn with(store: Store) -> Arc<Self> {
            Arc::new(Self {
                stored: std::sync::Mutex::new(store),
                ..Self::default()
            })
        }

        pub(crate) fn snapshot(&self) -> Store {
            self.stored.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl StoreBackend for MemoryBackend {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn read(&self) -> Result<Store, DatabaseError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot())
        }

        async fn write(&self, store: &Store) -> Result<(), DatabaseError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(DatabaseError::Io("disk full".into()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.stored.lock().expect("lock") = store.clone();
            Ok(())
        }
    }

    fn issue(id: &str) -> Issue {
        Issue {
            id: id.to_string(),
            title: format!("issue {id}"),
            assignee_id: None,
            assignee_name: None,
            date: "2026-01-01".into(),
            status: "todo".into(),
            team_id: "team-a".into(),
            project_id: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn get_store_is_idempotent_without_saves() {
        let backend = MemoryBackend::with(Store::default());
        let handle = StoreHandle::new(backend.clone());

        let first = handle.get_store().await.expect("first");
        let second = handle.get_store().await.expect("second");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loaded_store_is_normalized() {
        let mut raw = Store::default();
        raw.project_properties_by_team
            .insert("  ".into(), ProjectProperties::default_for_team(""));
        let handle = StoreHandle::new(MemoryBackend::with(raw));
        let store = handle.get_store().await.expect("load");
        assert!(store.project_properties_by_team.is_empty());
    }

    #[tokio::test]
    async fn save_store_replaces_cache_and_persists() {
        let backend = MemoryBackend::with(Store::default());
        let handle = StoreHandle::new(backend.clone());

        let mut store = Store::default();
        store.issues.push(issue("ISS-1"));
        let saved = handle.save_store(store.clone()).await.expect("save");

        let cached = handle.get_store().await.expect("get");
        assert!(Arc::ptr_eq(&saved, &cached));
        assert_eq!(backend.snapshot(), store);
        assert_eq!(backend.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn save_store_propagates_backend_errors() {
        let backend = MemoryBackend::with(Store::default());
        backend.fail_writes.store(true, Ordering::SeqCst);
        let handle = StoreHandle::new(backend);
        let err = handle
            .save_store(Store::default())
            .await
            .expect_err("write fails");
        assert!(err.to_string().contains("disk full"));
    }

    #[tokio::test]
    async fn failed_mutation_leaves_cache_and_backend_untouched() {
        let backend = MemoryBackend::with(Store::default());
        let handle = StoreHandle::new(backend.clone());
        let before = handle.get_store().await.expect("load");

        let result: Result<(), ServiceError> = handle
            .mutate(|store| {
                store.issues.push(issue("ISS-1"));
                Err(ServiceError::Validation("title is required".into()))
            })
            .await;
        assert!(result.is_err());

        let after = handle.get_store().await.expect("reload");
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_persist_restores_previous_snapshot() {
        let backend = MemoryBackend::with(Store::default());
        let handle = StoreHandle::new(backend.clone());
        let before = handle.get_store().await.expect("load");

        backend.fail_writes.store(true, Ordering::SeqCst);
        let result: Result<(), DatabaseError> = handle
            .mutate(|store| {
                store.issues.push(issue("ISS-1"));
                Ok(())
            })
            .await;
        assert!(result.is_err());
        assert!(Arc::ptr_eq(&before, &handle.get_store().await.expect("get")));
    }

    #[tokio::test]
    async fn concurrent_mutations_are_serialized() {
        let backend = MemoryBackend::with(Store::default());
        let handle = Arc::new(StoreHandle::new(backend.clone()));

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move {
                    handle
                        .mutate(|store| {
                            store.issues.push(issue(&format!("ISS-{i}")));
                            Ok::<_, DatabaseError>(())
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("join").expect("mutate");
        }

        assert_eq!(handle.get_store().await.expect("get").issues.len(), 20);
        assert_eq!(backend.snapshot().issues.len(), 20);
        assert_eq!(backend.writes.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn mutate_returns_closure_output() {
        let handle = StoreHandle::new(MemoryBackend::with(Store::default()));
        let team_id = handle
            .mutate(|store| {
                store.teams.push(Team {
                    id: "team-a".into(),
                    name: "A".into(),
                    project_id: None,
                    member_ids: Vec::new(),
                    workspace_id: None,
                });
                Ok::<_, DatabaseError>(store.teams[0].id.clone())
            })
            .await
            .expect("mutate");
        assert_eq!(team_id, "team-a");
    }

    #[tokio::test]
    async fn reload_reads_backend_again() {
        let backend = MemoryBackend::with(Store::default());
        let handle = StoreHandle::new(backend.clone());
        handle.get_store().await.expect("first");

        backend.stored.lock().expect("lock").issues.push(issue("ISS-7"));
        handle.reload().await;
        let store = handle.get_store().await.expect("second");
        assert_eq!(store.issues.len(), 1);
        assert_eq!(backend.reads.load(Ordering::SeqCst), 2);
    }
}
