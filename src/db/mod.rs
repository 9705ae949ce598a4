//! Persistence layer.
//!
//! The aggregate is persisted through a `StoreBackend` chosen once at
//! startup. Three implementations exist:
//!
//! - `file`: the whole `Store` as one JSON document
//! - `postgres` (feature-gated): `deadpool-postgres` + `tokio-postgres`
//! - `libsql` (feature-gated): libSQL for embedded or remote-replica use
//!
//! The SQL backends share the table catalogue in [`schema`] and also
//! implement [`ApiKeyStore`].

pub mod file;
pub mod mappers;
pub mod schema;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "libsql")]
pub mod libsql;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::error::DatabaseError;
use crate::model::Store;

/// Reads and writes the whole aggregate.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Short name for logs and the health endpoint.
    fn name(&self) -> &'static str;

    async fn read(&self) -> Result<Store, DatabaseError>;

    async fn write(&self, store: &Store) -> Result<(), DatabaseError>;
}

/// A stored API key. Only the hash of the secret is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Leading characters of the token, shown in listings.
    pub prefix: String,
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn insert_api_key(&self, record: &ApiKeyRecord) -> Result<(), DatabaseError>;

    /// Active keys owned by `user_id`, newest first.
    async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKeyRecord>, DatabaseError>;

    /// Active keys sharing a display prefix.
    async fn find_api_keys_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<ApiKeyRecord>, DatabaseError>;

    /// Revoke a key owned by `user_id`. Returns false if no active key matched.
    async fn revoke_api_key(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError>;
}

/// Backends built from configuration.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn StoreBackend>,
    pub api_keys: Option<Arc<dyn ApiKeyStore>>,
}

/// Build the configured backend, running schema migrations for SQL stores.
pub async fn connect_from_config(config: &DatabaseConfig) -> Result<Backends, DatabaseError> {
    match config.backend {
        DatabaseBackend::File => Ok(Backends {
            store: Arc::new(file::FileBackend::new(&config.data_file)),
            api_keys: None,
        }),
        #[cfg(feature = "libsql")]
        DatabaseBackend::LibSql => {
            use secrecy::ExposeSecret as _;

            let default_path = crate::config::default_libsql_path();
            let db_path = config.libsql_path.as_deref().unwrap_or(&default_path);

            let backend = if let Some(ref url) = config.libsql_url {
                let token = config.libsql_auth_token.as_ref().ok_or_else(|| {
                    DatabaseError::Pool(
                        "LIBSQL_AUTH_TOKEN required when LIBSQL_URL is set".to_string(),
                    )
                })?;
                libsql::LibSqlBackend::new_remote_replica(db_path, url, token.expose_secret())
                    .await?
            } else {
                libsql::LibSqlBackend::new_local(db_path).await?
            };
            backend.run_migrations().await?;
            let backend = Arc::new(backend);
            Ok(Backends {
                store: backend.clone(),
                api_keys: Some(backend),
            })
        }
        #[cfg(feature = "postgres")]
        DatabaseBackend::Postgres => {
            let backend = postgres::PgBackend::new(config).await?;
            backend.run_migrations().await?;
            let backend = Arc::new(backend);
            Ok(Backends {
                store: backend.clone(),
                api_keys: Some(backend),
            })
        }
        #[allow(unreachable_patterns)]
        other => Err(DatabaseError::Pool(format!(
            "{} backend is not compiled in. Enable the '{}' feature.",
            other.as_str(),
            other.as_str()
        ))),
    }
}
