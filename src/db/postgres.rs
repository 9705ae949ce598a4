//! PostgreSQL backend.
//!
//! Reads issue one query per table concurrently, each on its own pooled
//! connection. Writes run in a single transaction: upsert everything in
//! dependency order, then delete stale keys in reverse order.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{GenericClient, Pool, PoolConfig, Runtime};
use tokio_postgres::NoTls;
use tokio_postgres::types::ToSql;

use crate::config::DatabaseConfig;
use crate::db::mappers::{store_from_tables, store_to_tables};
use crate::db::schema::{
    self, Cell, ColumnType, Dialect, RowObject, TABLES, TableRows, TableSpec, TableWrite,
};
use crate::db::{ApiKeyRecord, ApiKeyStore, StoreBackend};
use crate::error::DatabaseError;
use crate::model::Store;

type BoxedParam = Box<dyn ToSql + Sync + Send>;

const API_KEYS_DDL: &str = "
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    prefix TEXT NOT NULL,
    key_hash TEXT NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL,
    revoked_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id);
CREATE INDEX IF NOT EXISTS idx_api_keys_prefix ON api_keys(prefix);
";

pub struct PgBackend {
    pool: Pool,
}

impl PgBackend {
    /// Create a pool from configuration and check that it can connect.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = config
            .url()
            .ok_or_else(|| DatabaseError::Pool("DATABASE_URL is not set".to_string()))?;

        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some(url.to_string());
        cfg.pool = Some(PoolConfig::new(config.pool_size.max(1)));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        // Fail fast on bad credentials instead of on the first request.
        let _ = pool.get().await?;
        Ok(Self { pool })
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let client = self.pool.get().await?;
        let mut ddl = String::new();
        for table in TABLES {
            ddl.push_str(&schema::create_table_sql(table, Dialect::Postgres));
            ddl.push_str(";\n");
        }
        ddl.push_str(API_KEYS_DDL);
        client.batch_execute(&ddl).await?;
        tracing::debug!("Postgres schema ready");
        Ok(())
    }

    async fn read_table(&self, table: &'static TableSpec) -> Result<Vec<RowObject>, DatabaseError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(&schema::select_sql(table)).await?;
        let rows = client.query(&stmt, &[]).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = Vec::with_capacity(table.columns.len());
            for (idx, column) in table.columns.iter().enumerate() {
                cells.push(read_cell(&row, idx, column.ty)?);
            }
            out.push(schema::decode_row(table, cells));
        }
        Ok(out)
    }
}

fn read_cell(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: ColumnType,
) -> Result<Cell, DatabaseError> {
    let cell = match ty {
        ColumnType::Text => row
            .try_get::<_, Option<String>>(idx)?
            .map_or(Cell::Null, Cell::Text),
        ColumnType::Integer => row
            .try_get::<_, Option<i64>>(idx)?
            .map_or(Cell::Null, Cell::Integer),
        ColumnType::Boolean => row
            .try_get::<_, Option<bool>>(idx)?
            .map_or(Cell::Null, Cell::Boolean),
        ColumnType::Json => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map_or(Cell::Null, Cell::Json),
    };
    Ok(cell)
}

/// Typed parameter for a cell. Nulls keep the column's type so the server
/// can infer the placeholder.
fn to_param(ty: ColumnType, cell: Cell) -> BoxedParam {
    match (ty, cell) {
        (ColumnType::Text, Cell::Text(text)) => Box::new(Some(text)),
        (ColumnType::Text, _) => Box::new(None::<String>),
        (ColumnType::Integer, Cell::Integer(n)) => Box::new(Some(n)),
        (ColumnType::Integer, _) => Box::new(None::<i64>),
        (ColumnType::Boolean, Cell::Boolean(b)) => Box::new(Some(b)),
        (ColumnType::Boolean, _) => Box::new(None::<bool>),
        (ColumnType::Json, Cell::Json(value)) => Box::new(Some(value)),
        (ColumnType::Json, _) => Box::new(None::<serde_json::Value>),
    }
}

fn as_refs(params: &[BoxedParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

async fn existing_keys<C>(
    client: &C,
    table: &'static TableSpec,
) -> Result<HashSet<String>, DatabaseError>
where
    C: GenericClient + Sync,
{
    let rows = client.query(&schema::select_keys_sql(table), &[]).await?;
    rows.iter()
        .map(|row| row.try_get::<_, String>(0).map_err(DatabaseError::from))
        .collect()
}

async fn apply_upserts<C>(client: &C, write: &TableWrite<'_>) -> Result<(), DatabaseError>
where
    C: GenericClient + Sync,
{
    if write.upserts.is_empty() {
        return Ok(());
    }
    let stmt = client
        .prepare(&schema::upsert_sql(write.table, Dialect::Postgres))
        .await?;
    for (position, row) in write.upserts.iter().enumerate() {
        let mut params: Vec<BoxedParam> = schema::encode_row(write.table, row)?
            .into_iter()
            .zip(write.table.columns)
            .map(|(cell, column)| to_param(column.ty, cell))
            .collect();
        params.push(Box::new(position as i64));
        client.execute(&stmt, &as_refs(&params)).await?;
    }
    Ok(())
}

async fn apply_deletes<C>(client: &C, write: &TableWrite<'_>) -> Result<(), DatabaseError>
where
    C: GenericClient + Sync,
{
    if write.deletes.is_empty() {
        return Ok(());
    }
    let stmt = client
        .prepare(&schema::delete_sql(write.table, Dialect::Postgres))
        .await?;
    for key in &write.deletes {
        client.execute(&stmt, &[key]).await?;
    }
    Ok(())
}

#[async_trait]
impl StoreBackend for PgBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn read(&self) -> Result<Store, DatabaseError> {
        let results =
            futures::future::try_join_all(TABLES.map(|table| self.read_table(table))).await?;
        let tables: TableRows = TABLES
            .iter()
            .map(|table| table.name)
            .zip(results)
            .collect();
        store_from_tables(tables)
    }

    async fn write(&self, store: &Store) -> Result<(), DatabaseError> {
        let rows = store_to_tables(store)?;
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let mut existing = HashMap::new();
        for table in TABLES {
            existing.insert(table.name, existing_keys(&tx, table).await?);
        }
        let plan = schema::plan_write(&existing, &rows)?;

        for write in &plan {
            apply_upserts(&tx, write).await?;
        }
        for write in plan.iter().rev() {
            apply_deletes(&tx, write).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn row_to_api_key(row: &tokio_postgres::Row) -> Result<ApiKeyRecord, DatabaseError> {
    Ok(ApiKeyRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        prefix: row.try_get("prefix")?,
        key_hash: row.try_get("key_hash")?,
        created_at: row.try_get::<_, DateTime<Utc>>("created_at")?,
        revoked_at: row.try_get::<_, Option<DateTime<Utc>>>("revoked_at")?,
    })
}

#[async_trait]
impl ApiKeyStore for PgBackend {
    async fn insert_api_key(&self, record: &ApiKeyRecord) -> Result<(), DatabaseError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO api_keys (id, user_id, name, prefix, key_hash, created_at, revoked_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &record.id,
                    &record.user_id,
                    &record.name,
                    &record.prefix,
                    &record.key_hash,
                    &record.created_at,
                    &record.revoked_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKeyRecord>, DatabaseError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, user_id, name, prefix, key_hash, created_at, revoked_at \
                 FROM api_keys WHERE user_id = $1 AND revoked_at IS NULL \
                 ORDER BY created_at DESC, id",
                &[&user_id],
            )
            .await?;
        rows.iter().map(row_to_api_key).collect()
    }

    async fn find_api_keys_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<ApiKeyRecord>, DatabaseError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, user_id, name, prefix, key_hash, created_at, revoked_at \
                 FROM api_keys WHERE prefix = $1 AND revoked_at IS NULL",
                &[&prefix],
            )
            .await?;
        rows.iter().map(row_to_api_key).collect()
    }

    async fn revoke_api_key(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError> {
        let client = self.pool.get().await?;
        let changed = client
            .execute(
                "UPDATE api_keys SET revoked_at = NOW() \
                 WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL",
                &[&id, &user_id],
            )
            .await?;
        Ok(changed > 0)
    }
}
