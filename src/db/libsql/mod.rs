//! libSQL backend.
//!
//! Same table layout as Postgres, with JSON columns stored as TEXT and
//! booleans as INTEGER. Works against a local file or a Turso remote
//! replica.

mod api_keys;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::params::Params;
use libsql::{Builder, Connection, Database as LibSqlDatabase, Value};

use crate::db::StoreBackend;
use crate::db::mappers::{store_from_tables, store_to_tables};
use crate::db::schema::{
    self, Cell, ColumnType, Dialect, RowObject, TABLES, TableRows, TableSpec, TableWrite,
};
use crate::error::DatabaseError;
use crate::model::Store;

const API_KEYS_DDL: &str = "\
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    prefix TEXT NOT NULL,
    key_hash TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    revoked_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id);
CREATE INDEX IF NOT EXISTS idx_api_keys_prefix ON api_keys(prefix);
";

pub struct LibSqlBackend {
    db: LibSqlDatabase,
}

impl LibSqlBackend {
    /// Open (or create) a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to open {}: {e}", path.display())))?;
        Ok(Self { db })
    }

    /// Open an embedded replica that syncs with a remote libSQL server.
    pub async fn new_remote_replica(
        path: &Path,
        url: &str,
        auth_token: &str,
    ) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db = Builder::new_remote_replica(path, url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to open replica {url}: {e}")))?;
        Ok(Self { db })
    }

    pub async fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;
        // PRAGMA busy_timeout returns a row, so it must go through query().
        conn.query("PRAGMA busy_timeout = 5000", ()).await?;
        Ok(conn)
    }

    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        let mut ddl = String::new();
        for table in TABLES {
            ddl.push_str(&schema::create_table_sql(table, Dialect::Sqlite));
            ddl.push_str(";\n");
        }
        ddl.push_str(API_KEYS_DDL);
        conn.execute_batch(&ddl).await?;
        tracing::debug!("libSQL schema ready");
        Ok(())
    }

    async fn read_table(
        conn: &Connection,
        table: &'static TableSpec,
    ) -> Result<Vec<RowObject>, DatabaseError> {
        let mut rows = conn.query(&schema::select_sql(table), ()).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let mut cells = Vec::with_capacity(table.columns.len());
            for (idx, column) in table.columns.iter().enumerate() {
                let value = row.get_value(idx as i32)?;
                cells.push(cell_from_value(table, column.name, column.ty, value)?);
            }
            out.push(schema::decode_row(table, cells));
        }
        Ok(out)
    }

    async fn existing_keys(
        conn: &Connection,
        table: &'static TableSpec,
    ) -> Result<HashSet<String>, DatabaseError> {
        let mut rows = conn.query(&schema::select_keys_sql(table), ()).await?;
        let mut keys = HashSet::new();
        while let Some(row) = rows.next().await? {
            keys.insert(get_text(&row, 0)?);
        }
        Ok(keys)
    }

    async fn apply_upserts(conn: &Connection, write: &TableWrite<'_>) -> Result<(), DatabaseError> {
        if write.upserts.is_empty() {
            return Ok(());
        }
        let sql = schema::upsert_sql(write.table, Dialect::Sqlite);
        for (position, row) in write.upserts.iter().enumerate() {
            let mut values: Vec<Value> = schema::encode_row(write.table, row)?
                .into_iter()
                .map(value_from_cell)
                .collect::<Result<_, _>>()?;
            values.push(Value::Integer(position as i64));
            conn.execute(&sql, Params::Positional(values)).await?;
        }
        Ok(())
    }

    async fn apply_deletes(conn: &Connection, write: &TableWrite<'_>) -> Result<(), DatabaseError> {
        if write.deletes.is_empty() {
            return Ok(());
        }
        let sql = schema::delete_sql(write.table, Dialect::Sqlite);
        for key in &write.deletes {
            conn.execute(&sql, Params::Positional(vec![Value::Text(key.clone())]))
                .await?;
        }
        Ok(())
    }

    async fn write_tables(conn: &Connection, rows: &TableRows) -> Result<(), DatabaseError> {
        let mut existing = HashMap::new();
        for table in TABLES {
            existing.insert(table.name, Self::existing_keys(conn, table).await?);
        }
        let plan = schema::plan_write(&existing, rows)?;

        for write in &plan {
            Self::apply_upserts(conn, write).await?;
        }
        for write in plan.iter().rev() {
            Self::apply_deletes(conn, write).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for LibSqlBackend {
    fn name(&self) -> &'static str {
        "libsql"
    }

    async fn read(&self) -> Result<Store, DatabaseError> {
        let conn = self.connect().await?;
        // One read transaction so every table comes from the same snapshot.
        let tx = conn.transaction().await?;
        let mut tables = TableRows::new();
        for table in TABLES {
            tables.insert(table.name, Self::read_table(&tx, table).await?);
        }
        tx.commit().await?;
        store_from_tables(tables)
    }

    async fn write(&self, store: &Store) -> Result<(), DatabaseError> {
        let rows = store_to_tables(store)?;
        let conn = self.connect().await?;
        let tx = conn.transaction().await?;
        match Self::write_tables(&tx, &rows).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "libSQL rollback failed");
                }
                Err(e)
            }
        }
    }
}

fn cell_from_value(
    table: &TableSpec,
    column: &str,
    ty: ColumnType,
    value: Value,
) -> Result<Cell, DatabaseError> {
    let cell = match (ty, value) {
        (_, Value::Null) => Cell::Null,
        (ColumnType::Text, Value::Text(text)) => Cell::Text(text),
        (ColumnType::Integer, Value::Integer(n)) => Cell::Integer(n),
        (ColumnType::Boolean, Value::Integer(n)) => Cell::Boolean(n != 0),
        (ColumnType::Json, Value::Text(raw)) => Cell::Json(serde_json::from_str(&raw).map_err(
            |e| DatabaseError::Serialization(format!("{}.{}: {}", table.name, column, e)),
        )?),
        (_, other) => {
            return Err(DatabaseError::Serialization(format!(
                "{}.{}: unexpected stored value {:?}",
                table.name, column, other
            )));
        }
    };
    Ok(cell)
}

fn value_from_cell(cell: Cell) -> Result<Value, DatabaseError> {
    Ok(match cell {
        Cell::Null => Value::Null,
        Cell::Text(text) => Value::Text(text),
        Cell::Integer(n) => Value::Integer(n),
        Cell::Boolean(b) => Value::Integer(i64::from(b)),
        Cell::Json(value) => Value::Text(serde_json::to_string(&value)?),
    })
}

pub(crate) fn get_text(row: &libsql::Row, idx: i32) -> Result<String, DatabaseError> {
    match row.get_value(idx)? {
        Value::Text(text) => Ok(text),
        other => Err(DatabaseError::Serialization(format!(
            "expected text in column {idx}, got {other:?}"
        ))),
    }
}

pub(crate) fn get_opt_text(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(DatabaseError::Serialization(format!(
            "expected text or null in column {idx}, got {other:?}"
        ))),
    }
}

/// Fixed-width UTC timestamps so TEXT ordering matches time ordering.
pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("invalid timestamp '{raw}': {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::mappers::tests::sample_store;
    use crate::model::Issue;

    pub(crate) struct TestBackend {
        pub backend: LibSqlBackend,
        _tmpdir: tempfile::TempDir,
    }

    pub(crate) async fn setup_backend() -> TestBackend {
        // Use a temp-file database so all connections share schema/state.
        let tmpdir = tempfile::tempdir().expect("tempdir");
        let backend = LibSqlBackend::new_local(&tmpdir.path().join("workbit_test.db"))
            .await
            .expect("local backend should initialize");
        backend
            .run_migrations()
            .await
            .expect("migrations should succeed");
        TestBackend {
            backend,
            _tmpdir: tmpdir,
        }
    }

    async fn count(conn: &Connection, table: &str) -> i64 {
        let mut rows = conn
            .query(&format!("SELECT COUNT(*) FROM \"{table}\""), ())
            .await
            .expect("count");
        let row = rows.next().await.expect("row").expect("some row");
        row.get::<i64>(0).expect("count value")
    }

    #[tokio::test]
    async fn schema_contains_every_table() {
        let fixture = setup_backend().await;
        let conn = fixture.backend.connect().await.expect("connect");
        for name in TABLES.iter().map(|t| t.name).chain(["api_keys"]) {
            let row = conn
                .query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![name],
                )
                .await
                .expect("query sqlite_master")
                .next()
                .await
                .expect("row read");
            assert!(row.is_some(), "missing table {name}");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let fixture = setup_backend().await;
        fixture.backend.run_migrations().await.expect("second run");
    }

    #[tokio::test]
    async fn empty_database_reads_as_empty_store() {
        let fixture = setup_backend().await;
        assert_eq!(fixture.backend.read().await.expect("read"), Store::default());
    }

    #[tokio::test]
    async fn write_then_read_round_trips_and_keeps_order() {
        let fixture = setup_backend().await;
        let mut store = sample_store();
        // Reverse-alphabetical ids: order must come from position, not key.
        store.issues = ["ISS-9", "ISS-5", "ISS-1"]
            .iter()
            .map(|id| Issue {
                id: id.to_string(),
                title: format!("issue {id}"),
                assignee_id: None,
                assignee_name: None,
                date: "2026-02-01".into(),
                status: "todo".into(),
                team_id: "team-product".into(),
                project_id: None,
                description: None,
            })
            .collect();

        fixture.backend.write(&store).await.expect("write");
        let back = fixture.backend.read().await.expect("read");
        assert_eq!(back, store);
    }

    #[tokio::test]
    async fn second_write_removes_stale_rows_and_updates_changed_ones() {
        let fixture = setup_backend().await;
        let mut store = sample_store();
        fixture.backend.write(&store).await.expect("first write");

        store.notifications.clear();
        store.issues[0].status = "done".into();
        store.members.retain(|m| m.id != "m-bo");
        fixture.backend.write(&store).await.expect("second write");

        let conn = fixture.backend.connect().await.expect("connect");
        assert_eq!(count(&conn, "notifications").await, 0);
        assert_eq!(count(&conn, "members").await, 1);

        let back = fixture.backend.read().await.expect("read");
        assert_eq!(back.issues[0].status, "done");
        assert_eq!(back, store);
    }

    #[tokio::test]
    async fn duplicate_keys_abort_the_whole_write() {
        let fixture = setup_backend().await;
        let original = sample_store();
        fixture.backend.write(&original).await.expect("first write");

        let mut broken = original.clone();
        broken.workspaces.clear();
        let dup = broken.teams[0].clone();
        broken.teams.push(dup);
        fixture
            .backend
            .write(&broken)
            .await
            .expect_err("duplicate team id");

        assert_eq!(fixture.backend.read().await.expect("read"), original);
    }

    #[tokio::test]
    async fn failure_in_a_later_table_rolls_back_earlier_upserts() {
        let fixture = setup_backend().await;
        let original = sample_store();
        fixture.backend.write(&original).await.expect("first write");

        let conn = fixture.backend.connect().await.expect("connect");
        conn.execute_batch(
            "CREATE TRIGGER reject_notifications BEFORE INSERT ON notifications \
             BEGIN SELECT RAISE(ABORT, 'notifications are read-only'); END;",
        )
        .await
        .expect("create trigger");

        let mut changed = original.clone();
        changed.issues[0].status = "done".into();
        changed.issues[0].title = "Renamed mid-write".into();
        let mut extra = changed.notifications[0].clone();
        extra.id = "n-rejected".into();
        changed.notifications.push(extra);

        fixture
            .backend
            .write(&changed)
            .await
            .expect_err("trigger rejects the notifications insert");

        let back = fixture.backend.read().await.expect("read");
        assert_eq!(back.issues, original.issues);
        assert_eq!(back, original);
    }

    #[test]
    fn stored_booleans_and_json_decode_by_column_type() {
        assert_eq!(
            cell_from_value(&schema::MEMBERS, "provisioned", ColumnType::Boolean, Value::Integer(1))
                .expect("bool"),
            Cell::Boolean(true)
        );
        assert_eq!(
            cell_from_value(
                &schema::MEMBERS,
                "team_ids",
                ColumnType::Json,
                Value::Text("[\"a\"]".into())
            )
            .expect("json"),
            Cell::Json(serde_json::json!(["a"]))
        );
        let err = cell_from_value(
            &schema::MEMBERS,
            "team_ids",
            ColumnType::Json,
            Value::Text("[oops".into()),
        )
        .expect_err("bad json");
        assert!(err.to_string().contains("members.team_ids"), "{err}");
    }
}
