//! Table catalogue shared by the SQL backends.
//!
//! Both backends persist the aggregate into the same 14 tables. Each table
//! carries one extra `position` column holding the record's index in its
//! collection, so collections read back in the order they were saved.

use std::collections::{HashMap, HashSet};

use crate::error::DatabaseError;

/// One persisted row, keyed by column name.
pub type RowObject = serde_json::Map<String, serde_json::Value>;

/// Rows for every table, keyed by table name.
pub type TableRows = HashMap<&'static str, Vec<RowObject>>;

/// Name of the ordering column appended to every table.
pub const POSITION_COLUMN: &str = "position";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Boolean,
    /// Lists and free-form objects. JSONB on Postgres, TEXT on SQLite.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        nullable: false,
    }
}

const fn opt(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        nullable: true,
    }
}

use ColumnType::{Boolean, Integer, Json, Text};

#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    pub key: &'static str,
    pub columns: &'static [Column],
}

impl TableSpec {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

pub const WORKSPACES: TableSpec = TableSpec {
    name: "workspaces",
    key: "id",
    columns: &[
        col("id", Text),
        col("name", Text),
        col("slug", Text),
        col("region", Text),
        col("member_ids", Json),
    ],
};

pub const ROLES: TableSpec = TableSpec {
    name: "roles",
    key: "id",
    columns: &[
        col("id", Text),
        col("name", Text),
        opt("description", Text),
        col("permissions", Json),
        opt("workspace_id", Text),
    ],
};

pub const MEMBERS: TableSpec = TableSpec {
    name: "members",
    key: "id",
    columns: &[
        col("id", Text),
        col("name", Text),
        col("username", Text),
        opt("avatar_src", Text),
        col("status", Text),
        opt("joined", Text),
        col("team_ids", Json),
        col("provisioned", Boolean),
        opt("uid", Text),
    ],
};

pub const TEAMS: TableSpec = TableSpec {
    name: "teams",
    key: "id",
    columns: &[
        col("id", Text),
        col("name", Text),
        opt("project_id", Text),
        col("member_ids", Json),
        opt("workspace_id", Text),
    ],
};

pub const PROJECTS: TableSpec = TableSpec {
    name: "projects",
    key: "id",
    columns: &[
        col("id", Text),
        col("name", Text),
        col("team_id", Text),
        col("status", Text),
        opt("workspace_id", Text),
    ],
};

pub const VIEWS: TableSpec = TableSpec {
    name: "views",
    key: "id",
    columns: &[
        col("id", Text),
        col("name", Text),
        opt("description", Text),
        opt("team_id", Text),
        opt("owner_id", Text),
        opt("workspace_id", Text),
        opt("filters", Json),
    ],
};

pub const INVITATIONS: TableSpec = TableSpec {
    name: "invitations",
    key: "id",
    columns: &[
        col("id", Text),
        col("email", Text),
        col("role", Text),
        col("workspace_id", Text),
        opt("invited_by", Text),
        col("status", Text),
        col("created_at", Text),
    ],
};

pub const PROJECT_PROPERTIES: TableSpec = TableSpec {
    name: "project_properties",
    key: "team_id",
    columns: &[
        col("team_id", Text),
        col("status", Text),
        col("priority", Text),
        opt("lead_id", Text),
        opt("start_date", Text),
        opt("end_date", Text),
        col("team_ids", Json),
        col("label_ids", Json),
    ],
};

pub const STATUS_UPDATES: TableSpec = TableSpec {
    name: "status_updates",
    key: "id",
    columns: &[
        col("id", Text),
        col("team_id", Text),
        col("status", Text),
        col("content", Text),
        col("author_id", Text),
        col("author_name", Text),
        opt("author_avatar_src", Text),
        col("created_at", Text),
        col("comment_count", Integer),
    ],
};

pub const STATUS_UPDATE_COMMENTS: TableSpec = TableSpec {
    name: "status_update_comments",
    key: "id",
    columns: &[
        col("id", Text),
        col("update_id", Text),
        col("author_id", Text),
        col("author_name", Text),
        opt("author_avatar_src", Text),
        col("content", Text),
        col("timestamp", Text),
    ],
};

pub const MILESTONES: TableSpec = TableSpec {
    name: "milestones",
    key: "id",
    columns: &[
        col("id", Text),
        col("team_id", Text),
        col("name", Text),
        col("progress", Integer),
        col("total", Integer),
        opt("target_date", Text),
        opt("description", Text),
    ],
};

pub const ACTIVITY: TableSpec = TableSpec {
    name: "activity",
    key: "id",
    columns: &[
        col("id", Text),
        col("team_id", Text),
        col("icon", Text),
        col("message", Text),
        col("date", Text),
    ],
};

pub const ISSUES: TableSpec = TableSpec {
    name: "issues",
    key: "id",
    columns: &[
        col("id", Text),
        col("title", Text),
        opt("assignee_id", Text),
        opt("assignee_name", Text),
        col("date", Text),
        col("status", Text),
        col("team_id", Text),
        opt("project_id", Text),
        opt("description", Text),
    ],
};

pub const NOTIFICATIONS: TableSpec = TableSpec {
    name: "notifications",
    key: "id",
    columns: &[
        col("id", Text),
        col("user_id", Text),
        col("type", Text),
        col("title", Text),
        col("body", Text),
        col("read", Boolean),
        col("created_at", Text),
        opt("actor_id", Text),
        opt("actor_name", Text),
        opt("target_url", Text),
    ],
};

/// All tables in dependency order: parents before the rows that point at them.
pub const TABLES: [&TableSpec; 14] = [
    &WORKSPACES,
    &ROLES,
    &MEMBERS,
    &TEAMS,
    &PROJECTS,
    &VIEWS,
    &INVITATIONS,
    &PROJECT_PROPERTIES,
    &STATUS_UPDATES,
    &STATUS_UPDATE_COMMENTS,
    &MILESTONES,
    &ACTIVITY,
    &ISSUES,
    &NOTIFICATIONS,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::Sqlite => format!("?{index}"),
        }
    }

    fn column_type(self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (_, ColumnType::Text) => "TEXT",
            (Self::Postgres, ColumnType::Integer) => "BIGINT",
            (Self::Sqlite, ColumnType::Integer) => "INTEGER",
            (Self::Postgres, ColumnType::Boolean) => "BOOLEAN",
            (Self::Sqlite, ColumnType::Boolean) => "INTEGER",
            (Self::Postgres, ColumnType::Json) => "JSONB",
            (Self::Sqlite, ColumnType::Json) => "TEXT",
        }
    }
}

fn quoted(ident: &str) -> String {
    format!("\"{ident}\"")
}

pub fn create_table_sql(table: &TableSpec, dialect: Dialect) -> String {
    let mut defs: Vec<String> = table
        .columns
        .iter()
        .map(|column| {
            let mut def = format!("{} {}", quoted(column.name), dialect.column_type(column.ty));
            if column.name == table.key {
                def.push_str(" PRIMARY KEY");
            } else if !column.nullable {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();
    defs.push(format!(
        "{} {} NOT NULL DEFAULT 0",
        quoted(POSITION_COLUMN),
        dialect.column_type(ColumnType::Integer)
    ));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quoted(table.name),
        defs.join(", ")
    )
}

pub fn select_sql(table: &TableSpec) -> String {
    let columns: Vec<String> = table.column_names().map(quoted).collect();
    format!(
        "SELECT {} FROM {} ORDER BY {}, {}",
        columns.join(", "),
        quoted(table.name),
        quoted(POSITION_COLUMN),
        quoted(table.key)
    )
}

pub fn select_keys_sql(table: &TableSpec) -> String {
    format!("SELECT {} FROM {}", quoted(table.key), quoted(table.name))
}

pub fn delete_sql(table: &TableSpec, dialect: Dialect) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {}",
        quoted(table.name),
        quoted(table.key),
        dialect.placeholder(1)
    )
}

/// Insert-or-update by key. Parameters are the table's columns in order,
/// followed by the position.
pub fn upsert_sql(table: &TableSpec, dialect: Dialect) -> String {
    let mut columns: Vec<String> = table.column_names().map(quoted).collect();
    columns.push(quoted(POSITION_COLUMN));
    let placeholders: Vec<String> = (1..=columns.len())
        .map(|i| dialect.placeholder(i))
        .collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != quoted(table.key))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
        quoted(table.name),
        columns.join(", "),
        placeholders.join(", "),
        quoted(table.key),
        updates.join(", ")
    )
}

/// A typed column value on its way to or from a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
    Json(serde_json::Value),
}

impl Cell {
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Text(text) => serde_json::Value::String(text),
            Self::Integer(n) => serde_json::Value::from(n),
            Self::Boolean(b) => serde_json::Value::Bool(b),
            Self::Json(value) => value,
        }
    }
}

/// Convert a row into cells in column order.
pub fn encode_row(table: &TableSpec, row: &RowObject) -> Result<Vec<Cell>, DatabaseError> {
    table
        .columns
        .iter()
        .map(|column| {
            let value = row.get(column.name).unwrap_or(&serde_json::Value::Null);
            encode_cell(table, column, value)
        })
        .collect()
}

fn encode_cell(
    table: &TableSpec,
    column: &Column,
    value: &serde_json::Value,
) -> Result<Cell, DatabaseError> {
    use serde_json::Value;

    let mismatch = || {
        DatabaseError::Serialization(format!(
            "{}.{}: unexpected value {}",
            table.name, column.name, value
        ))
    };
    match (column.ty, value) {
        (_, Value::Null) => Ok(Cell::Null),
        (ColumnType::Text, Value::String(s)) => Ok(Cell::Text(s.clone())),
        (ColumnType::Integer, Value::Number(n)) => n.as_i64().map(Cell::Integer).ok_or_else(mismatch),
        (ColumnType::Boolean, Value::Bool(b)) => Ok(Cell::Boolean(*b)),
        (ColumnType::Json, other) => Ok(Cell::Json(other.clone())),
        _ => Err(mismatch()),
    }
}

/// Rebuild a row object from cells read in column order.
pub fn decode_row(table: &TableSpec, cells: Vec<Cell>) -> RowObject {
    table
        .column_names()
        .zip(cells)
        .map(|(name, cell)| (name.to_string(), cell.into_json()))
        .collect()
}

pub fn row_key(table: &TableSpec, row: &RowObject) -> Result<String, DatabaseError> {
    row.get(table.key)
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            DatabaseError::Serialization(format!("{} row without {}", table.name, table.key))
        })
}

/// Work for one table within a save.
#[derive(Debug)]
pub struct TableWrite<'a> {
    pub table: &'static TableSpec,
    /// Rows to insert or update, in collection order.
    pub upserts: Vec<&'a RowObject>,
    /// Keys present in the datastore but gone from the aggregate.
    pub deletes: Vec<String>,
}

/// Diff the aggregate against the keys currently stored.
///
/// The result follows [`TABLES`] order. Callers apply every upsert in that
/// order first and then the deletes in reverse, so parents always exist
/// while children are written and children go before their parents.
pub fn plan_write<'a>(
    existing: &HashMap<&'static str, HashSet<String>>,
    rows: &'a TableRows,
) -> Result<Vec<TableWrite<'a>>, DatabaseError> {
    let empty_rows: Vec<RowObject> = Vec::new();
    let empty_keys = HashSet::new();
    let mut plan = Vec::with_capacity(TABLES.len());

    for table in TABLES {
        let table_rows = rows.get(table.name).unwrap_or(&empty_rows);
        let stored = existing.get(table.name).unwrap_or(&empty_keys);

        let mut seen = HashSet::with_capacity(table_rows.len());
        for row in table_rows {
            let key = row_key(table, row)?;
            if !seen.insert(key.clone()) {
                return Err(DatabaseError::Serialization(format!(
                    "duplicate {} '{}' in {}",
                    table.key, key, table.name
                )));
            }
        }

        let mut deletes: Vec<String> = stored.difference(&seen).cloned().collect();
        deletes.sort();

        plan.push(TableWrite {
            table,
            // Borrow from the caller's map rather than the local fallback.
            upserts: match rows.get(table.name) {
                Some(list) => list.iter().collect(),
                None => Vec::new(),
            },
            deletes,
        });
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> RowObject {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn tables_are_listed_in_dependency_order() {
        let names: Vec<&str> = TABLES.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "workspaces",
                "roles",
                "members",
                "teams",
                "projects",
                "views",
                "invitations",
                "project_properties",
                "status_updates",
                "status_update_comments",
                "milestones",
                "activity",
                "issues",
                "notifications",
            ]
        );
    }

    #[test]
    fn every_table_key_is_one_of_its_columns() {
        for table in TABLES {
            assert!(
                table.columns.iter().any(|c| c.name == table.key && !c.nullable),
                "{} key {} missing",
                table.name,
                table.key
            );
        }
    }

    #[test]
    fn project_properties_are_keyed_by_team() {
        assert_eq!(PROJECT_PROPERTIES.key, "team_id");
    }

    #[test]
    fn create_table_sql_uses_dialect_types() {
        let pg = create_table_sql(&NOTIFICATIONS, Dialect::Postgres);
        assert!(pg.contains("\"id\" TEXT PRIMARY KEY"), "{pg}");
        assert!(pg.contains("\"read\" BOOLEAN NOT NULL"), "{pg}");
        assert!(pg.contains("\"actor_id\" TEXT,") || pg.contains("\"actor_id\" TEXT "), "{pg}");
        assert!(pg.contains("\"position\" BIGINT NOT NULL DEFAULT 0"), "{pg}");

        let lite = create_table_sql(&WORKSPACES, Dialect::Sqlite);
        assert!(lite.contains("\"member_ids\" TEXT NOT NULL"), "{lite}");
        assert!(lite.contains("\"position\" INTEGER"), "{lite}");
    }

    #[test]
    fn upsert_sql_updates_every_non_key_column() {
        let sql = upsert_sql(&ACTIVITY, Dialect::Sqlite);
        assert!(sql.starts_with("INSERT INTO \"activity\""));
        assert!(sql.contains("VALUES (?1, ?2, ?3, ?4, ?5, ?6)"), "{sql}");
        assert!(sql.contains("ON CONFLICT (\"id\")"));
        assert!(sql.contains("\"message\" = excluded.\"message\""));
        assert!(sql.contains("\"position\" = excluded.\"position\""));
        assert!(!sql.contains("\"id\" = excluded"));

        let pg = upsert_sql(&PROJECT_PROPERTIES, Dialect::Postgres);
        assert!(pg.contains("$9"), "{pg}");
        assert!(pg.contains("ON CONFLICT (\"team_id\")"));
    }

    #[test]
    fn encode_row_follows_column_types() {
        let cells = encode_row(
            &MILESTONES,
            &row(json!({
                "id": "m1",
                "team_id": "team-a",
                "name": "Beta",
                "progress": 3,
                "total": 10,
                "target_date": null
            })),
        )
        .expect("encode");
        assert_eq!(cells[0], Cell::Text("m1".into()));
        assert_eq!(cells[3], Cell::Integer(3));
        assert_eq!(cells[5], Cell::Null);
        assert_eq!(cells[6], Cell::Null, "missing columns encode as null");
    }

    #[test]
    fn encode_row_rejects_type_mismatch() {
        let err = encode_row(
            &MILESTONES,
            &row(json!({"id": "m1", "team_id": "t", "name": "n", "progress": "three", "total": 1})),
        )
        .expect_err("string in integer column");
        assert!(err.to_string().contains("milestones.progress"), "{err}");
    }

    #[test]
    fn decode_row_restores_json_shape() {
        let decoded = decode_row(
            &WORKSPACES,
            vec![
                Cell::Text("ws".into()),
                Cell::Text("Acme".into()),
                Cell::Text("acme".into()),
                Cell::Text("eu".into()),
                Cell::Json(json!(["m1"])),
            ],
        );
        assert_eq!(
            serde_json::Value::Object(decoded),
            json!({"id": "ws", "name": "Acme", "slug": "acme", "region": "eu", "member_ids": ["m1"]})
        );
    }

    #[test]
    fn plan_write_upserts_current_rows_and_deletes_stale_keys() {
        let mut rows = TableRows::new();
        rows.insert(
            "issues",
            vec![
                row(json!({"id": "ISS-2", "title": "b"})),
                row(json!({"id": "ISS-3", "title": "c"})),
            ],
        );
        let mut existing = HashMap::new();
        existing.insert(
            "issues",
            HashSet::from(["ISS-1".to_string(), "ISS-2".to_string()]),
        );
        existing.insert("teams", HashSet::from(["team-old".to_string()]));

        let plan = plan_write(&existing, &rows).expect("plan");
        assert_eq!(plan.len(), TABLES.len());

        let issues = plan.iter().find(|w| w.table.name == "issues").expect("issues");
        assert_eq!(issues.upserts.len(), 2);
        assert_eq!(issues.deletes, vec!["ISS-1".to_string()]);

        let teams = plan.iter().find(|w| w.table.name == "teams").expect("teams");
        assert!(teams.upserts.is_empty());
        assert_eq!(teams.deletes, vec!["team-old".to_string()]);
    }

    #[test]
    fn plan_write_rejects_duplicate_keys() {
        let mut rows = TableRows::new();
        rows.insert(
            "teams",
            vec![row(json!({"id": "t"})), row(json!({"id": "t"}))],
        );
        let err = plan_write(&HashMap::new(), &rows).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate id 't' in teams"), "{err}");
    }

    #[test]
    fn plan_write_requires_key_column() {
        let mut rows = TableRows::new();
        rows.insert("project_properties", vec![row(json!({"status": "x"}))]);
        let err = plan_write(&HashMap::new(), &rows).expect_err("missing key");
        assert!(err.to_string().contains("team_id"), "{err}");
    }
}
