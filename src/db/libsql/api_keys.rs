use async_trait::async_trait;
use chrono::Utc;
use libsql::params;

use crate::db::{ApiKeyRecord, ApiKeyStore};
use crate::error::DatabaseError;

use super::{LibSqlBackend, fmt_ts, get_opt_text, get_text, parse_timestamp};

const SELECT_COLUMNS: &str = "id, user_id, name, prefix, key_hash, created_at, revoked_at";

fn row_to_record(row: &libsql::Row) -> Result<ApiKeyRecord, DatabaseError> {
    Ok(ApiKeyRecord {
        id: get_text(row, 0)?,
        user_id: get_text(row, 1)?,
        name: get_text(row, 2)?,
        prefix: get_text(row, 3)?,
        key_hash: get_text(row, 4)?,
        created_at: parse_timestamp(&get_text(row, 5)?)?,
        revoked_at: get_opt_text(row, 6)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?,
    })
}

#[async_trait]
impl ApiKeyStore for LibSqlBackend {
    async fn insert_api_key(&self, record: &ApiKeyRecord) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO api_keys (id, user_id, name, prefix, key_hash, created_at, revoked_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.as_str(),
                record.user_id.as_str(),
                record.name.as_str(),
                record.prefix.as_str(),
                record.key_hash.as_str(),
                fmt_ts(&record.created_at),
                record
                    .revoked_at
                    .as_ref()
                    .map(|ts| libsql::Value::Text(fmt_ts(ts)))
                    .unwrap_or(libsql::Value::Null),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKeyRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM api_keys \
                     WHERE user_id = ?1 AND revoked_at IS NULL \
                     ORDER BY created_at DESC, id"
                ),
                params![user_id],
            )
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }

    async fn find_api_keys_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<ApiKeyRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM api_keys \
                     WHERE prefix = ?1 AND revoked_at IS NULL"
                ),
                params![prefix],
            )
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }

    async fn revoke_api_key(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let changed = conn
            .execute(
                "UPDATE api_keys SET revoked_at = ?1 \
                 WHERE id = ?2 AND user_id = ?3 AND revoked_at IS NULL",
                params![fmt_ts(&Utc::now()), id, user_id],
            )
            .await?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::db::libsql::tests::setup_backend;

    fn record(id: &str, user_id: &str, prefix: &str, age_minutes: i64) -> ApiKeyRecord {
        ApiKeyRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            name: format!("key {id}"),
            prefix: prefix.to_string(),
            key_hash: format!("hash-{id}"),
            created_at: Utc::now() - Duration::minutes(age_minutes),
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn list_returns_active_keys_newest_first() {
        let fixture = setup_backend().await;
        let keys = &fixture.backend;
        keys.insert_api_key(&record("k1", "u1", "wb_aaaa", 30))
            .await
            .expect("insert k1");
        keys.insert_api_key(&record("k2", "u1", "wb_bbbb", 5))
            .await
            .expect("insert k2");
        keys.insert_api_key(&record("k3", "u2", "wb_cccc", 1))
            .await
            .expect("insert k3");

        let listed = keys.list_api_keys("u1").await.expect("list");
        let ids: Vec<&str> = listed.iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids, vec!["k2", "k1"]);
        assert_eq!(listed[0].key_hash, "hash-k2");
    }

    #[tokio::test]
    async fn revoked_keys_disappear_from_lookups() {
        let fixture = setup_backend().await;
        let keys = &fixture.backend;
        keys.insert_api_key(&record("k1", "u1", "wb_aaaa", 1))
            .await
            .expect("insert");

        assert_eq!(
            keys.find_api_keys_by_prefix("wb_aaaa").await.expect("find").len(),
            1
        );
        assert!(!keys.revoke_api_key("someone-else", "k1").await.expect("revoke"));
        assert!(keys.revoke_api_key("u1", "k1").await.expect("revoke"));
        assert!(!keys.revoke_api_key("u1", "k1").await.expect("second revoke"));

        assert!(keys.find_api_keys_by_prefix("wb_aaaa").await.expect("find").is_empty());
        assert!(keys.list_api_keys("u1").await.expect("list").is_empty());
    }
}
