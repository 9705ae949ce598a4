//! Personal API keys.
//!
//! A key is `wb_` followed by 32 url-safe characters. Only its SHA-256 hash
//! and a short display prefix are stored; the full token is returned once,
//! at creation.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::db::{ApiKeyRecord, ApiKeyStore};
use crate::error::{DatabaseError, ServiceError};
use crate::service::{new_id, required};

pub const KEY_PREFIX: &str = "wb_";
const KEY_BYTES: usize = 24;
const DISPLAY_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateApiKeyInput {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySummary {
    pub id: String,
    pub name: String,
    pub prefix: String,
    pub created_at: DateTime<Utc>,
}

impl From<ApiKeyRecord> for ApiKeySummary {
    fn from(record: ApiKeyRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            prefix: record.prefix,
            created_at: record.created_at,
        }
    }
}

/// A newly created key. `token` is never retrievable again.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedApiKey {
    #[serde(flatten)]
    pub key: ApiKeySummary,
    pub token: String,
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

pub fn display_prefix(token: &str) -> String {
    token.chars().take(DISPLAY_PREFIX_LEN).collect()
}

fn hashes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub async fn create_api_key(
    keys: &dyn ApiKeyStore,
    user_id: &str,
    input: CreateApiKeyInput,
    now: DateTime<Utc>,
) -> Result<CreatedApiKey, ServiceError> {
    let name = required("name", input.name.as_deref())?;
    let token = generate_token();
    let record = ApiKeyRecord {
        id: new_id("key"),
        user_id: user_id.to_string(),
        name,
        prefix: display_prefix(&token),
        key_hash: hash_token(&token),
        created_at: now,
        revoked_at: None,
    };
    keys.insert_api_key(&record).await?;
    tracing::info!(key_id = %record.id, user_id, "API key created");
    Ok(CreatedApiKey {
        key: record.into(),
        token,
    })
}

pub async fn list_api_keys(
    keys: &dyn ApiKeyStore,
    user_id: &str,
) -> Result<Vec<ApiKeySummary>, ServiceError> {
    let records = keys.list_api_keys(user_id).await?;
    Ok(records.into_iter().map(ApiKeySummary::from).collect())
}

pub async fn revoke_api_key(
    keys: &dyn ApiKeyStore,
    user_id: &str,
    key_id: &str,
) -> Result<(), ServiceError> {
    if keys.revoke_api_key(user_id, key_id).await? {
        tracing::info!(key_id, user_id, "API key revoked");
        Ok(())
    } else {
        Err(ServiceError::NotFound("API key not found".to_string()))
    }
}

/// Owner of an active key matching `token`, if any.
pub async fn authenticate(
    keys: &dyn ApiKeyStore,
    token: &str,
) -> Result<Option<String>, DatabaseError> {
    if !token.starts_with(KEY_PREFIX) {
        return Ok(None);
    }
    let hash = hash_token(token);
    let candidates = keys.find_api_keys_by_prefix(&display_prefix(token)).await?;
    Ok(candidates
        .into_iter()
        .find(|record| hashes_match(&record.key_hash, &hash))
        .map(|record| record.user_id))
}

#[cfg(all(test, feature = "libsql"))]
mod tests {
    use super::*;
    use crate::db::libsql::tests::setup_backend;
    use crate::service::fixtures::at;

    #[test]
    fn tokens_have_prefix_and_fixed_length() {
        let token = generate_token();
        assert!(token.starts_with(KEY_PREFIX));
        assert_eq!(token.len(), KEY_PREFIX.len() + 32);
        assert!(
            token[KEY_PREFIX.len()..]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(token, generate_token());
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(hashes_match(&hash_token("x"), &hash_token("x")));
        assert!(!hashes_match(&hash_token("x"), &hash_token("y")));
    }

    #[tokio::test]
    async fn created_key_authenticates_until_revoked() {
        let test = setup_backend().await;
        let keys: &dyn ApiKeyStore = &test.backend;

        let created = create_api_key(
            keys,
            "auth-ana",
            CreateApiKeyInput {
                name: Some("CI".into()),
            },
            at(0),
        )
        .await
        .expect("create");
        assert_eq!(created.key.prefix, display_prefix(&created.token));

        let owner = authenticate(keys, &created.token).await.expect("auth");
        assert_eq!(owner.as_deref(), Some("auth-ana"));

        let listed = list_api_keys(keys, "auth-ana").await.expect("list");
        assert_eq!(listed, vec![created.key.clone()]);

        revoke_api_key(keys, "auth-ana", &created.key.id)
            .await
            .expect("revoke");
        assert_eq!(authenticate(keys, &created.token).await.expect("auth"), None);
        let err = revoke_api_key(keys, "auth-ana", &created.key.id)
            .await
            .expect_err("already revoked");
        assert_eq!(err.status_code().as_u16(), 404);
    }

    #[tokio::test]
    async fn wrong_tokens_do_not_authenticate() {
        let test = setup_backend().await;
        let keys: &dyn ApiKeyStore = &test.backend;
        let created = create_api_key(
            keys,
            "auth-ana",
            CreateApiKeyInput {
                name: Some("CLI".into()),
            },
            at(0),
        )
        .await
        .expect("create");

        let mut forged = created.token.clone();
        forged.pop();
        forged.push(if created.token.ends_with('A') { 'B' } else { 'A' });
        assert_eq!(authenticate(keys, &forged).await.expect("auth"), None);
        assert_eq!(authenticate(keys, "not-a-key").await.expect("auth"), None);

        let err = create_api_key(keys, "auth-ana", CreateApiKeyInput { name: None }, at(0))
            .await
            .expect_err("name required");
        assert_eq!(err.to_string(), "name is required");
    }
}
