//! Identity provider integration.
//!
//! Tokens are verified against Supabase Auth (GoTrue). The provider is
//! optional: without `SUPABASE_URL` and `SUPABASE_ANON_KEY` the API runs
//! unauthenticated and every request acts as the default user.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::AuthError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A principal resolved from a bearer token or API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the user behind an access token.
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError>;

    /// Exchange email and password for a session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl From<GoTrueUser> for AuthUser {
    fn from(user: GoTrueUser) -> Self {
        let name = ["full_name", "name"]
            .iter()
            .find_map(|key| user.user_metadata.get(key).and_then(|v| v.as_str()))
            .map(str::to_string);
        Self {
            id: user.id,
            email: user.email,
            name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: GoTrueUser,
}

/// Supabase Auth over its REST API.
pub struct SupabaseAuth {
    client: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
}

impl SupabaseAuth {
    pub fn new(base_url: impl Into<String>, anon_key: SecretString) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    /// `None` when the provider is not configured.
    pub fn from_config(config: &AuthConfig) -> Result<Option<Self>, AuthError> {
        match (&config.supabase_url, &config.supabase_anon_key) {
            (Some(url), Some(key)) => Self::new(url.clone(), key.clone()).map(Some),
            _ => Ok(None),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .get(self.endpoint("user"))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<GoTrueUser>().await?.into()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidToken),
            status => Err(AuthError::Provider(format!(
                "user lookup returned {status}"
            ))),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let response = self
            .client
            .post(self.endpoint("token?grant_type=password"))
            .header("apikey", self.anon_key.expose_secret())
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let session: GoTrueSession = response.json().await?;
                Ok(AuthSession {
                    access_token: session.access_token,
                    refresh_token: session.refresh_token,
                    expires_in: session.expires_in,
                    user: session.user.into(),
                })
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                Err(AuthError::InvalidCredentials)
            }
            status => Err(AuthError::Provider(format!("sign-in returned {status}"))),
        }
    }
}
