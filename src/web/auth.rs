//! Request authentication.
//!
//! Two layers run on every `/api/v1` route. `optional_auth` resolves a
//! bearer token to an [`AuthUser`] when it can and never rejects.
//! `require_auth_when_configured` then returns 401 only if an identity
//! provider is configured and nothing was resolved. Login routes under
//! `/api/v1/auth` always pass.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::AuthUser;
use crate::error::ServiceError;
use crate::service::api_keys::{self, KEY_PREFIX};
use crate::service::me::DEFAULT_USER_ID;
use crate::web::server::AppState;
use crate::web::types::ApiError;

const AUTH_ROUTE_PREFIX: &str = "/api/v1/auth";
const USER_ID_HEADER: &str = "x-user-id";

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn resolve_user(state: &AppState, token: &str) -> Option<AuthUser> {
    if token.starts_with(KEY_PREFIX) {
        let keys = state.api_keys.as_ref()?;
        return match api_keys::authenticate(keys.as_ref(), token).await {
            Ok(Some(user_id)) => Some(AuthUser {
                id: user_id,
                email: None,
                name: None,
            }),
            Ok(None) => {
                tracing::debug!("API key did not match an active key");
                None
            }
            Err(e) => {
                tracing::warn!("API key lookup failed: {}", e);
                None
            }
        };
    }

    let provider = state.auth.as_ref()?;
    match provider.verify(token).await {
        Ok(user) => Some(user),
        Err(e) => {
            tracing::debug!("Bearer token rejected: {}", e);
            None
        }
    }
}

/// Attach the resolved user to the request, if any.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(request.headers()) {
        if let Some(user) = resolve_user(&state, token).await {
            request.extensions_mut().insert(user);
        }
    }
    next.run(request).await
}

pub async fn require_auth_when_configured(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let resolved = request.extensions().get::<AuthUser>().is_some();
    let exempt = request.uri().path().starts_with(AUTH_ROUTE_PREFIX);
    if state.auth.is_some() && !resolved && !exempt {
        return ApiError(ServiceError::Unauthorized(
            "Authentication required".to_string(),
        ))
        .into_response();
    }
    next.run(request).await
}

/// Who is calling: the authenticated user, else the `x-user-id` header,
/// else the default user.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub user: Option<AuthUser>,
}

impl Caller {
    fn from_parts(parts: &Parts) -> Self {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Self {
                user_id: user.id.clone(),
                user: Some(user.clone()),
            };
        }
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_USER_ID)
            .to_string();
        Self { user_id, user: None }
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request as HttpRequest;

    use super::*;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).expect("request").into_parts().0
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().expect("header"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().expect("header"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer ".parse().expect("header"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn caller_prefers_authenticated_user() {
        let mut p = parts(HttpRequest::builder().header(USER_ID_HEADER, "m-bo"));
        p.extensions.insert(AuthUser {
            id: "auth-ana".into(),
            email: None,
            name: None,
        });
        let caller = Caller::from_parts(&p);
        assert_eq!(caller.user_id, "auth-ana");
        assert!(caller.user.is_some());
    }

    #[test]
    fn caller_falls_back_to_header_then_default() {
        let caller = Caller::from_parts(&parts(HttpRequest::builder().header(USER_ID_HEADER, "m-bo")));
        assert_eq!(caller.user_id, "m-bo");
        assert!(caller.user.is_none());

        let caller = Caller::from_parts(&parts(HttpRequest::builder()));
        assert_eq!(caller.user_id, DEFAULT_USER_ID);
    }
}
