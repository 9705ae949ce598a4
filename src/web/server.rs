//! Axum HTTP server for the Workbit API.
//!
//! Builds the router, wires the auth layers and runs the server with
//! graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{HeaderValue, Method, header};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router, extract::DefaultBodyLimit, extract::State, middleware};
use tokio::sync::{RwLock, oneshot};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::auth::IdentityProvider;
use crate::db::{ApiKeyStore, Backends};
use crate::error::ServerError;
use crate::store::StoreHandle;
use crate::web::auth::{optional_auth, require_auth_when_configured};
use crate::web::handlers::{api_keys, auth, issues, me, notifications, teams, workspaces};
use crate::web::types::HealthResponse;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for all handlers.
pub struct AppState {
    pub store: Arc<StoreHandle>,
    /// Present only with a SQL backend.
    pub api_keys: Option<Arc<dyn ApiKeyStore>>,
    /// Present only when the identity provider is configured.
    pub auth: Option<Arc<dyn IdentityProvider>>,
    pub startup_time: Instant,
    pub shutdown_tx: RwLock<Option<oneshot::Sender<()>>>,
}

impl AppState {
    pub fn new(backends: Backends, auth: Option<Arc<dyn IdentityProvider>>) -> Self {
        Self {
            store: Arc::new(StoreHandle::new(backends.store)),
            api_keys: backends.api_keys,
            auth,
            startup_time: Instant::now(),
            shutdown_tx: RwLock::new(None),
        }
    }

    /// Signal the running server to stop accepting connections.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }
}

/// All routes with auth layers applied. `allowed_origins` enables CORS for
/// browser front ends served from elsewhere.
pub fn router(state: Arc<AppState>, allowed_origins: &[String]) -> Result<Router, ServerError> {
    let public = Router::new().route("/api/health", get(health_handler));

    let api = Router::new()
        // Auth
        .route("/api/v1/auth/login", post(auth::login_handler))
        .route("/api/v1/auth/session", get(auth::session_handler))
        // API keys
        .route(
            "/api/v1/api-keys",
            get(api_keys::list_handler).post(api_keys::create_handler),
        )
        .route("/api/v1/api-keys/{id}", delete(api_keys::revoke_handler))
        // Me
        .route("/api/v1/me", get(me::me_handler))
        .route("/api/v1/me/issues", get(me::my_issues_handler))
        // Workspaces
        .route(
            "/api/v1/workspaces",
            get(workspaces::list_handler).post(workspaces::create_handler),
        )
        .route(
            "/api/v1/workspaces/{id}/projects",
            get(workspaces::projects_handler),
        )
        .route("/api/v1/workspaces/{id}/teams", get(workspaces::teams_handler))
        .route(
            "/api/v1/workspaces/{id}/members",
            get(workspaces::members_handler),
        )
        .route(
            "/api/v1/workspaces/{id}/members/invite",
            post(workspaces::invite_handler),
        )
        .route("/api/v1/workspaces/{id}/views", get(workspaces::views_handler))
        .route("/api/v1/workspaces/{id}/roles", get(workspaces::roles_handler))
        // Teams
        .route(
            "/api/v1/teams/{team_id}/project",
            get(teams::project_handler),
        )
        .route(
            "/api/v1/teams/{team_id}/updates",
            get(teams::list_updates_handler).post(teams::create_update_handler),
        )
        .route(
            "/api/v1/teams/{team_id}/updates/{update_id}/comments",
            get(teams::list_comments_handler).post(teams::add_comment_handler),
        )
        .route(
            "/api/v1/teams/{team_id}/milestones",
            get(teams::list_milestones_handler).post(teams::create_milestone_handler),
        )
        .route(
            "/api/v1/teams/{team_id}/milestones/{milestone_id}",
            patch(teams::update_milestone_handler),
        )
        .route(
            "/api/v1/teams/{team_id}/properties",
            patch(teams::patch_properties_handler),
        )
        .route("/api/v1/teams/{team_id}/views", get(teams::views_handler))
        .route("/api/v1/teams/{team_id}/logs", get(teams::logs_handler))
        .route(
            "/api/v1/teams/{team_id}/issues",
            get(issues::team_issues_handler),
        )
        // Issues
        .route("/api/v1/issues", post(issues::create_handler))
        .route(
            "/api/v1/issues/{id}",
            get(issues::get_handler).patch(issues::update_handler),
        )
        // Notifications
        .route("/api/v1/notifications", get(notifications::list_handler))
        .route(
            "/api/v1/notifications/read-all",
            post(notifications::read_all_handler),
        )
        .route(
            "/api/v1/notifications/{id}/read",
            patch(notifications::read_handler),
        )
        // Layers run bottom-up: resolve the user first, then enforce.
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth_when_configured,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    let mut app = Router::new()
        .merge(public)
        .merge(api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http());

    if !allowed_origins.is_empty() {
        let origins = allowed_origins
            .iter()
            .map(|origin| {
                origin.parse::<HeaderValue>().map_err(|e| {
                    ServerError::StartupFailed(format!("invalid CORS origin '{origin}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers(AllowHeaders::list([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::HeaderName::from_static("x-user-id"),
            ]));
        app = app.layer(cors);
    }

    Ok(app.with_state(state))
}

/// Start the API server.
///
/// Returns the actual bound `SocketAddr` (useful when binding to port 0).
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<AppState>,
    allowed_origins: &[String],
) -> Result<SocketAddr, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| ServerError::StartupFailed(format!("Failed to get local addr: {}", e)))?;

    let app = router(state.clone(), allowed_origins)?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    *state.shutdown_tx.write().await = Some(shutdown_tx);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("API server shutting down");
            })
            .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "API server listening");
    Ok(bound_addr)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        backend: state.store.backend_name(),
        auth_configured: state.auth.is_some(),
        api_keys_enabled: state.api_keys.is_some(),
        uptime_secs: state.startup_time.elapsed().as_secs(),
    })
}
