use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain rules: visibility, pagination and form validation.
pub mod forms;
pub mod models;
pub mod pagination;
pub mod visibility;

// Application services and components.
pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod repository;
pub mod storage;
pub mod templates;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};
pub use templates::Templates;

/// Largest accepted request body; post pictures travel inside the multipart form.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// AppState
///
/// Shared, immutable container of the application's services, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in deployments, in-memory for tests and database-less local runs.
    pub repo: RepositoryState,
    /// Post picture storage (S3/MinIO).
    pub storage: StorageState,
    pub config: AppConfig,
    /// Compiled page templates.
    pub templates: Arc<Templates>,
}

// --- Axum FromRef Extractor Implementations ---

// The auth extractors only need the repository and the configuration.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Login gate for the authenticated and staff routers. Extracting `AuthUser` either succeeds
/// or redirects the visitor to the login page with `next` pointing back here. The resolved
/// user rides along in the request extensions for the handler's own extractor.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure behind the login gate and cookie jar, wraps it in the
/// observability layers and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CookieManagerLayer::new())
        .with_state(state);

    base_router.layer(
        ServiceBuilder::new()
            // Every request gets a UUID x-request-id.
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            // Echo the id back to the client.
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// trace_span_logger
///
/// Span for one request carrying method, uri and the request id, so all log lines of a
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
