//! # pagetree HTTP API Module
//!
//! This module implements the HTTP JSON API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Tree counters
//! - `POST /pages/query` - Run a page query
//! - `POST /pages` - Insert a page
//! - `POST /pages/move` - Move a page
//! - `POST /pages/trash` - Move a page into the trash
//! - `GET /check` - Verify tree invariants (admin)
//! - `POST /export` - Export a snapshot (admin)
//!
//! ## Security Configuration
//!
//! See [`crate::config`]: API key, rate limit and CORS origins come from
//! `pagetree.toml` and the `PAGETREE_*` environment variables.

mod auth;
mod handlers;
mod middleware;
mod types;

// Re-exports for external use
pub use auth::{API_ACTOR, ApiKey};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    AncestorsJson, CheckResponse, ExportResponse, FilterJson, HealthResponse, InsertRequest,
    MoveRequest, PageJson, PageResponse, QueryRequest, QueryResponse, StatusResponse,
    TrashRequest, status_for,
};

use crate::config::{Config, ServerConfig};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use pagetree_core::{Session, TreeError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted request body (2 MB).
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the tree session.
#[derive(Clone)]
pub struct AppState {
    /// The session. Writers hold the lock exclusively.
    pub session: Arc<RwLock<Session>>,
    /// Key that grants an admin context.
    pub api_key: ApiKey,
    /// Snapshot file rewritten after each write (file backend only).
    pub snapshot_file: Option<PathBuf>,
}

impl AppState {
    /// Create new app state with a session and no authentication.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            api_key: ApiKey::default(),
            snapshot_file: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: Option<&str>) -> Self {
        self.api_key = ApiKey::new(key);
        self
    }

    #[must_use]
    pub fn with_snapshot_file(mut self, path: PathBuf) -> Self {
        self.snapshot_file = Some(path);
        self
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from the configured origins.
///
/// - `None`: localhost only
/// - `["*"]`: all origins (logged as a warning)
/// - otherwise: the listed origins, falling back to localhost if none parse
fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    match origins {
        Some([only]) if only == "*" => {
            tracing::warn!(
                "CORS: Allowing ALL origins (cors_origins = \"*\"). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting - global budget (if enabled)
/// 4. Authentication - resolves the request context
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let cors = build_cors_layer(server.cors_origins.as_deref());

    let rate_limiter = if server.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", server.rate_limit);
        Some(create_rate_limiter(server.rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    if state.api_key.is_enabled() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - every request acts as administrator! \
             Set PAGETREE_API_KEY or [auth] api_key to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/pages", post(handlers::insert_handler))
        .route("/pages/query", post(handlers::query_handler))
        .route("/pages/move", post(handlers::move_handler))
        .route("/pages/trash", post(handlers::trash_handler))
        .route("/check", get(handlers::check_handler))
        .route("/export", post(handlers::export_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server on `addr`.
pub async fn run_server(addr: &str, state: AppState, config: &Config) -> Result<(), TreeError> {
    let router = create_router(state, &config.server);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TreeError::Store(format!("Bind failed: {}", e)))?;

    tracing::info!("pagetree HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| TreeError::Store(format!("Server error: {}", e)))
}
