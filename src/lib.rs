//! github-login - Login with GitHub backed by server-side sessions
//!
//! # Architecture
//!
//! ```text
//! request ─► TraceLayer ─► restore_session ─► router
//!                               │               ├─ /, /login, /logout
//!                               │               ├─ /auth/github[/callback] ─► OAuthProvider
//!                               │               └─ /account ─► require_auth ─► handler
//!                               ▼
//!                          SessionStore (in-memory)
//! ```
//!
//! # Modules
//!
//! - `auth`: OAuth flow, sessions, auth gate
//! - `api`: pages and metrics endpoint
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use auth::{GitHubProvider, MemorySessionStore, OAuthProvider, SessionStore};

/// Application state shared across all handlers
///
/// Built once at startup and cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Server-side sessions
    pub sessions: Arc<dyn SessionStore>,

    /// External OAuth provider
    pub provider: Arc<dyn OAuthProvider>,
}

impl AppState {
    /// Initialize application state with the GitHub provider and an
    /// in-memory session store
    ///
    /// # Errors
    /// Returns error if the HTTP client or provider cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        if config.session.secret_generated {
            tracing::warn!(
                "session.secret is not set; using an ephemeral secret, sessions will not survive a restart"
            );
        }

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("github-login/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        let provider = GitHubProvider::new(&config.github, http_client)?;
        let sessions = MemorySessionStore::new(Duration::from_secs(config.session.max_age_seconds));

        tracing::info!("Application state initialized successfully");

        Ok(Self::with_parts(config, Arc::new(sessions), Arc::new(provider)))
    }

    /// Assemble state from explicit parts
    pub fn with_parts(
        config: config::AppConfig,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn OAuthProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
            provider,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::pages_router(state.clone()))
        .merge(auth::auth_router())
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::restore_session,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> error::AppError {
    error::AppError::NotFound
}
