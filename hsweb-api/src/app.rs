//! Application state and router builder
//!
//! # Example
//!
//! ```no_run
//! use hsweb_api::{app::{build_router, AppState}, config::Config};
//! use hsweb_shared::services::user::InMemoryUserService;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let state = AppState::new(config, Arc::new(InMemoryUserService::new()));
//! let app = build_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use chrono::Duration;
use hsweb_shared::{
    auth::{
        authentication::{AuthenticationManager, UserAuthenticationManager},
        events::{AuthorizationEventPublisher, AuthorizationListener, LoggingListener},
        login::AuthorizationService,
        middleware::{token_auth_middleware, TokenAuthState},
        token::{TokenListener, UserTokenManager},
    },
    services::user::UserService,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,

    /// Login and sign-out flow
    pub authorization: AuthorizationService,

    /// Signed-in tokens
    pub tokens: Arc<UserTokenManager>,

    /// Default database pool, when running against PostgreSQL
    pub db: Option<PgPool>,
}

impl AppState {
    /// Creates application state with the built-in listeners
    pub fn new(config: Config, users: Arc<dyn UserService>) -> Self {
        Self::with_listeners(config, users, Vec::new())
    }

    /// Creates application state with extra lifecycle listeners
    ///
    /// Listeners run in this order: logging, `listeners`, token issuing.
    pub fn with_listeners(
        config: Config,
        users: Arc<dyn UserService>,
        listeners: Vec<Arc<dyn AuthorizationListener>>,
    ) -> Self {
        let tokens = Arc::new(UserTokenManager::new());
        let authentication_manager: Arc<dyn AuthenticationManager> =
            Arc::new(UserAuthenticationManager::new(users.clone()));

        let mut events = AuthorizationEventPublisher::new().with_listener(Arc::new(LoggingListener));
        for listener in listeners {
            events.register(listener);
        }
        events.register(Arc::new(TokenListener::new(
            tokens.clone(),
            config.jwt.secret.clone(),
            Duration::seconds(config.jwt.token_ttl_seconds),
        )));

        let authorization = AuthorizationService::new(users, authentication_manager, Arc::new(events));

        Self {
            config: Arc::new(config),
            authorization,
            tokens,
            db: None,
        }
    }

    /// Attaches the default database pool
    pub fn with_database(mut self, db: PgPool) -> Self {
        self.db = Some(db);
        self
    }

    /// State for the bearer token middleware
    pub fn token_auth(&self) -> TokenAuthState {
        TokenAuthState {
            secret: Arc::from(self.config.jwt.secret.as_str()),
            tokens: self.tokens.clone(),
            authentication_manager: self.authorization.authentication_manager().clone(),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                   # Health check (public)
/// └── /{authorize_mapping}/     # default "authorize"
///     ├── POST /login           # JSON or form body (public)
///     ├── GET  /me              # authenticated
///     └── GET  /login-out, /sign-out, /exit   # authenticated
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Bearer token authentication (per-route basis)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_routes = Router::new().route("/login", post(routes::authorize::login));

    let authenticated_routes = Router::new()
        .route("/me", get(routes::authorize::me))
        .route("/login-out", get(routes::authorize::exit))
        .route("/sign-out", get(routes::authorize::exit))
        .route("/exit", get(routes::authorize::exit))
        .layer(middleware::from_fn_with_state(state.token_auth(), token_auth_middleware));

    let authorize_routes = public_routes.merge(authenticated_routes);
    let base = format!("/{}", state.config.api.authorize_mapping);

    Router::new()
        .merge(health_routes)
        .nest(&base, authorize_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config.api.cors_origins))
        .with_state(state)
}

/// CORS layer: permissive when no origin is configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|origin| origin.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsweb_shared::services::user::InMemoryUserService;

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "JWT_SECRET" => Some("test-secret-key-at-least-32-bytes-long".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_app_state_registers_builtin_listeners() {
        let state = AppState::new(config(), Arc::new(InMemoryUserService::new()));

        assert_eq!(state.authorization.events().len(), 2);
        assert!(state.db.is_none());
        assert!(state.tokens.is_empty());
    }

    #[test]
    fn test_cors_layer_accepts_configured_origins() {
        // Builds without panicking for both modes
        let _ = cors_layer(&[]);
        let _ = cors_layer(&["http://localhost:3000".to_string()]);
    }
}
