//! # hsweb API Server
//!
//! Serves the authorization endpoints (login, sign-out, current
//! authentication) over users kept in PostgreSQL, or in memory when
//! `DATABASE_URL` is not set.
//!
//! ## Usage
//!
//! ```bash
//! JWT_SECRET=$(openssl rand -hex 32) cargo run -p hsweb-api
//! ```

use anyhow::Context;
use hsweb_api::{
    app::{build_router, AppState},
    config::{Config, DatabaseConfig},
};
use hsweb_shared::{
    datasource::{
        annotation::RoutingTable,
        strategy::{AnnotationStrategyMatcher, CachedStrategyMatcher},
        switcher::DataSourceSwitcher,
    },
    db::{
        migrations::run_migrations,
        pool::{create_named_pools, create_pool, DatabaseConfig as PoolConfig},
    },
    models::user::CreateUser,
    services::user::{InMemoryUserService, PgUserService, UserService, UserServiceError},
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hsweb_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("hsweb API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let (users, db): (Arc<dyn UserService>, Option<PgPool>) = match &config.database {
        Some(database) => {
            let (users, pool) = connect_database(database).await?;
            let users: Arc<dyn UserService> = Arc::new(users);
            (users, Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping users in memory");
            let users: Arc<dyn UserService> = Arc::new(InMemoryUserService::new());
            (users, None)
        }
    };

    seed_admin(users.as_ref(), &config).await?;

    let mut state = AppState::new(config.clone(), users);
    if let Some(db) = db {
        state = state.with_database(db);
    }

    let tokens = state.tokens.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = tokens.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired tokens");
            }
        }
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;

    tracing::info!("Server listening on http://{}", config.bind_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Connects the default and named pools and builds the routed user service
async fn connect_database(database: &DatabaseConfig) -> anyhow::Result<(PgUserService, PgPool)> {
    let base = PoolConfig {
        url: database.url.clone(),
        max_connections: database.max_connections,
        ..Default::default()
    };

    let pool = create_pool(base.clone()).await.context("Failed to connect to database")?;
    run_migrations(&pool).await?;

    let mut table = match &database.datasource_config {
        Some(path) => RoutingTable::from_file(path)?,
        None => RoutingTable::default(),
    };
    let definitions = std::mem::take(&mut table.data_sources);
    let named_pools = create_named_pools(&base, &definitions).await?;

    let mut registry = table.into_registry();
    PgUserService::register_supertypes(&mut registry);

    let mut switcher = DataSourceSwitcher::new(pool.clone())
        .with_matcher(CachedStrategyMatcher::new(AnnotationStrategyMatcher::new(registry)));
    for (id, named_pool) in named_pools {
        switcher = switcher.with_data_source(id, named_pool);
    }

    tracing::info!(
        data_sources = ?switcher.data_source_ids().collect::<Vec<_>>(),
        "Datasource switcher ready"
    );

    Ok((PgUserService::new(Arc::new(switcher)), pool))
}

/// Creates the configured admin account unless it already exists
async fn seed_admin(users: &dyn UserService, config: &Config) -> anyhow::Result<()> {
    let admin = CreateUser::with_password(
        config.admin.username.clone(),
        "Administrator",
        &config.admin.password,
        vec!["admin".to_string()],
    )?;

    match users.insert(admin).await {
        Ok(user) => tracing::info!(user_id = %user.id, username = %user.username, "Seeded admin user"),
        Err(UserServiceError::DuplicateUsername(_)) => {}
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received, exiting...");
}
