//! Configuration management for the API server
//!
//! Configuration is read from environment variables (and a `.env` file when
//! present).
//!
//! # Environment Variables
//!
//! - `API_HOST`: Host to bind to (default: 0.0.0.0)
//! - `API_PORT`: Port to bind to (default: 8080)
//! - `AUTHORIZE_MAPPING`: Base path of the authorization routes (default: authorize)
//! - `DATABASE_URL`: PostgreSQL connection string; users are kept in memory when unset
//! - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
//! - `DATASOURCE_CONFIG`: Routing table file (TOML, JSON or YAML)
//! - `JWT_SECRET`: Secret key for JWT signing (required, at least 32 characters)
//! - `TOKEN_TTL_SECONDS`: Token lifetime, at most one year (default: 7200)
//! - `CORS_ORIGINS`: Comma-separated allowed origins; any origin when unset
//! - `ADMIN_USERNAME` / `ADMIN_PASSWORD`: Admin account created at startup
//!   unless it already exists, in memory or in PostgreSQL (default: admin / admin)
//! - `RUST_LOG`: Log filter (default: hsweb_api=debug,tower_http=debug)
//!
//! # Example
//!
//! ```no_run
//! use hsweb_api::config::Config;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Server will listen on {}", config.bind_address());
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Longest accepted token lifetime (one year)
pub const MAX_TOKEN_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration; `None` runs with the in-memory user store
    pub database: Option<DatabaseConfig>,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Admin account seeded at startup
    pub admin: AdminConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Base path of the authorization routes, without slashes
    pub authorize_mapping: String,

    /// Allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,

    /// Routing table with datasource markers and named datasources
    pub datasource_config: Option<PathBuf>,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    /// Token lifetime in seconds
    pub token_ttl_seconds: i64,
}

/// Admin account created at startup in either user store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Login name
    pub username: String,

    /// Plaintext password, hashed at startup
    pub password: String,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `JWT_SECRET` is missing or shorter than 32 characters
    /// - A numeric variable does not parse
    /// - `TOKEN_TTL_SECONDS` is not in `1..=MAX_TOKEN_TTL_SECONDS`
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let api_port = lookup("API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()?;

        let authorize_mapping = lookup("AUTHORIZE_MAPPING")
            .map(|mapping| mapping.trim_matches('/').to_string())
            .filter(|mapping| !mapping.is_empty())
            .unwrap_or_else(|| "authorize".to_string());

        let cors_origins = lookup("CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let database = match lookup("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|| "10".to_string())
                    .parse::<u32>()?,
                datasource_config: lookup("DATASOURCE_CONFIG").map(PathBuf::from),
            }),
            None => None,
        };

        let jwt_secret =
            lookup("JWT_SECRET").ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let token_ttl_seconds = lookup("TOKEN_TTL_SECONDS")
            .unwrap_or_else(|| "7200".to_string())
            .parse::<i64>()?;

        if token_ttl_seconds <= 0 {
            anyhow::bail!("TOKEN_TTL_SECONDS must be positive");
        }

        if token_ttl_seconds > MAX_TOKEN_TTL_SECONDS {
            anyhow::bail!("TOKEN_TTL_SECONDS must be at most {}", MAX_TOKEN_TTL_SECONDS);
        }

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                authorize_mapping,
                cors_origins,
            },
            database,
            jwt: JwtConfig {
                secret: jwt_secret,
                token_ttl_seconds,
            },
            admin: AdminConfig {
                username: lookup("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
                password: lookup("ADMIN_PASSWORD").unwrap_or_else(|| "admin".to_string()),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
