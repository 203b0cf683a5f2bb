//! User model and database operations
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE users (
//!     id UUID PRIMARY KEY,
//!     username VARCHAR(64) NOT NULL UNIQUE,
//!     name VARCHAR(255) NOT NULL,
//!     password_hash VARCHAR(255) NOT NULL,
//!     status SMALLINT NOT NULL DEFAULT 1,
//!     roles TEXT[] NOT NULL DEFAULT '{}',
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! The queries here take an explicit pool; which pool a call uses is decided
//! by the service layer (see [`crate::services::user::PgUserService`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::password::{hash_password, PasswordError};

/// Lifecycle status of a record
///
/// Stored as `SMALLINT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum DataStatus {
    /// Account may log in
    Enabled = 1,

    /// Account was switched off by an administrator
    Disabled = 0,

    /// Account is temporarily locked
    Locked = -1,
}

impl DataStatus {
    /// Only enabled accounts may log in
    pub fn is_enabled(&self) -> bool {
        matches!(self, DataStatus::Enabled)
    }
}

/// User record
///
/// Passwords are stored as Argon2id hashes and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserEntity {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Login name, unique across all users
    pub username: String,

    /// Display name
    pub name: String,

    /// Argon2id password hash (PHC string)
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Account status
    pub status: DataStatus,

    /// Role identifiers granted to the user
    pub roles: Vec<String>,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Login name
    pub username: String,

    /// Display name
    pub name: String,

    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: String,

    /// Initial status
    pub status: DataStatus,

    /// Granted roles
    pub roles: Vec<String>,
}

impl CreateUser {
    /// Builds an enabled user, hashing the plaintext password
    pub fn with_password(
        username: impl Into<String>,
        name: impl Into<String>,
        password: &str,
        roles: Vec<String>,
    ) -> Result<Self, PasswordError> {
        Ok(Self {
            username: username.into(),
            name: name.into(),
            password_hash: hash_password(password)?,
            status: DataStatus::Enabled,
            roles,
        })
    }
}

impl UserEntity {
    /// Builds a record with a fresh ID and timestamps, without persisting it
    pub fn new(data: CreateUser) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: data.username,
            name: data.name,
            password_hash: data.password_hash,
            status: data.status,
            roles: data.roles,
            created_at: now,
            updated_at: now,
        }
    }

    /// Inserts a new user
    ///
    /// # Errors
    ///
    /// Returns an error if the username already exists or the database
    /// connection fails.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, UserEntity>(
            r#"
            INSERT INTO users (id, username, name, password_hash, status, roles)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, username, name, password_hash, status, roles, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.username)
        .bind(data.name)
        .bind(data.password_hash)
        .bind(data.status)
        .bind(data.roles)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT id, username, name, password_hash, status, roles, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by login name
    pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT id, username, name, password_hash, status, roles, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Changes the status of a user
    ///
    /// Returns true if the user exists.
    pub async fn update_status(pool: &PgPool, id: Uuid, status: DataStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
