//! User lookup service
//!
//! [`UserService`] is the seam the login flow and the authentication manager
//! depend on. Two implementations ship with the crate:
//!
//! - [`InMemoryUserService`]: process-local store for development and tests
//! - [`PgUserService`]: PostgreSQL store whose pool is picked per call site
//!   through a [`DataSourceSwitcher`]
//!
//! Unknown usernames and wrong passwords are indistinguishable to callers:
//! both yield `Ok(None)`.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::password::{verify_password, PasswordError};
use crate::datasource::switcher::DataSourceSwitcher;
use crate::datasource::DataSourceError;
use crate::models::user::{CreateUser, DataStatus, UserEntity};

/// Name under which routing rules address any user service
pub const USER_SERVICE: &str = "UserService";

/// Error type for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Database query failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No datasource could be selected for the call
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    /// Stored password hash could not be checked
    #[error(transparent)]
    Password(#[from] PasswordError),

    /// Another user already has this username
    #[error("Username already exists: {0}")]
    DuplicateUsername(String),
}

/// User lookup operations
#[async_trait]
pub trait UserService: Send + Sync {
    /// Finds the user with this username whose password matches
    async fn select_by_username_and_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserEntity>, UserServiceError>;

    /// Finds a user by ID
    async fn select_by_id(&self, id: Uuid) -> Result<Option<UserEntity>, UserServiceError>;

    /// Creates a user
    async fn insert(&self, data: CreateUser) -> Result<UserEntity, UserServiceError>;

    /// Changes a user's status; returns false if the user does not exist
    async fn update_status(&self, id: Uuid, status: DataStatus) -> Result<bool, UserServiceError>;
}

fn password_matches(user: &UserEntity, password: &str) -> Result<bool, UserServiceError> {
    Ok(verify_password(password, &user.password_hash)?)
}

/// In-memory user store
#[derive(Debug, Default)]
pub struct InMemoryUserService {
    users: RwLock<HashMap<Uuid, UserEntity>>,
}

impl InMemoryUserService {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Returns true if no user is stored
    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    async fn find_by_username(&self, username: &str) -> Option<UserEntity> {
        let users = self.users.read().await;
        users.values().find(|user| user.username == username).cloned()
    }
}

#[async_trait]
impl UserService for InMemoryUserService {
    async fn select_by_username_and_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserEntity>, UserServiceError> {
        // Argon2 runs without holding the store lock
        let Some(user) = self.find_by_username(username).await else {
            return Ok(None);
        };

        if password_matches(&user, password)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn select_by_id(&self, id: Uuid) -> Result<Option<UserEntity>, UserServiceError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn insert(&self, data: CreateUser) -> Result<UserEntity, UserServiceError> {
        let mut users = self.users.write().await;
        if users.values().any(|user| user.username == data.username) {
            return Err(UserServiceError::DuplicateUsername(data.username));
        }

        let user = UserEntity::new(data);
        users.insert(user.id, user.clone());
        tracing::debug!(user_id = %user.id, username = %user.username, "Inserted user");
        Ok(user)
    }

    async fn update_status(&self, id: Uuid, status: DataStatus) -> Result<bool, UserServiceError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) => {
                user.status = status;
                user.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// PostgreSQL user store
///
/// Every operation is a call site `PgUserService::<method>` for datasource
/// routing. `PgUserService` is registered as a subtype of [`USER_SERVICE`]
/// by [`PgUserService::register_supertypes`], so rules may target either name.
pub struct PgUserService {
    switcher: Arc<DataSourceSwitcher<PgPool>>,
}

impl PgUserService {
    /// Type name used for datasource routing
    pub const TYPE_NAME: &'static str = "PgUserService";

    /// Creates a service routing through `switcher`
    pub fn new(switcher: Arc<DataSourceSwitcher<PgPool>>) -> Self {
        Self { switcher }
    }

    /// Creates a service that always uses `pool`
    pub fn with_pool(pool: PgPool) -> Self {
        Self::new(Arc::new(DataSourceSwitcher::new(pool)))
    }

    /// Declares this service's supertypes on a registry
    pub fn register_supertypes(registry: &mut crate::datasource::annotation::AnnotationRegistry) {
        registry.add_supertype(Self::TYPE_NAME, USER_SERVICE);
    }

    fn pool(&self, method: &str) -> Result<&PgPool, UserServiceError> {
        Ok(self.switcher.select(Self::TYPE_NAME, method)?)
    }
}

#[async_trait]
impl UserService for PgUserService {
    async fn select_by_username_and_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserEntity>, UserServiceError> {
        let pool = self.pool("select_by_username_and_password")?;
        let Some(user) = UserEntity::find_by_username(pool, username).await? else {
            return Ok(None);
        };

        if password_matches(&user, password)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn select_by_id(&self, id: Uuid) -> Result<Option<UserEntity>, UserServiceError> {
        let pool = self.pool("select_by_id")?;
        Ok(UserEntity::find_by_id(pool, id).await?)
    }

    async fn insert(&self, data: CreateUser) -> Result<UserEntity, UserServiceError> {
        let pool = self.pool("insert")?;
        let username = data.username.clone();

        UserEntity::create(pool, data).await.map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                UserServiceError::DuplicateUsername(username)
            }
            other => UserServiceError::Database(other),
        })
    }

    async fn update_status(&self, id: Uuid, status: DataStatus) -> Result<bool, UserServiceError> {
        let pool = self.pool("update_status")?;
        Ok(UserEntity::update_status(pool, id, status).await?)
    }
}
