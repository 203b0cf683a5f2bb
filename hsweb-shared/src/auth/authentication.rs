//! Resolved identities
//!
//! An [`Authentication`] is what the rest of the system knows about a
//! logged-in user. It is produced by an [`AuthenticationManager`] after the
//! credentials have been checked, and is passed explicitly to the handlers
//! that need it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::user::UserEntity;
use crate::services::user::{UserService, UserServiceError};

/// Identity part of an [`Authentication`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationUser {
    /// User ID
    pub id: Uuid,

    /// Login name
    pub username: String,

    /// Display name
    pub name: String,
}

/// Resolved identity of a logged-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    /// Who the user is
    pub user: AuthenticationUser,

    /// Granted roles
    pub roles: Vec<String>,

    /// Granted permissions
    pub permissions: Vec<String>,

    /// Free-form attributes attached by the authentication manager
    pub attributes: Map<String, Value>,
}

impl Authentication {
    /// Builds an authentication from a user record
    pub fn from_user(user: &UserEntity) -> Self {
        Self {
            user: AuthenticationUser {
                id: user.id,
                username: user.username.clone(),
                name: user.name.clone(),
            },
            roles: user.roles.clone(),
            permissions: Vec::new(),
            attributes: Map::new(),
        }
    }

    /// Checks whether the user holds `role`
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Error type for authentication lookups
#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    /// No user with this ID exists
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    /// Underlying user service failed
    #[error(transparent)]
    UserService(#[from] UserServiceError),
}

/// Resolves authentications by user ID
#[async_trait]
pub trait AuthenticationManager: Send + Sync {
    /// Returns the authentication for `user_id`
    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Authentication, AuthenticationError>;
}

/// Authentication manager backed by a [`UserService`]
pub struct UserAuthenticationManager {
    users: Arc<dyn UserService>,
}

impl UserAuthenticationManager {
    /// Creates a manager over `users`
    pub fn new(users: Arc<dyn UserService>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl AuthenticationManager for UserAuthenticationManager {
    async fn get_by_user_id(&self, user_id: Uuid) -> Result<Authentication, AuthenticationError> {
        let user = self
            .users
            .select_by_id(user_id)
            .await?
            .ok_or(AuthenticationError::UserNotFound(user_id))?;

        Ok(Authentication::from_user(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::CreateUser;
    use crate::services::user::InMemoryUserService;

    #[tokio::test]
    async fn test_get_by_user_id() {
        let users = Arc::new(InMemoryUserService::new());
        let user = users
            .insert(CreateUser::with_password("admin", "Administrator", "admin", vec!["admin".into()]).unwrap())
            .await
            .unwrap();

        let manager = UserAuthenticationManager::new(users);
        let authentication = manager.get_by_user_id(user.id).await.unwrap();

        assert_eq!(authentication.user.id, user.id);
        assert_eq!(authentication.user.username, "admin");
        assert!(authentication.has_role("admin"));
        assert!(!authentication.has_role("guest"));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let manager = UserAuthenticationManager::new(Arc::new(InMemoryUserService::new()));
        let id = Uuid::new_v4();

        match manager.get_by_user_id(id).await {
            Err(AuthenticationError::UserNotFound(missing)) => assert_eq!(missing, id),
            other => panic!("expected UserNotFound, got {:?}", other),
        }
    }
}
