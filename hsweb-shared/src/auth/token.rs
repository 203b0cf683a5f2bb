//! Signed-in token store
//!
//! A token is valid only while it is present in the [`UserTokenManager`] and
//! has not expired. Signing out removes it, so a JWT that still verifies is
//! rejected after logout.
//!
//! [`TokenListener`] connects the store to the login lifecycle: it issues and
//! stores a token on Success and drops it on Exit.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::events::{AuthorizationListener, ExitEvent, ListenerError, ResultMap, SuccessEvent};
use super::jwt::{create_token, Claims};

/// One signed-in token
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserToken {
    /// Token string
    pub token: String,

    /// Owner
    pub user_id: Uuid,

    /// When the token was issued
    pub signed_in_at: DateTime<Utc>,

    /// Last request made with the token
    pub last_request_at: DateTime<Utc>,

    /// When the token stops being valid
    pub expires_at: DateTime<Utc>,
}

impl UserToken {
    /// Checks if the token has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent store of signed-in tokens
#[derive(Debug, Default)]
pub struct UserTokenManager {
    tokens: DashMap<String, UserToken>,
}

impl UserTokenManager {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new token
    pub fn sign_in(&self, token: impl Into<String>, user_id: Uuid, expires_at: DateTime<Utc>) -> UserToken {
        let now = Utc::now();
        let user_token = UserToken {
            token: token.into(),
            user_id,
            signed_in_at: now,
            last_request_at: now,
            expires_at,
        };

        self.tokens.insert(user_token.token.clone(), user_token.clone());
        tracing::debug!(user_id = %user_id, "Token signed in");
        user_token
    }

    /// Returns the token if it is signed in and not expired
    ///
    /// Expired tokens are removed on the way.
    pub fn get(&self, token: &str) -> Option<UserToken> {
        let now = Utc::now();
        let found = self.tokens.get(token).map(|entry| entry.value().clone())?;

        if found.is_expired_at(now) {
            self.tokens.remove(token);
            tracing::debug!(user_id = %found.user_id, "Token expired");
            return None;
        }

        Some(found)
    }

    /// Checks if the token is signed in and not expired
    pub fn is_signed_in(&self, token: &str) -> bool {
        self.get(token).is_some()
    }

    /// Records a request made with the token
    pub fn touch(&self, token: &str) {
        if let Some(mut entry) = self.tokens.get_mut(token) {
            entry.last_request_at = Utc::now();
        }
    }

    /// Removes a token
    pub fn sign_out(&self, token: &str) -> Option<UserToken> {
        let (_, removed) = self.tokens.remove(token)?;
        tracing::debug!(user_id = %removed.user_id, "Token signed out");
        Some(removed)
    }

    /// Removes every token of a user, returning how many were removed
    pub fn sign_out_by_user_id(&self, user_id: Uuid) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| token.user_id != user_id);
        before.saturating_sub(self.tokens.len())
    }

    /// Tokens currently held by a user
    pub fn user_tokens(&self, user_id: Uuid) -> Vec<UserToken> {
        self.tokens
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Drops every expired token, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, token| !token.is_expired_at(now));
        before.saturating_sub(self.tokens.len())
    }

    /// Number of stored tokens, expired ones included
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no token is stored
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Issues a token on Success and revokes it on Exit
///
/// Adds `token` and `expiresAt` (Unix milliseconds) to the login result.
pub struct TokenListener {
    tokens: Arc<UserTokenManager>,
    secret: String,
    ttl: Duration,
}

impl TokenListener {
    /// Creates a listener storing tokens in `tokens`
    pub fn new(tokens: Arc<UserTokenManager>, secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            tokens,
            secret: secret.into(),
            ttl,
        }
    }
}

#[async_trait]
impl AuthorizationListener for TokenListener {
    fn name(&self) -> &str {
        "token"
    }

    async fn on_success(&self, event: &SuccessEvent) -> Result<ResultMap, ListenerError> {
        let user_id = event.authentication.user.id;
        let claims = Claims::new(user_id, self.ttl);
        let token = create_token(&claims, &self.secret).map_err(|e| ListenerError::new(self.name(), e.to_string()))?;

        let user_token = self.tokens.sign_in(token, user_id, claims.expires_at());

        let mut additions = ResultMap::new();
        additions.insert("token".to_string(), json!(user_token.token));
        additions.insert("expiresAt".to_string(), json!(user_token.expires_at.timestamp_millis()));
        Ok(additions)
    }

    async fn on_exit(&self, event: &ExitEvent) {
        if let Some(token) = &event.token {
            self.tokens.sign_out(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::authentication::{Authentication, AuthenticationUser};
    use crate::auth::events::Parameters;
    use crate::auth::jwt::validate_token;
    use serde_json::Map;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn authentication(user_id: Uuid) -> Authentication {
        Authentication {
            user: AuthenticationUser {
                id: user_id,
                username: "admin".to_string(),
                name: "Administrator".to_string(),
            },
            roles: vec![],
            permissions: vec![],
            attributes: Map::new(),
        }
    }

    #[test]
    fn test_sign_in_and_out() {
        let tokens = UserTokenManager::new();
        let user_id = Uuid::new_v4();

        tokens.sign_in("t1", user_id, Utc::now() + Duration::hours(1));
        assert!(tokens.is_signed_in("t1"));
        assert_eq!(tokens.get("t1").unwrap().user_id, user_id);

        let removed = tokens.sign_out("t1").unwrap();
        assert_eq!(removed.token, "t1");
        assert!(!tokens.is_signed_in("t1"));
        assert!(tokens.sign_out("t1").is_none());
    }

    #[test]
    fn test_expired_token_is_removed() {
        let tokens = UserTokenManager::new();

        tokens.sign_in("old", Uuid::new_v4(), Utc::now() - Duration::seconds(1));
        assert_eq!(tokens.len(), 1);

        assert!(!tokens.is_signed_in("old"));
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_sign_out_by_user_id() {
        let tokens = UserTokenManager::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let later = Utc::now() + Duration::hours(1);

        tokens.sign_in("a1", alice, later);
        tokens.sign_in("a2", alice, later);
        tokens.sign_in("b1", bob, later);

        assert_eq!(tokens.user_tokens(alice).len(), 2);
        assert_eq!(tokens.sign_out_by_user_id(alice), 2);
        assert!(tokens.user_tokens(alice).is_empty());
        assert!(tokens.is_signed_in("b1"));
    }

    #[test]
    fn test_purge_expired() {
        let tokens = UserTokenManager::new();
        let user_id = Uuid::new_v4();

        tokens.sign_in("live", user_id, Utc::now() + Duration::hours(1));
        tokens.sign_in("dead", user_id, Utc::now() - Duration::hours(1));

        assert_eq!(tokens.purge_expired(), 1);
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn test_touch_updates_last_request() {
        let tokens = UserTokenManager::new();
        let issued = tokens.sign_in("t1", Uuid::new_v4(), Utc::now() + Duration::hours(1));

        tokens.touch("t1");
        tokens.touch("missing");

        assert!(tokens.get("t1").unwrap().last_request_at >= issued.last_request_at);
    }

    #[tokio::test]
    async fn test_listener_issues_and_revokes_token() {
        let tokens = Arc::new(UserTokenManager::new());
        let listener = TokenListener::new(tokens.clone(), SECRET, Duration::hours(1));
        let user_id = Uuid::new_v4();

        let event = SuccessEvent {
            authentication: authentication(user_id),
            parameters: Arc::new(Parameters::default()),
            result: ResultMap::new(),
        };
        let additions = listener.on_success(&event).await.unwrap();

        let token = additions["token"].as_str().unwrap().to_string();
        assert!(additions["expiresAt"].is_i64());
        assert!(tokens.is_signed_in(&token));
        assert_eq!(validate_token(&token, SECRET).unwrap().sub, user_id);

        listener
            .on_exit(&ExitEvent {
                authentication: authentication(user_id),
                token: Some(token.clone()),
            })
            .await;
        assert!(!tokens.is_signed_in(&token));
    }
}
