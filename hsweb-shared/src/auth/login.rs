//! Username/password login flow
//!
//! ```text
//! Received ─validate─> Decoded ─Before─> PreValidated ─┬─> Success
//!                                                      └─> Failed
//! ```
//!
//! Validation failures are returned before any event is published. An error
//! up to and including the authentication lookup publishes one Failed event
//! and is then returned to the caller unchanged. A Success listener error is
//! returned as is: Success has already been published, so no Failed follows.
//! Each attempt past validation therefore publishes exactly one terminal
//! event.

use serde_json::json;
use std::sync::Arc;

use super::authentication::{AuthenticationError, AuthenticationManager};
use super::events::{
    AuthorizationEventPublisher, BeforeEvent, Credentials, DecodeEvent, ExitEvent, FailedEvent,
    FailureReason, ListenerError, Parameters, ResultMap, SuccessEvent,
};
use crate::auth::authentication::Authentication;
use crate::services::user::{UserService, UserServiceError};

/// Error type for login attempts
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// A required field is missing or empty
    #[error("{field} must not be empty")]
    Validation {
        /// Name of the offending field
        field: &'static str,
    },

    /// No user matches the username and password
    #[error("Password error")]
    PasswordError,

    /// The matched user is not enabled
    #[error("User is disabled")]
    UserDisabled,

    /// A listener aborted the attempt
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// User lookup failed
    #[error(transparent)]
    UserService(#[from] UserServiceError),

    /// Authentication lookup failed
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
}

impl From<&LoginError> for FailureReason {
    fn from(err: &LoginError) -> Self {
        match err {
            LoginError::PasswordError => FailureReason::PasswordError,
            LoginError::UserDisabled => FailureReason::UserDisabled,
            _ => FailureReason::Other,
        }
    }
}

/// Login and sign-out operations
#[derive(Clone)]
pub struct AuthorizationService {
    users: Arc<dyn UserService>,
    authentication_manager: Arc<dyn AuthenticationManager>,
    events: Arc<AuthorizationEventPublisher>,
}

impl AuthorizationService {
    /// Creates the service
    pub fn new(
        users: Arc<dyn UserService>,
        authentication_manager: Arc<dyn AuthenticationManager>,
        events: Arc<AuthorizationEventPublisher>,
    ) -> Self {
        Self {
            users,
            authentication_manager,
            events,
        }
    }

    /// Event publisher used by this service
    pub fn events(&self) -> &AuthorizationEventPublisher {
        &self.events
    }

    /// Authentication manager used by this service
    pub fn authentication_manager(&self) -> &Arc<dyn AuthenticationManager> {
        &self.authentication_manager
    }

    /// Logs a user in
    ///
    /// Returns the result map of the Success event: `userId` plus whatever
    /// the Success listeners added.
    ///
    /// # Errors
    ///
    /// - `LoginError::Validation` if username or password is empty (no
    ///   events are published)
    /// - `LoginError::PasswordError` if no user matches
    /// - `LoginError::UserDisabled` if the user is not enabled
    /// - any listener, lookup or authentication error
    pub async fn login(
        &self,
        username: String,
        password: String,
        parameters: Parameters,
    ) -> Result<ResultMap, LoginError> {
        if username.is_empty() {
            return Err(LoginError::Validation { field: "username" });
        }
        if password.is_empty() {
            return Err(LoginError::Validation { field: "password" });
        }

        let parameters = Arc::new(parameters);
        let mut credentials = Credentials::new(username, password);

        let success = match self.authenticate(&mut credentials, &parameters).await {
            Ok(success) => success,
            Err(err) => {
                let event = FailedEvent {
                    credentials: &credentials,
                    parameters: &parameters,
                    reason: FailureReason::from(&err),
                    error: &err,
                };
                self.events.publish_failed(&event).await;
                return Err(err);
            }
        };

        let user_id = success.authentication.user.id;
        let event = self.events.publish_success(success).await.map_err(|err| {
            tracing::error!(user_id = %user_id, listener = %err.listener, error = %err, "Success listener failed");
            LoginError::Listener(err)
        })?;

        Ok(event.result)
    }

    /// Decode, Before and lookup stages
    ///
    /// Returns the Success event to publish. `credentials` is updated with
    /// the decoded values so a later failure reports what was actually
    /// checked.
    async fn authenticate(
        &self,
        credentials: &mut Credentials,
        parameters: &Arc<Parameters>,
    ) -> Result<SuccessEvent, LoginError> {
        let decoded = self
            .events
            .publish_decode(DecodeEvent {
                credentials: credentials.clone(),
                parameters: parameters.clone(),
            })
            .await?;
        *credentials = decoded.credentials;

        self.events
            .publish_before(&BeforeEvent {
                credentials: credentials.clone(),
                parameters: parameters.clone(),
            })
            .await?;

        let user = self
            .users
            .select_by_username_and_password(&credentials.username, &credentials.password)
            .await?
            .ok_or(LoginError::PasswordError)?;

        if !user.status.is_enabled() {
            return Err(LoginError::UserDisabled);
        }

        let authentication = self.authentication_manager.get_by_user_id(user.id).await?;

        let mut result = ResultMap::new();
        result.insert("userId".to_string(), json!(user.id));

        Ok(SuccessEvent {
            authentication,
            parameters: parameters.clone(),
            result,
        })
    }

    /// Signs the current user out
    pub async fn exit(&self, authentication: Authentication, token: Option<String>) {
        self.events
            .publish_exit(&ExitEvent {
                authentication,
                token,
            })
            .await;
    }
}
