//! Login lifecycle events
//!
//! A login attempt moves through named stages, each published to every
//! registered [`AuthorizationListener`] in registration order:
//!
//! ```text
//! Decode ─> Before ─┬─> Success
//!                   └─> Failed
//! ```
//!
//! - **Decode**: listeners receive the credentials and return them, possibly
//!   rewritten (e.g. decrypting a transport-obfuscated password). The output
//!   of one listener is the input of the next.
//! - **Before**: read-only notification with the decoded credentials.
//! - **Success**: listeners see the authentication and the result map built
//!   so far, and return entries to merge into it (e.g. a token). An error
//!   here fails the request but is not followed by a Failed event.
//! - **Failed**: read-only notification carrying the failure reason and the
//!   error. Listeners cannot change or suppress the error.
//! - **Exit**: read-only notification when a user signs out.
//!
//! Publication is awaited in the request task, so a slow listener delays
//! the response.

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::authentication::Authentication;
use super::login::LoginError;

/// Response payload of a successful login
pub type ResultMap = Map<String, Value>;

/// Username and password of a login attempt
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name
    pub username: String,

    /// Plaintext (or still encoded, before the Decode stage) password
    pub password: String,
}

impl Credentials {
    /// Creates credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read-only view of the raw request parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters(HashMap<String, Value>);

impl Parameters {
    /// Wraps a parameter map
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self(values)
    }

    /// Raw value of a parameter
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Parameter value if it is a string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Returns true if the parameter is present
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterates over all parameters
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl From<HashMap<String, String>> for Parameters {
    fn from(values: HashMap<String, String>) -> Self {
        Self(
            values
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect(),
        )
    }
}

impl From<HashMap<String, Value>> for Parameters {
    fn from(values: HashMap<String, Value>) -> Self {
        Self(values)
    }
}

/// Why a login attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// No user matches the username and password
    PasswordError,

    /// The matched user is not enabled
    UserDisabled,

    /// Anything else
    Other,
}

impl FailureReason {
    /// Reason as a string constant
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::PasswordError => "PASSWORD_ERROR",
            FailureReason::UserDisabled => "USER_DISABLED",
            FailureReason::Other => "OTHER",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials entering the Decode stage
#[derive(Debug, Clone)]
pub struct DecodeEvent {
    /// Credentials as received, or as rewritten by earlier listeners
    pub credentials: Credentials,

    /// Raw request parameters
    pub parameters: Arc<Parameters>,
}

/// Decoded credentials about to be checked
#[derive(Debug, Clone)]
pub struct BeforeEvent {
    /// Decoded credentials
    pub credentials: Credentials,

    /// Raw request parameters
    pub parameters: Arc<Parameters>,
}

/// A login attempt succeeded
#[derive(Debug, Clone)]
pub struct SuccessEvent {
    /// Authentication of the logged-in user
    pub authentication: Authentication,

    /// Raw request parameters
    pub parameters: Arc<Parameters>,

    /// Response payload, pre-seeded with `userId`
    pub result: ResultMap,
}

/// A login attempt failed
#[derive(Debug)]
pub struct FailedEvent<'a> {
    /// Credentials in effect when the attempt failed
    pub credentials: &'a Credentials,

    /// Raw request parameters
    pub parameters: &'a Parameters,

    /// Failure category
    pub reason: FailureReason,

    /// The error that will be returned to the caller
    pub error: &'a LoginError,
}

/// A user signed out
#[derive(Debug, Clone)]
pub struct ExitEvent {
    /// Authentication of the signed-out user
    pub authentication: Authentication,

    /// Bearer token used for the request, if any
    pub token: Option<String>,
}

/// Error raised by a listener
///
/// A listener that rejects the request itself (a missing captcha, a password
/// that cannot be decrypted) sets `status`; the caller then sees that status
/// and `message`. Without a status the error is an internal failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Listener {listener} failed: {message}")]
pub struct ListenerError {
    /// Name of the failing listener
    pub listener: String,

    /// What went wrong
    pub message: String,

    /// HTTP status to answer with, if the listener rejected the request
    pub status: Option<StatusCode>,
}

impl ListenerError {
    /// Creates an internal listener error
    pub fn new(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Creates a rejection answered with `status`
    pub fn rejected(listener: impl Into<String>, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(listener, message)
        }
    }
}

/// Reacts to login lifecycle stages
///
/// Every method has a pass-through default, so listeners only implement the
/// stages they care about.
#[async_trait]
pub trait AuthorizationListener: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Returns the credentials to use downstream
    async fn on_decode(&self, event: DecodeEvent) -> Result<DecodeEvent, ListenerError> {
        Ok(event)
    }

    /// Observes decoded credentials; an error aborts the attempt
    async fn on_before(&self, _event: &BeforeEvent) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Returns entries to merge into the result map
    async fn on_success(&self, _event: &SuccessEvent) -> Result<ResultMap, ListenerError> {
        Ok(ResultMap::new())
    }

    /// Observes a failed attempt
    async fn on_failed(&self, _event: &FailedEvent<'_>) {}

    /// Observes a sign-out
    async fn on_exit(&self, _event: &ExitEvent) {}
}

/// Publishes lifecycle events to registered listeners, in order
#[derive(Clone, Default)]
pub struct AuthorizationEventPublisher {
    listeners: Vec<Arc<dyn AuthorizationListener>>,
}

impl AuthorizationEventPublisher {
    /// Creates a publisher without listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener after the existing ones
    pub fn with_listener(mut self, listener: Arc<dyn AuthorizationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Registers a listener after the existing ones
    pub fn register(&mut self, listener: Arc<dyn AuthorizationListener>) {
        self.listeners.push(listener);
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Runs the Decode stage; the first listener error aborts it
    pub async fn publish_decode(&self, mut event: DecodeEvent) -> Result<DecodeEvent, ListenerError> {
        for listener in &self.listeners {
            event = listener.on_decode(event).await?;
        }
        Ok(event)
    }

    /// Runs the Before stage; the first listener error aborts it
    pub async fn publish_before(&self, event: &BeforeEvent) -> Result<(), ListenerError> {
        for listener in &self.listeners {
            listener.on_before(event).await?;
        }
        Ok(())
    }

    /// Runs the Success stage and returns the enriched event
    ///
    /// The first listener error stops the stage and is returned; later
    /// listeners are not called.
    pub async fn publish_success(&self, mut event: SuccessEvent) -> Result<SuccessEvent, ListenerError> {
        for listener in &self.listeners {
            let additions = listener.on_success(&event).await?;
            event.result.extend(additions);
        }
        Ok(event)
    }

    /// Runs the Failed stage
    pub async fn publish_failed(&self, event: &FailedEvent<'_>) {
        for listener in &self.listeners {
            listener.on_failed(event).await;
        }
    }

    /// Runs the Exit stage
    pub async fn publish_exit(&self, event: &ExitEvent) {
        for listener in &self.listeners {
            listener.on_exit(event).await;
        }
    }
}

/// Logs every lifecycle stage
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

#[async_trait]
impl AuthorizationListener for LoggingListener {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_before(&self, event: &BeforeEvent) -> Result<(), ListenerError> {
        tracing::debug!(username = %event.credentials.username, "Login attempt");
        Ok(())
    }

    async fn on_success(&self, event: &SuccessEvent) -> Result<ResultMap, ListenerError> {
        tracing::info!(
            user_id = %event.authentication.user.id,
            username = %event.authentication.user.username,
            "Login succeeded"
        );
        Ok(ResultMap::new())
    }

    async fn on_failed(&self, event: &FailedEvent<'_>) {
        tracing::warn!(
            username = %event.credentials.username,
            reason = %event.reason,
            error = %event.error,
            "Login failed"
        );
    }

    async fn on_exit(&self, event: &ExitEvent) {
        tracing::info!(
            user_id = %event.authentication.user.id,
            username = %event.authentication.user.username,
            "User signed out"
        );
    }
}
