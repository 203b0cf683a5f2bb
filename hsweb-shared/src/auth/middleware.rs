//! Authentication middleware for Axum
//!
//! [`token_auth_middleware`] validates the `Authorization: Bearer <token>`
//! header, checks that the token is still signed in, resolves the user's
//! [`Authentication`] and adds a [`CurrentAuthentication`] to the request
//! extensions. Handlers receive it as an extractor argument.
//!
//! # Example
//!
//! ```no_run
//! use axum::{middleware, routing::get, Router};
//! use hsweb_shared::auth::middleware::{token_auth_middleware, CurrentAuthentication, TokenAuthState};
//!
//! async fn me(current: CurrentAuthentication) -> String {
//!     format!("Hello, {}!", current.authentication.user.name)
//! }
//!
//! fn routes(state: TokenAuthState) -> Router {
//!     Router::new()
//!         .route("/me", get(me))
//!         .layer(middleware::from_fn_with_state(state, token_auth_middleware))
//! }
//! ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::authentication::{Authentication, AuthenticationError, AuthenticationManager};
use super::jwt::{validate_token, JwtError};
use super::token::UserTokenManager;

/// Authentication of the user making the current request
#[derive(Debug, Clone)]
pub struct CurrentAuthentication {
    /// Resolved identity
    pub authentication: Authentication,

    /// Bearer token the request was made with
    pub token: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentAuthentication
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentAuthentication>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

/// Error type for authentication middleware
#[derive(Debug)]
pub enum AuthError {
    /// Missing authorization header
    MissingCredentials,

    /// Invalid authorization header format
    InvalidFormat(String),

    /// Token validation failed or the token is no longer signed in
    InvalidToken(String),

    /// Authentication lookup failed
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AuthError::MissingCredentials => (StatusCode::UNAUTHORIZED, "unauthorized", "Missing credentials".to_string()),
            AuthError::InvalidFormat(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AuthError::InvalidToken(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AuthError::Internal(msg) => {
                tracing::error!(error = %msg, "Authentication lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "status": status.as_u16(),
            "error": error,
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Extracts the bearer token from the `Authorization` header
///
/// Returns `Ok(None)` when the header is absent.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("Authorization header is not valid ASCII".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

    Ok(Some(token.trim()))
}

/// Everything [`token_auth_middleware`] needs
#[derive(Clone)]
pub struct TokenAuthState {
    /// JWT signing secret
    pub secret: Arc<str>,

    /// Signed-in tokens
    pub tokens: Arc<UserTokenManager>,

    /// Resolves the token owner's authentication
    pub authentication_manager: Arc<dyn AuthenticationManager>,
}

/// Token authentication middleware
///
/// # Errors
///
/// Returns 401 Unauthorized if:
/// - Authorization header is missing
/// - Token validation fails or the token has expired
/// - Token was signed out
/// - Token owner no longer exists
///
/// Returns 400 Bad Request for a malformed header.
pub async fn token_auth_middleware(
    State(state): State<TokenAuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers())?
        .ok_or(AuthError::MissingCredentials)?
        .to_string();

    let claims = validate_token(&token, &state.secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        JwtError::InvalidIssuer { .. } => AuthError::InvalidToken("Invalid issuer".to_string()),
        _ => AuthError::InvalidToken(format!("Invalid token: {}", e)),
    })?;

    let signed_in = state
        .tokens
        .get(&token)
        .ok_or_else(|| AuthError::InvalidToken("Token is not signed in".to_string()))?;
    if signed_in.user_id != claims.sub {
        return Err(AuthError::InvalidToken("Token owner mismatch".to_string()));
    }
    state.tokens.touch(&token);

    let authentication = state
        .authentication_manager
        .get_by_user_id(claims.sub)
        .await
        .map_err(|e| match e {
            AuthenticationError::UserNotFound(_) => AuthError::InvalidToken("User no longer exists".to_string()),
            other => AuthError::Internal(other.to_string()),
        })?;

    req.extensions_mut().insert(CurrentAuthentication {
        authentication,
        token: Some(token),
    });

    Ok(next.run(req).await)
}
