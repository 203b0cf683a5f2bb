//! Authorization endpoints
//!
//! # Endpoints
//!
//! - `POST /{base}/login` - Login with a JSON or form-encoded body
//! - `GET /{base}/me` - Current authentication
//! - `GET /{base}/login-out`, `/{base}/sign-out`, `/{base}/exit` - Sign out
//!
//! `{base}` is `AUTHORIZE_MAPPING`, "authorize" by default.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    response::ResponseMessage,
};
use axum::{
    async_trait,
    extract::{FromRequest, Query, Request, State},
    http::{header, StatusCode},
    Form, Json,
};
use hsweb_shared::auth::{
    authentication::Authentication,
    events::{Parameters, ResultMap},
    middleware::CurrentAuthentication,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use validator::Validate;

/// Raw login parameters, from either body encoding
///
/// A JSON body must be an object. A form body is merged over the query
/// string, so a form field wins over a query parameter of the same name.
#[derive(Debug, Clone, Default)]
pub struct LoginParameters(pub HashMap<String, Value>);

#[async_trait]
impl<S> FromRequest<S> for LoginParameters
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase());

        let mut values: HashMap<String, Value> = Query::<HashMap<String, String>>::try_from_uri(req.uri())
            .map(|Query(query)| query.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
            .unwrap_or_default();

        match content_type.as_deref() {
            Some(ct) if ct.starts_with("application/json") => {
                let Json(body) = Json::<Value>::from_request(req, state)
                    .await
                    .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

                match body {
                    Value::Object(map) => Ok(Self(map.into_iter().collect())),
                    _ => Err(ApiError::BadRequest("Login body must be a JSON object".to_string())),
                }
            }
            Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
                let Form(form) = Form::<HashMap<String, String>>::from_request(req, state)
                    .await
                    .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

                values.extend(form.into_iter().map(|(k, v)| (k, Value::String(v))));
                Ok(Self(values))
            }
            // Query-string only login
            None => Ok(Self(values)),
            Some(other) => Err(ApiError::Business {
                status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
                message: format!("Unsupported content type: {}", other),
            }),
        }
    }
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Login name
    #[serde(default)]
    #[validate(length(min = 1, message = "username must not be empty"))]
    pub username: String,

    /// Password
    #[serde(default)]
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub password: String,
}

impl LoginRequest {
    /// Picks `username` and `password` out of the raw parameters
    ///
    /// Missing or non-string values become empty strings and fail validation.
    pub fn from_parameters(parameters: &Parameters) -> Self {
        Self {
            username: parameters.get_str("username").unwrap_or_default().to_string(),
            password: parameters.get_str("password").unwrap_or_default().to_string(),
        }
    }
}

/// Login
///
/// # Endpoint
///
/// ```text
/// POST /authorize/login
/// Content-Type: application/json
///
/// { "username": "admin", "password": "admin" }
/// ```
///
/// or
///
/// ```text
/// POST /authorize/login?remember=true
/// Content-Type: application/x-www-form-urlencoded
///
/// username=admin&password=admin
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": 200,
///   "message": "success",
///   "result": { "userId": "...", "token": "...", "expiresAt": 1700000000000 },
///   "timestamp": 1700000000000
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: username or password empty
/// - `404 Not Found`: no user matches the credentials
/// - `400 Bad Request`: the user is disabled
pub async fn login(
    State(state): State<AppState>,
    LoginParameters(values): LoginParameters,
) -> ApiResult<ResponseMessage<ResultMap>> {
    let parameters = Parameters::new(values);
    let request = LoginRequest::from_parameters(&parameters);
    request.validate()?;

    let result = state
        .authorization
        .login(request.username, request.password, parameters)
        .await?;

    Ok(ResponseMessage::ok(result))
}

/// Current authentication
pub async fn me(current: CurrentAuthentication) -> ResponseMessage<Authentication> {
    ResponseMessage::ok(current.authentication)
}

/// Sign out
///
/// Publishes the Exit event; the token stops working once the token
/// listener has handled it.
pub async fn exit(State(state): State<AppState>, current: CurrentAuthentication) -> ResponseMessage<()> {
    tracing::debug!(user_id = %current.authentication.user.id, "Signing out");

    state
        .authorization
        .exit(current.authentication, current.token)
        .await;

    ResponseMessage::ok_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parameters(values: &[(&str, Value)]) -> Parameters {
        Parameters::new(values.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn test_login_request_from_parameters() {
        let request = LoginRequest::from_parameters(&parameters(&[
            ("username", json!("admin")),
            ("password", json!("admin")),
            ("remember", json!(true)),
        ]));

        assert_eq!(request.username, "admin");
        assert_eq!(request.password, "admin");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_fail_validation() {
        let request = LoginRequest::from_parameters(&parameters(&[("username", json!(42))]));

        assert!(request.username.is_empty());
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("password"));
    }
}
