//! Success envelope
//!
//! Every successful response of the authorization routes is wrapped as:
//!
//! ```json
//! { "status": 200, "message": "success", "result": { ... }, "timestamp": 1700000000000 }
//! ```
//!
//! `result` is omitted when there is nothing to return.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage<T> {
    /// HTTP status code, always 200
    pub status: u16,

    /// Always "success"
    pub message: String,

    /// Payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,

    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

impl<T> ResponseMessage<T> {
    /// Wraps a payload
    pub fn ok(result: T) -> Self {
        Self::new(Some(result))
    }

    fn new(result: Option<T>) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            message: "success".to_string(),
            result,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

impl ResponseMessage<()> {
    /// Envelope without payload
    pub fn ok_empty() -> Self {
        Self::new(None)
    }
}

impl<T: Serialize> IntoResponse for ResponseMessage<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_envelope() {
        let value = serde_json::to_value(ResponseMessage::ok(json!({ "userId": "u1" }))).unwrap();

        assert_eq!(value["status"], 200);
        assert_eq!(value["message"], "success");
        assert_eq!(value["result"]["userId"], "u1");
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_empty_envelope_omits_result() {
        let value = serde_json::to_value(ResponseMessage::ok_empty()).unwrap();

        assert_eq!(value["status"], 200);
        assert!(value.get("result").is_none());
    }
}
