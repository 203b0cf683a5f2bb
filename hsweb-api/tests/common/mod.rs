//! Common test utilities for integration tests
//!
//! Builds the full router over an in-memory user store with:
//! - `admin` / `admin`: enabled
//! - `disabled` / `disabled`: disabled
//!
//! and a [`RecordingListener`] that remembers every lifecycle stage.

#![allow(dead_code)]

use axum::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use hsweb_api::app::{build_router, AppState};
use hsweb_api::config::Config;
use hsweb_shared::auth::events::{
    AuthorizationListener, BeforeEvent, DecodeEvent, ExitEvent, FailedEvent, ListenerError, ResultMap, SuccessEvent,
};
use hsweb_shared::models::user::{CreateUser, DataStatus, UserEntity};
use hsweb_shared::services::user::{InMemoryUserService, UserService};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret-key-at-least-32-bytes-long";

/// Lifecycle stage seen by the recording listener
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Decode { username: String },
    Before { username: String },
    Success { user_id: String },
    Failed { reason: String },
    Exit { token: Option<String> },
}

/// Records every stage it is notified of
#[derive(Default)]
pub struct RecordingListener {
    stages: Mutex<Vec<Stage>>,
}

impl RecordingListener {
    pub fn stages(&self) -> Vec<Stage> {
        self.stages.lock().unwrap().clone()
    }

    fn push(&self, stage: Stage) {
        self.stages.lock().unwrap().push(stage);
    }
}

#[async_trait]
impl AuthorizationListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_decode(&self, event: DecodeEvent) -> Result<DecodeEvent, ListenerError> {
        self.push(Stage::Decode {
            username: event.credentials.username.clone(),
        });
        Ok(event)
    }

    async fn on_before(&self, event: &BeforeEvent) -> Result<(), ListenerError> {
        self.push(Stage::Before {
            username: event.credentials.username.clone(),
        });
        Ok(())
    }

    async fn on_success(&self, event: &SuccessEvent) -> Result<ResultMap, ListenerError> {
        self.push(Stage::Success {
            user_id: event.authentication.user.id.to_string(),
        });
        Ok(ResultMap::new())
    }

    async fn on_failed(&self, event: &FailedEvent<'_>) {
        self.push(Stage::Failed {
            reason: event.reason.to_string(),
        });
    }

    async fn on_exit(&self, event: &ExitEvent) {
        self.push(Stage::Exit {
            token: event.token.clone(),
        });
    }
}

/// Test context containing all necessary resources
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub users: Arc<InMemoryUserService>,
    pub recorder: Arc<RecordingListener>,
    pub admin: UserEntity,
    pub disabled: UserEntity,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_listeners(Vec::new()).await
    }

    /// Context with extra listeners registered after the recorder
    pub async fn with_listeners(extra: Vec<Arc<dyn AuthorizationListener>>) -> Self {
        let config = Config::from_lookup(|key| match key {
            "JWT_SECRET" => Some(JWT_SECRET.to_string()),
            _ => None,
        })
        .unwrap();

        let users = Arc::new(InMemoryUserService::new());
        let admin = users
            .insert(CreateUser::with_password("admin", "Administrator", "admin", vec!["admin".into()]).unwrap())
            .await
            .unwrap();
        let disabled = users
            .insert(CreateUser::with_password("disabled", "Disabled User", "disabled", vec![]).unwrap())
            .await
            .unwrap();
        users.update_status(disabled.id, DataStatus::Disabled).await.unwrap();

        let recorder = Arc::new(RecordingListener::default());
        let recording: Arc<dyn AuthorizationListener> = recorder.clone();
        let mut listeners = vec![recording];
        listeners.extend(extra);

        let state = AppState::with_listeners(config, users.clone(), listeners);
        let app = build_router(state.clone());

        Self {
            app,
            state,
            users,
            recorder,
            admin,
            disabled,
        }
    }

    /// Sends a request through the router, returning status and JSON body
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn login_json(&self, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri("/authorize/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn login_form(&self, query: &str, form: &str) -> (StatusCode, Value) {
        let uri = if query.is_empty() {
            "/authorize/login".to_string()
        } else {
            format!("/authorize/login?{}", query)
        };

        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Logs in as admin and returns the issued token
    pub async fn admin_token(&self) -> String {
        let (status, body) = self
            .login_json(serde_json::json!({ "username": "admin", "password": "admin" }))
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["result"]["token"].as_str().unwrap().to_string()
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}
