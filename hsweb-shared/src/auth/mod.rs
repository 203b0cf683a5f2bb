//! Authentication and authorization
//!
//! # Modules
//!
//! - [`password`]: Argon2id password hashing
//! - [`authentication`]: resolved identities and the authentication manager
//! - [`events`]: login lifecycle events and listeners
//! - [`login`]: the login and sign-out flow
//! - [`jwt`]: JWT token generation and validation
//! - [`token`]: signed-in token store and the listener that feeds it
//! - [`middleware`]: bearer token middleware for Axum
//!
//! # Example
//!
//! ```no_run
//! use hsweb_shared::auth::authentication::UserAuthenticationManager;
//! use hsweb_shared::auth::events::{AuthorizationEventPublisher, LoggingListener, Parameters};
//! use hsweb_shared::auth::login::AuthorizationService;
//! use hsweb_shared::services::user::InMemoryUserService;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let users = Arc::new(InMemoryUserService::new());
//! let events = AuthorizationEventPublisher::new().with_listener(Arc::new(LoggingListener));
//! let service = AuthorizationService::new(
//!     users.clone(),
//!     Arc::new(UserAuthenticationManager::new(users)),
//!     Arc::new(events),
//! );
//!
//! let result = service
//!     .login("admin".to_string(), "admin".to_string(), Parameters::default())
//!     .await?;
//! println!("Logged in as {}", result["userId"]);
//! # Ok(())
//! # }
//! ```

pub mod authentication;
pub mod events;
pub mod jwt;
pub mod login;
pub mod middleware;
pub mod password;
pub mod token;
