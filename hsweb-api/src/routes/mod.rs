//! API route handlers
//!
//! - `health`: Health check endpoint
//! - `authorize`: Login, sign-out and current authentication

pub mod authorize;
pub mod health;
