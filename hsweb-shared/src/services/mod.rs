//! Services the login flow depends on
//!
//! - `user`: user lookup, in-memory and PostgreSQL backed

pub mod user;
