//! Database models
//!
//! - `user`: user accounts and their status

pub mod user;
