//! # hsweb Shared Library
//!
//! Datasource routing, user lookup and the authorization flow shared by the
//! hsweb API server.
//!
//! ## Module Organization
//!
//! - `datasource`: call-site datasource strategies and the switcher
//! - `auth`: login lifecycle, tokens and authentication middleware
//! - `services`: user lookup services
//! - `models`: database models
//! - `db`: connection pools and migrations

pub mod auth;
pub mod datasource;
pub mod db;
pub mod models;
pub mod services;

/// Current version of the hsweb shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
