//! Database layer
//!
//! - `pool`: PostgreSQL connection pools, default and named
//! - `migrations`: embedded migration runner
//!
//! Which pool a query runs against is decided per call site by
//! [`crate::datasource::switcher::DataSourceSwitcher`].

pub mod migrations;
pub mod pool;
