//! Datasource routing
//!
//! Call sites declare which datasource they prefer through markers held in
//! a statically registered [`annotation::AnnotationRegistry`]. Matchers turn
//! those markers into a [`strategy::Strategy`], and a
//! [`switcher::DataSourceSwitcher`] maps the strategy onto a concrete
//! datasource.
//!
//! # Modules
//!
//! - [`annotation`]: `UseDataSource` / `UseDefaultDataSource` markers, the
//!   registry and the serde-loadable routing table
//! - [`strategy`]: strategy type, matcher trait, annotation and cached matchers
//! - [`switcher`]: datasource selection with default fallback
//!
//! # Example
//!
//! ```
//! use hsweb_shared::datasource::annotation::{AnnotationRegistry, UseDataSource};
//! use hsweb_shared::datasource::strategy::{AnnotationStrategyMatcher, StrategyMatcher};
//!
//! let mut registry = AnnotationRegistry::new();
//! registry.annotate_type("ReportService", UseDataSource::new("replica").fallback_default(true));
//!
//! let matcher = AnnotationStrategyMatcher::new(registry);
//! let strategy = matcher.match_strategy("ReportService", "monthly").unwrap();
//! assert_eq!(strategy.data_source_id(), Some("replica"));
//! assert!(strategy.fallback_default());
//! ```

pub mod annotation;
pub mod strategy;
pub mod switcher;

/// Error type for datasource routing
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    /// A strategy named a datasource that is not registered and
    /// does not allow falling back to the default one
    #[error("Datasource not found: {0}")]
    NotFound(String),

    /// The routing table could not be loaded or parsed
    #[error("Invalid routing table: {0}")]
    InvalidRoutingTable(String),
}

impl From<config::ConfigError> for DataSourceError {
    fn from(err: config::ConfigError) -> Self {
        DataSourceError::InvalidRoutingTable(err.to_string())
    }
}
