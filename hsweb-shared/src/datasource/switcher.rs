//! Datasource selection
//!
//! [`DataSourceSwitcher`] owns the default datasource, any number of named
//! ones and an ordered chain of [`StrategyMatcher`]s. The first matcher that
//! returns a strategy decides the route for a call site.
//!
//! # Selection rules
//!
//! | Strategy | Result |
//! |---|---|
//! | none | default |
//! | `use_default_data_source` | default |
//! | id registered | named datasource |
//! | id unknown, `fallback_default` | default |
//! | id unknown, no fallback | `DataSourceError::NotFound` |
//! | no id | default |

use std::collections::HashMap;

use super::strategy::{Strategy, StrategyMatcher};
use super::DataSourceError;

/// Which datasource a call was routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The default datasource
    Default,

    /// A registered named datasource
    Named(String),
}

/// Routes call sites to datasources of type `T`
pub struct DataSourceSwitcher<T> {
    default: T,
    sources: HashMap<String, T>,
    matchers: Vec<Box<dyn StrategyMatcher>>,
}

impl<T> DataSourceSwitcher<T> {
    /// Creates a switcher that routes everything to `default`
    pub fn new(default: T) -> Self {
        Self {
            default,
            sources: HashMap::new(),
            matchers: Vec::new(),
        }
    }

    /// Registers a named datasource
    pub fn with_data_source(mut self, id: impl Into<String>, data_source: T) -> Self {
        self.sources.insert(id.into(), data_source);
        self
    }

    /// Appends a matcher to the chain
    pub fn with_matcher(mut self, matcher: impl StrategyMatcher + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    /// The default datasource
    pub fn default_data_source(&self) -> &T {
        &self.default
    }

    /// A registered datasource by id
    pub fn data_source(&self, id: &str) -> Option<&T> {
        self.sources.get(id)
    }

    /// Ids of all registered named datasources
    pub fn data_source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// First strategy produced by the matcher chain
    pub fn strategy(&self, target: &str, method: &str) -> Option<Strategy> {
        self.matchers
            .iter()
            .find_map(|matcher| matcher.match_strategy(target, method))
    }

    /// Decides which datasource `target::method` uses
    pub fn resolve(&self, target: &str, method: &str) -> Result<Selection, DataSourceError> {
        let Some(strategy) = self.strategy(target, method) else {
            return Ok(Selection::Default);
        };

        if strategy.use_default_data_source() {
            return Ok(Selection::Default);
        }

        match strategy.data_source_id() {
            Some(id) if self.sources.contains_key(id) => Ok(Selection::Named(id.to_string())),
            Some(id) if strategy.fallback_default() => {
                tracing::warn!(
                    data_source = id,
                    target_type = target,
                    method,
                    "Datasource not registered, falling back to default"
                );
                Ok(Selection::Default)
            }
            Some(id) => Err(DataSourceError::NotFound(id.to_string())),
            None => Ok(Selection::Default),
        }
    }

    /// Returns the datasource `target::method` should use
    pub fn select(&self, target: &str, method: &str) -> Result<&T, DataSourceError> {
        let selection = self.resolve(target, method)?;
        tracing::debug!(target_type = target, method, selection = ?selection, "Switched datasource");

        match selection {
            Selection::Default => Ok(&self.default),
            Selection::Named(id) => self
                .sources
                .get(&id)
                .ok_or(DataSourceError::NotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::annotation::{AnnotationRegistry, UseDataSource, UseDefaultDataSource};
    use crate::datasource::strategy::AnnotationStrategyMatcher;

    fn switcher(registry: AnnotationRegistry) -> DataSourceSwitcher<&'static str> {
        DataSourceSwitcher::new("primary")
            .with_data_source("replica", "replica")
            .with_matcher(AnnotationStrategyMatcher::new(registry))
    }

    #[test]
    fn test_unmatched_call_uses_default() {
        let switcher = switcher(AnnotationRegistry::new());
        assert_eq!(switcher.resolve("UserService", "select").unwrap(), Selection::Default);
        assert_eq!(*switcher.select("UserService", "select").unwrap(), "primary");
    }

    #[test]
    fn test_registered_data_source_is_selected() {
        let mut registry = AnnotationRegistry::new();
        registry.annotate_type("UserService", UseDataSource::new("replica"));

        let switcher = switcher(registry);
        assert_eq!(*switcher.select("UserService", "select").unwrap(), "replica");
    }

    #[test]
    fn test_default_marker_wins() {
        let mut registry = AnnotationRegistry::new();
        registry
            .annotate_type("UserService", UseDataSource::new("replica"))
            .annotate_method("UserService", "insert", UseDefaultDataSource);

        let switcher = switcher(registry);
        assert_eq!(*switcher.select("UserService", "insert").unwrap(), "primary");
        assert_eq!(*switcher.select("UserService", "select").unwrap(), "replica");
    }

    #[test]
    fn test_unknown_data_source_with_fallback() {
        let mut registry = AnnotationRegistry::new();
        registry.annotate_type("UserService", UseDataSource::new("archive").fallback_default(true));

        let switcher = switcher(registry);
        assert_eq!(*switcher.select("UserService", "select").unwrap(), "primary");
    }

    #[test]
    fn test_unknown_data_source_without_fallback() {
        let mut registry = AnnotationRegistry::new();
        registry.annotate_type("UserService", UseDataSource::new("archive"));

        let switcher = switcher(registry);
        match switcher.select("UserService", "select") {
            Err(DataSourceError::NotFound(id)) => assert_eq!(id, "archive"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_first_matching_matcher_wins() {
        let mut first = AnnotationRegistry::new();
        first.annotate_type("UserService", UseDefaultDataSource);
        let mut second = AnnotationRegistry::new();
        second.annotate_type("UserService", UseDataSource::new("replica"));

        let switcher = DataSourceSwitcher::new("primary")
            .with_data_source("replica", "replica")
            .with_matcher(AnnotationStrategyMatcher::new(AnnotationRegistry::new()))
            .with_matcher(AnnotationStrategyMatcher::new(first))
            .with_matcher(AnnotationStrategyMatcher::new(second));

        assert!(switcher.strategy("UserService", "select").unwrap().use_default_data_source());
        assert_eq!(*switcher.select("UserService", "select").unwrap(), "primary");
    }

    #[test]
    fn test_registered_ids() {
        let switcher = switcher(AnnotationRegistry::new());
        assert_eq!(switcher.data_source_ids().collect::<Vec<_>>(), vec!["replica"]);
        assert_eq!(switcher.data_source("replica"), Some(&"replica"));
        assert_eq!(*switcher.default_data_source(), "primary");
    }
}
