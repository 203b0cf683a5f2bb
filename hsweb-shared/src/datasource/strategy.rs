//! Datasource switch strategies and the matchers that produce them
//!
//! A [`Strategy`] describes where a single call site should be routed. It is
//! produced by a [`StrategyMatcher`] from a `(target type, method)` pair; a
//! matcher returning `None` lets the caller fall through to the next matcher
//! or to the default datasource.

use dashmap::DashMap;
use std::fmt;

use super::annotation::{AnnotationRegistry, UseDataSource, UseDefaultDataSource};

/// Routing decision for one call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    use_default_data_source: bool,
    fallback_default: bool,
    data_source_id: Option<String>,
    source: String,
}

impl Strategy {
    /// Builds a strategy from the markers found for a call site
    ///
    /// Returns `None` when neither marker is present.
    pub fn from_annotations(
        use_data_source: Option<&UseDataSource>,
        use_default_data_source: Option<&UseDefaultDataSource>,
    ) -> Option<Self> {
        let source = match (use_data_source, use_default_data_source) {
            (None, None) => return None,
            (Some(marker), _) => marker.to_string(),
            (None, Some(marker)) => marker.to_string(),
        };

        Some(Self {
            use_default_data_source: use_default_data_source.is_some(),
            fallback_default: use_data_source.is_some_and(|marker| marker.fallback_default),
            data_source_id: use_data_source.map(|marker| marker.value.clone()),
            source,
        })
    }

    /// Whether the call must use the default datasource
    pub fn use_default_data_source(&self) -> bool {
        self.use_default_data_source
    }

    /// Whether the default datasource may replace a missing named one
    pub fn fallback_default(&self) -> bool {
        self.fallback_default
    }

    /// Named datasource, if one was requested
    pub fn data_source_id(&self) -> Option<&str> {
        self.data_source_id.as_deref()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Annotation Strategy({})", self.source)
    }
}

/// Produces a routing strategy for a call site
pub trait StrategyMatcher: Send + Sync {
    /// Returns the strategy for `target::method`, or `None` if this
    /// matcher has no opinion about the call site
    fn match_strategy(&self, target: &str, method: &str) -> Option<Strategy>;
}

/// Matcher backed by the datasource markers of an [`AnnotationRegistry`]
#[derive(Debug, Clone, Default)]
pub struct AnnotationStrategyMatcher {
    registry: AnnotationRegistry,
}

impl AnnotationStrategyMatcher {
    /// Creates a matcher over the given registry
    pub fn new(registry: AnnotationRegistry) -> Self {
        Self { registry }
    }

    /// Registry consulted by this matcher
    pub fn registry(&self) -> &AnnotationRegistry {
        &self.registry
    }

    /// Looks up both marker kinds independently and combines them
    pub fn create_strategy_if_match(&self, target: &str, method: &str) -> Option<Strategy> {
        let use_data_source = self.registry.find_annotation::<UseDataSource>(target, method);
        let use_default_data_source = self
            .registry
            .find_annotation::<UseDefaultDataSource>(target, method);

        Strategy::from_annotations(use_data_source, use_default_data_source)
    }
}

impl StrategyMatcher for AnnotationStrategyMatcher {
    fn match_strategy(&self, target: &str, method: &str) -> Option<Strategy> {
        self.create_strategy_if_match(target, method)
    }
}

/// Memoizes another matcher's results per `(target, method)` pair
///
/// "No match" results are cached as well. Safe because matchers are pure:
/// the same call site always yields an equivalent strategy.
pub struct CachedStrategyMatcher<M> {
    inner: M,
    cache: DashMap<(String, String), Option<Strategy>>,
}

impl<M: StrategyMatcher> CachedStrategyMatcher<M> {
    /// Wraps `inner` with an empty cache
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    /// Number of cached call sites
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns true if nothing has been cached yet
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drops every cached result
    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl<M: StrategyMatcher> StrategyMatcher for CachedStrategyMatcher<M> {
    fn match_strategy(&self, target: &str, method: &str) -> Option<Strategy> {
        let key = (target.to_owned(), method.to_owned());
        if let Some(cached) = self.cache.get(&key) {
            return cached.value().clone();
        }

        let strategy = self.inner.match_strategy(target, method);
        tracing::trace!(target_type = target, method, strategy = ?strategy, "Cached datasource strategy");
        self.cache.insert(key, strategy.clone());
        strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn matcher(registry: AnnotationRegistry) -> AnnotationStrategyMatcher {
        AnnotationStrategyMatcher::new(registry)
    }

    #[test]
    fn test_no_markers_no_strategy() {
        let mut registry = AnnotationRegistry::new();
        registry.annotate_type("Other", UseDefaultDataSource);

        assert!(matcher(registry).match_strategy("UserService", "insert").is_none());
    }

    #[test]
    fn test_default_marker_only() {
        let mut registry = AnnotationRegistry::new();
        registry.annotate_method("UserService", "insert", UseDefaultDataSource);

        let strategy = matcher(registry).match_strategy("UserService", "insert").unwrap();
        assert!(strategy.use_default_data_source());
        assert!(!strategy.fallback_default());
        assert_eq!(strategy.data_source_id(), None);
    }

    #[test]
    fn test_explicit_marker_only() {
        for fallback in [true, false] {
            let mut registry = AnnotationRegistry::new();
            registry.annotate_type(
                "UserService",
                UseDataSource::new("replica").fallback_default(fallback),
            );

            let strategy = matcher(registry).match_strategy("UserService", "select").unwrap();
            assert!(!strategy.use_default_data_source());
            assert_eq!(strategy.data_source_id(), Some("replica"));
            assert_eq!(strategy.fallback_default(), fallback);
        }
    }

    #[test]
    fn test_both_markers() {
        let mut registry = AnnotationRegistry::new();
        registry
            .annotate_type("UserService", UseDataSource::new("replica").fallback_default(true))
            .annotate_method("UserService", "insert", UseDefaultDataSource);

        let strategy = matcher(registry).match_strategy("UserService", "insert").unwrap();
        assert!(strategy.use_default_data_source());
        assert!(strategy.fallback_default());
        assert_eq!(strategy.data_source_id(), Some("replica"));
    }

    #[test]
    fn test_strategy_display_names_marker() {
        let mut registry = AnnotationRegistry::new();
        registry.annotate_type("UserService", UseDataSource::new("replica"));

        let strategy = matcher(registry).match_strategy("UserService", "select").unwrap();
        assert_eq!(
            strategy.to_string(),
            "Annotation Strategy(UseDataSource(value=replica, fallback_default=false))"
        );
    }

    struct CountingMatcher {
        calls: AtomicUsize,
        inner: AnnotationStrategyMatcher,
    }

    impl StrategyMatcher for CountingMatcher {
        fn match_strategy(&self, target: &str, method: &str) -> Option<Strategy> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.match_strategy(target, method)
        }
    }

    #[test]
    fn test_cached_matcher_consults_inner_once() {
        let mut registry = AnnotationRegistry::new();
        registry.annotate_type("UserService", UseDataSource::new("replica"));

        let cached = CachedStrategyMatcher::new(CountingMatcher {
            calls: AtomicUsize::new(0),
            inner: matcher(registry),
        });

        let first = cached.match_strategy("UserService", "select");
        let second = cached.match_strategy("UserService", "select");
        assert_eq!(first, second);
        assert!(first.is_some());

        assert!(cached.match_strategy("Other", "select").is_none());
        assert!(cached.match_strategy("Other", "select").is_none());

        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.len(), 2);

        cached.clear();
        assert!(cached.is_empty());
    }
}
