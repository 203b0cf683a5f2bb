//! Datasource markers and the registry that holds them
//!
//! Two marker kinds exist:
//!
//! - [`UseDataSource`]: route the call to a named datasource, optionally
//!   falling back to the default one when the name is not registered
//! - [`UseDefaultDataSource`]: always route the call to the default datasource
//!
//! Markers are attached to a type or to a `(type, method)` pair. Types may
//! declare supertypes (the traits or base services they implement), and
//! lookups walk that hierarchy the same way for every marker kind:
//!
//! 1. the method on the target type
//! 2. the target type itself
//! 3. the same method on each supertype, breadth-first
//! 4. each supertype itself, breadth-first
//!
//! # Routing table files
//!
//! A [`RoutingTable`] can be loaded from any format the `config` crate
//! understands. A TOML example:
//!
//! ```toml
//! [[rules]]
//! target = "UserService"
//! data_source = "replica"
//! fallback_default = true
//!
//! [[rules]]
//! target = "UserService"
//! method = "insert"
//! use_default = true
//!
//! [[supertypes]]
//! target = "PgUserService"
//! extends = ["UserService"]
//!
//! [[data_sources]]
//! id = "replica"
//! url = "postgresql://reader@replica/hsweb"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;

use super::DataSourceError;

/// Routes a call to a named datasource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseDataSource {
    /// Datasource identifier
    pub value: String,

    /// Use the default datasource when `value` is not registered
    #[serde(default)]
    pub fallback_default: bool,
}

impl UseDataSource {
    /// Creates a marker for the given datasource without fallback
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            fallback_default: false,
        }
    }

    /// Sets whether the default datasource may be used instead
    pub fn fallback_default(mut self, fallback: bool) -> Self {
        self.fallback_default = fallback;
        self
    }
}

impl fmt::Display for UseDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UseDataSource(value={}, fallback_default={})",
            self.value, self.fallback_default
        )
    }
}

/// Routes a call to the default datasource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseDefaultDataSource;

impl fmt::Display for UseDefaultDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UseDefaultDataSource")
    }
}

/// Markers attached to a single type or method
#[derive(Debug, Clone, Default)]
pub struct AnnotationSet {
    use_data_source: Option<UseDataSource>,
    use_default_data_source: Option<UseDefaultDataSource>,
}

impl AnnotationSet {
    fn is_empty(&self) -> bool {
        self.use_data_source.is_none() && self.use_default_data_source.is_none()
    }
}

/// A marker kind that can be stored in and looked up from the registry
pub trait Annotation: fmt::Debug + Sized {
    /// Returns this kind's marker from the set, if attached
    fn select(set: &AnnotationSet) -> Option<&Self>;

    /// Attaches the marker to the set, replacing one of the same kind
    fn attach(self, set: &mut AnnotationSet);
}

impl Annotation for UseDataSource {
    fn select(set: &AnnotationSet) -> Option<&Self> {
        set.use_data_source.as_ref()
    }

    fn attach(self, set: &mut AnnotationSet) {
        set.use_data_source = Some(self);
    }
}

impl Annotation for UseDefaultDataSource {
    fn select(set: &AnnotationSet) -> Option<&Self> {
        set.use_default_data_source.as_ref()
    }

    fn attach(self, set: &mut AnnotationSet) {
        set.use_default_data_source = Some(self);
    }
}

/// Statically registered datasource markers
#[derive(Debug, Clone, Default)]
pub struct AnnotationRegistry {
    types: HashMap<String, AnnotationSet>,
    methods: HashMap<String, HashMap<String, AnnotationSet>>,
    supertypes: HashMap<String, Vec<String>>,
}

impl AnnotationRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a marker to every method of `target`
    pub fn annotate_type<A: Annotation>(&mut self, target: impl Into<String>, annotation: A) -> &mut Self {
        annotation.attach(self.types.entry(target.into()).or_default());
        self
    }

    /// Attaches a marker to one method of `target`
    pub fn annotate_method<A: Annotation>(
        &mut self,
        target: impl Into<String>,
        method: impl Into<String>,
        annotation: A,
    ) -> &mut Self {
        let set = self
            .methods
            .entry(target.into())
            .or_default()
            .entry(method.into())
            .or_default();
        annotation.attach(set);
        self
    }

    /// Declares that `target` inherits markers from `supertype`
    pub fn add_supertype(&mut self, target: impl Into<String>, supertype: impl Into<String>) -> &mut Self {
        let parents = self.supertypes.entry(target.into()).or_default();
        let supertype = supertype.into();
        if !parents.contains(&supertype) {
            parents.push(supertype);
        }
        self
    }

    /// Finds the marker of kind `A` that applies to `target::method`
    ///
    /// See the module docs for the lookup precedence.
    pub fn find_annotation<A: Annotation>(&self, target: &str, method: &str) -> Option<&A> {
        if let Some(found) = self.method_annotation::<A>(target, method) {
            return Some(found);
        }
        if let Some(found) = self.type_annotation::<A>(target) {
            return Some(found);
        }

        let ancestors = self.ancestors(target);
        for ancestor in &ancestors {
            if let Some(found) = self.method_annotation::<A>(ancestor, method) {
                return Some(found);
            }
        }
        for ancestor in &ancestors {
            if let Some(found) = self.type_annotation::<A>(ancestor) {
                return Some(found);
            }
        }
        None
    }

    /// Returns true if no marker has been registered
    pub fn is_empty(&self) -> bool {
        self.types.values().all(AnnotationSet::is_empty)
            && self
                .methods
                .values()
                .flat_map(|methods| methods.values())
                .all(AnnotationSet::is_empty)
    }

    fn method_annotation<A: Annotation>(&self, target: &str, method: &str) -> Option<&A> {
        self.methods
            .get(target)
            .and_then(|methods| methods.get(method))
            .and_then(A::select)
    }

    fn type_annotation<A: Annotation>(&self, target: &str) -> Option<&A> {
        self.types.get(target).and_then(A::select)
    }

    /// Supertypes of `target` in breadth-first order, each listed once
    fn ancestors(&self, target: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::from([target]);
        let mut queue: VecDeque<&str> = VecDeque::from([target]);
        let mut ancestors = Vec::new();

        while let Some(current) = queue.pop_front() {
            let Some(parents) = self.supertypes.get(current) else {
                continue;
            };
            for parent in parents {
                if seen.insert(parent.as_str()) {
                    ancestors.push(parent.clone());
                    queue.push_back(parent.as_str());
                }
            }
        }

        ancestors
    }
}

/// One marker declaration in a routing table file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Type the marker is attached to
    pub target: String,

    /// Method the marker is attached to; the whole type when absent
    #[serde(default)]
    pub method: Option<String>,

    /// Datasource for a `UseDataSource` marker
    #[serde(default)]
    pub data_source: Option<String>,

    /// Fallback flag of the `UseDataSource` marker
    #[serde(default)]
    pub fallback_default: bool,

    /// Attach a `UseDefaultDataSource` marker
    #[serde(default)]
    pub use_default: bool,
}

/// Supertype declaration in a routing table file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupertypeRule {
    /// Concrete type
    pub target: String,

    /// Types it inherits markers from, in lookup order
    #[serde(default)]
    pub extends: Vec<String>,
}

/// Named datasource declared in a routing table file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceDefinition {
    /// Name markers refer to
    pub id: String,

    /// Connection URL
    pub url: String,

    /// Pool size; the default pool's size when absent
    #[serde(default)]
    pub max_connections: Option<u32>,
}

/// Serializable description of an [`AnnotationRegistry`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    /// Marker declarations
    #[serde(default)]
    pub rules: Vec<RoutingRule>,

    /// Supertype declarations
    #[serde(default)]
    pub supertypes: Vec<SupertypeRule>,

    /// Named datasources to register next to the default one
    #[serde(default)]
    pub data_sources: Vec<DataSourceDefinition>,
}

impl RoutingTable {
    /// Loads a routing table from a file (TOML, JSON, YAML, ...)
    ///
    /// The format is picked from the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DataSourceError> {
        let table = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?
            .try_deserialize::<RoutingTable>()?;

        Ok(table)
    }

    /// Builds the registry described by this table
    pub fn into_registry(self) -> AnnotationRegistry {
        let mut registry = AnnotationRegistry::new();

        for rule in self.rules {
            if rule.data_source.is_none() && !rule.use_default {
                tracing::warn!(
                    target_type = %rule.target,
                    method = ?rule.method,
                    "Routing rule declares no datasource marker, ignoring"
                );
                continue;
            }

            if let Some(id) = rule.data_source {
                let marker = UseDataSource::new(id).fallback_default(rule.fallback_default);
                match &rule.method {
                    Some(method) => registry.annotate_method(rule.target.clone(), method.clone(), marker),
                    None => registry.annotate_type(rule.target.clone(), marker),
                };
            }

            if rule.use_default {
                match rule.method {
                    Some(method) => registry.annotate_method(rule.target, method, UseDefaultDataSource),
                    None => registry.annotate_type(rule.target, UseDefaultDataSource),
                };
            }
        }

        for supertype in self.supertypes {
            for parent in supertype.extends {
                registry.add_supertype(supertype.target.clone(), parent);
            }
        }

        registry
    }
}
