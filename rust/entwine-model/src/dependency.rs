//! Dependency edges and derived-value dependencies.

use crate::ident::TypeName;
use crate::path::PropertyPath;

/// Controls how far a change propagates across a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReindexPolicy {
    /// A change on the source causes full re-derivation of the target's
    /// document, and the traversal is re-seeded from the target as if all of
    /// its properties had changed.
    Full,
    /// The target is re-derived, but propagation stops there: only directly
    /// embedded fields are refreshed, nothing further.
    Shallow,
    /// The dependency is declared but intentionally inert; a change never
    /// propagates across it.
    None,
}

/// Connects a source type's property path to a target type.
///
/// The edge fires when a changed property of the source type overlaps the
/// edge's source path. `embedding_path` is the path on the target through
/// which the source is embedded; the association navigator uses it to find
/// the target identifiers that embed a given source entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    source_type: TypeName,
    source_path: PropertyPath,
    target_type: TypeName,
    embedding_path: PropertyPath,
    policy: ReindexPolicy,
    depth_limit: Option<u32>,
}

impl DependencyEdge {
    pub fn new(
        source_type: impl Into<TypeName>,
        source_path: PropertyPath,
        target_type: impl Into<TypeName>,
        embedding_path: PropertyPath,
        policy: ReindexPolicy,
    ) -> DependencyEdge {
        DependencyEdge {
            source_type: source_type.into(),
            source_path,
            target_type: target_type.into(),
            embedding_path,
            policy,
            depth_limit: None,
        }
    }

    /// Bounds the number of indexed-embedding hops this edge may be
    /// traversed within one resolution branch. Once exhausted, the edge
    /// behaves as [`ReindexPolicy::None`] for the rest of that branch.
    pub fn with_depth_limit(mut self, depth: u32) -> DependencyEdge {
        self.depth_limit = Some(depth);
        self
    }

    pub fn source_type(&self) -> &TypeName {
        &self.source_type
    }

    pub fn source_path(&self) -> &PropertyPath {
        &self.source_path
    }

    pub fn target_type(&self) -> &TypeName {
        &self.target_type
    }

    pub fn embedding_path(&self) -> &PropertyPath {
        &self.embedding_path
    }

    pub fn policy(&self) -> ReindexPolicy {
        self.policy
    }

    pub fn depth_limit(&self) -> Option<u32> {
        self.depth_limit
    }

    /// Whether a change to the given property fires this edge: the edge's
    /// source path must be a prefix of (or equal to) the changed property,
    /// or the changed property a prefix of the source path (replacing a
    /// whole embedded object changes everything underneath it).
    pub fn matches(&self, changed: &PropertyPath) -> bool {
        self.source_path.intersects(changed)
    }
}

/// A computed property together with the property paths its value depends
/// on.
///
/// When any of the source paths changes, the derived property's own path is
/// added to the live changed set of the owning type, so that a derived field
/// reacts to further propagation exactly like a plain stored field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedValueDependency {
    path: PropertyPath,
    sources: Vec<PropertyPath>,
}

impl DerivedValueDependency {
    pub fn new(path: PropertyPath, sources: Vec<PropertyPath>) -> DerivedValueDependency {
        DerivedValueDependency { path, sources }
    }

    /// The path of the derived property on its owning type.
    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    /// The paths whose values the derived property is computed from.
    pub fn sources(&self) -> &[PropertyPath] {
        &self.sources
    }

    /// Whether a change to the given property invalidates the derived value.
    pub fn matches(&self, changed: &PropertyPath) -> bool {
        self.sources.iter().any(|source| source.intersects(changed))
    }
}
