//! Type nodes: one mapped type and its declared indexing metadata.

use ahash::AHashSet;

use crate::dependency::{DependencyEdge, DerivedValueDependency, ReindexPolicy};
use crate::ident::TypeName;

/// Declarative definition of one mapped type, consumed by
/// [`crate::model::DependencyModelBuilder`].
///
/// Paths are given as dotted text (see
/// [`crate::path::PropertyPath::parse`]) and are parsed and validated when
/// the model is built, so a chain of definitions stays fluent and all
/// configuration faults surface in one place.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub(crate) name: TypeName,
    pub(crate) indexed: bool,
    pub(crate) supertype: Option<TypeName>,
    pub(crate) properties: Vec<String>,
    pub(crate) edges: Vec<EdgeDef>,
    pub(crate) derived: Vec<DerivedDef>,
}

#[derive(Debug, Clone)]
pub(crate) struct EdgeDef {
    pub(crate) source_path: String,
    pub(crate) target_type: TypeName,
    pub(crate) embedding_path: String,
    pub(crate) policy: ReindexPolicy,
    pub(crate) depth_limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub(crate) struct DerivedDef {
    pub(crate) path: String,
    pub(crate) sources: Vec<String>,
}

impl TypeDef {
    /// A root indexed type: it owns a document of its own.
    pub fn indexed(name: impl Into<TypeName>) -> TypeDef {
        TypeDef::new(name, true)
    }

    /// A contained type: no document of its own, indexed only as embedded
    /// content of another type's document.
    pub fn contained(name: impl Into<TypeName>) -> TypeDef {
        TypeDef::new(name, false)
    }

    fn new(name: impl Into<TypeName>, indexed: bool) -> TypeDef {
        TypeDef {
            name: name.into(),
            indexed,
            supertype: None,
            properties: Vec::new(),
            edges: Vec::new(),
            derived: Vec::new(),
        }
    }

    /// Declares the persisted supertype of this type, used for polymorphic
    /// grouping during mass indexing.
    pub fn supertype(mut self, name: impl Into<TypeName>) -> TypeDef {
        self.supertype = Some(name.into());
        self
    }

    /// Declares a mapped property.
    pub fn property(mut self, name: impl Into<String>) -> TypeDef {
        self.properties.push(name.into());
        self
    }

    /// Declares several mapped properties at once.
    pub fn properties<I, S>(mut self, names: I) -> TypeDef
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declares an outgoing dependency edge: a change overlapping
    /// `source_path` on this type re-derives documents of `target_type`,
    /// which embeds this type through `embedding_path`.
    pub fn edge(
        self,
        source_path: impl Into<String>,
        target_type: impl Into<TypeName>,
        embedding_path: impl Into<String>,
        policy: ReindexPolicy,
    ) -> TypeDef {
        self.edge_def(source_path, target_type, embedding_path, policy, None)
    }

    /// Same as [`edge`](Self::edge), with a bound on the number of
    /// indexed-embedding hops the edge may be traversed in one branch.
    pub fn edge_with_depth(
        self,
        source_path: impl Into<String>,
        target_type: impl Into<TypeName>,
        embedding_path: impl Into<String>,
        policy: ReindexPolicy,
        depth_limit: u32,
    ) -> TypeDef {
        self.edge_def(
            source_path,
            target_type,
            embedding_path,
            policy,
            Some(depth_limit),
        )
    }

    fn edge_def(
        mut self,
        source_path: impl Into<String>,
        target_type: impl Into<TypeName>,
        embedding_path: impl Into<String>,
        policy: ReindexPolicy,
        depth_limit: Option<u32>,
    ) -> TypeDef {
        self.edges.push(EdgeDef {
            source_path: source_path.into(),
            target_type: target_type.into(),
            embedding_path: embedding_path.into(),
            policy,
            depth_limit,
        });
        self
    }

    /// Declares a derived (computed) property and the paths it is computed
    /// from.
    pub fn derived<I, S>(mut self, path: impl Into<String>, sources: I) -> TypeDef
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.derived.push(DerivedDef {
            path: path.into(),
            sources: sources.into_iter().map(Into::into).collect(),
        });
        self
    }
}

/// One mapped type in a built [`crate::model::DependencyModel`].
///
/// Immutable after construction; shared read-only across threads.
#[derive(Debug)]
pub struct TypeNode {
    name: TypeName,
    indexed: bool,
    supertype: Option<TypeName>,
    properties: AHashSet<Box<str>>,
    edges: Vec<DependencyEdge>,
    derived: Vec<DerivedValueDependency>,
}

impl TypeNode {
    pub(crate) fn new(
        name: TypeName,
        indexed: bool,
        supertype: Option<TypeName>,
        properties: AHashSet<Box<str>>,
        edges: Vec<DependencyEdge>,
        derived: Vec<DerivedValueDependency>,
    ) -> TypeNode {
        TypeNode {
            name,
            indexed,
            supertype,
            properties,
            edges,
            derived,
        }
    }

    pub fn name(&self) -> &TypeName {
        &self.name
    }

    /// Whether this type owns a document of its own, as opposed to existing
    /// solely as embedded content of other documents.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn supertype(&self) -> Option<&TypeName> {
        self.supertype.as_ref()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains(name)
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn derived_dependencies(&self) -> &[DerivedValueDependency] {
        &self.derived
    }
}
