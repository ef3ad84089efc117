//! The built dependency model and its fail-fast builder.

use ahash::{AHashMap, AHashSet};
use entwine_common::{Result, error::Error};

use crate::dependency::{DependencyEdge, DerivedValueDependency};
use crate::ident::TypeName;
use crate::node::{TypeDef, TypeNode};
use crate::path::PropertyPath;

/// The static, per-entity-type dependency graph.
///
/// Built once at startup via [`DependencyModel::builder`], immutable
/// afterwards, safe for unsynchronized concurrent reads.
#[derive(Debug)]
pub struct DependencyModel {
    nodes: AHashMap<TypeName, TypeNode>,
}

impl DependencyModel {
    pub fn builder() -> DependencyModelBuilder {
        DependencyModelBuilder { defs: Vec::new() }
    }

    /// Looks up a type node, failing with a configuration error for an
    /// unknown type.
    pub fn node(&self, type_name: &TypeName) -> Result<&TypeNode> {
        self.nodes.get(type_name).ok_or_else(|| {
            Error::configuration(type_name.as_str(), "type is not part of the mapping")
        })
    }

    pub fn contains(&self, type_name: &TypeName) -> bool {
        self.nodes.contains_key(type_name)
    }

    /// Iterates all type nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &TypeNode> {
        self.nodes.values()
    }

    /// The outgoing dependency edges of `type_name` that fire for a change
    /// to the given property path.
    pub fn edges_from<'a>(
        &'a self,
        type_name: &TypeName,
        changed: &'a PropertyPath,
    ) -> Result<impl Iterator<Item = &'a DependencyEdge>> {
        Ok(self
            .node(type_name)?
            .edges()
            .iter()
            .filter(move |edge| edge.matches(changed)))
    }

    /// All outgoing dependency edges of `type_name`, regardless of which
    /// property changed. Used when a target is re-seeded with "all
    /// properties changed".
    pub fn all_edges_from(&self, type_name: &TypeName) -> Result<&[DependencyEdge]> {
        Ok(self.node(type_name)?.edges())
    }

    /// The derived-value dependencies declared on `type_name`.
    pub fn derived_dependencies_of(
        &self,
        type_name: &TypeName,
    ) -> Result<&[DerivedValueDependency]> {
        Ok(self.node(type_name)?.derived_dependencies())
    }

    /// Whether `sub` is the same type as `superty` or reaches it through its
    /// declared supertype chain.
    ///
    /// This is an explicit metadata walk, not a language-level inheritance
    /// check; mass indexing uses it to group polymorphic hierarchies.
    pub fn is_assignable_from(&self, superty: &TypeName, sub: &TypeName) -> bool {
        let mut current = Some(sub);
        while let Some(type_name) = current {
            if type_name == superty {
                return true;
            }
            current = self
                .nodes
                .get(type_name)
                .and_then(|node| node.supertype());
        }
        false
    }
}

/// Assembles a [`DependencyModel`] from [`TypeDef`]s.
///
/// All validation happens in [`build`](Self::build): unknown types, paths
/// not starting at a declared property, malformed path text and empty
/// derived dependencies are configuration errors, raised before the model
/// ever serves a resolution.
pub struct DependencyModelBuilder {
    defs: Vec<TypeDef>,
}

impl DependencyModelBuilder {
    pub fn with_type(mut self, def: TypeDef) -> DependencyModelBuilder {
        self.defs.push(def);
        self
    }

    pub fn build(self) -> Result<DependencyModel> {
        let mut names = AHashSet::new();
        for def in &self.defs {
            if !names.insert(def.name.clone()) {
                return Err(Error::configuration(
                    def.name.as_str(),
                    "type registered twice",
                ));
            }
        }

        let mut nodes = AHashMap::new();
        for def in self.defs {
            let node = Self::build_node(def, &names)?;
            nodes.insert(node.name().clone(), node);
        }

        // Supertype chains can only be checked once every node exists.
        for node in nodes.values() {
            if let Some(supertype) = node.supertype()
                && !nodes.contains_key(supertype)
            {
                return Err(Error::configuration(
                    node.name().as_str(),
                    format!("supertype '{supertype}' is not part of the mapping"),
                ));
            }
        }

        Ok(DependencyModel { nodes })
    }

    fn build_node(def: TypeDef, known_types: &AHashSet<TypeName>) -> Result<TypeNode> {
        let type_name = def.name;
        let properties: AHashSet<Box<str>> = def
            .properties
            .into_iter()
            .map(|name| name.into_boxed_str())
            .collect();

        let head_is_declared = |path: &PropertyPath| properties.contains(path.head().name());

        let mut edges = Vec::with_capacity(def.edges.len());
        for edge_def in def.edges {
            let source_path = PropertyPath::parse(&edge_def.source_path)?;
            let embedding_path = PropertyPath::parse(&edge_def.embedding_path)?;
            if !head_is_declared(&source_path) {
                return Err(Error::configuration(
                    type_name.as_str(),
                    format!(
                        "edge source path '{source_path}' does not start at a declared property"
                    ),
                ));
            }
            if !known_types.contains(&edge_def.target_type) {
                return Err(Error::configuration(
                    type_name.as_str(),
                    format!(
                        "edge target type '{}' is not part of the mapping",
                        edge_def.target_type
                    ),
                ));
            }
            let mut edge = DependencyEdge::new(
                type_name.clone(),
                source_path,
                edge_def.target_type,
                embedding_path,
                edge_def.policy,
            );
            if let Some(depth) = edge_def.depth_limit {
                edge = edge.with_depth_limit(depth);
            }
            edges.push(edge);
        }

        let mut derived = Vec::with_capacity(def.derived.len());
        for derived_def in def.derived {
            if derived_def.sources.is_empty() {
                return Err(Error::configuration(
                    type_name.as_str(),
                    format!(
                        "derived dependency '{}' declares no source paths",
                        derived_def.path
                    ),
                ));
            }
            let path = PropertyPath::parse(&derived_def.path)?;
            if !head_is_declared(&path) {
                return Err(Error::configuration(
                    type_name.as_str(),
                    format!("derived path '{path}' does not start at a declared property"),
                ));
            }
            let mut sources = Vec::with_capacity(derived_def.sources.len());
            for source in derived_def.sources {
                let source = PropertyPath::parse(&source)?;
                if !head_is_declared(&source) {
                    return Err(Error::configuration(
                        type_name.as_str(),
                        format!(
                            "derived source path '{source}' does not start at a declared property"
                        ),
                    ));
                }
                sources.push(source);
            }
            derived.push(DerivedValueDependency::new(path, sources));
        }

        Ok(TypeNode::new(
            type_name,
            def.indexed,
            def.supertype,
            properties,
            edges,
            derived,
        ))
    }
}
