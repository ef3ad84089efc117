//! The reindexing resolver: from one mutation to the set of affected
//! documents.

use std::collections::VecDeque;

use ahash::AHashSet;
use entwine_common::Result;
use entwine_model::{DependencyModel, DocumentKey, EntityId, PropertyPath, ReindexPolicy, TypeName};

use crate::collaborator::AssociationNavigator;
use crate::resolution::ReindexingResolution;

/// Walks the dependency model from a mutated entity and produces the minimal
/// set of (type, identifier) pairs needing re-derivation.
///
/// The traversal is breadth-first and batched: all changed properties of the
/// mutation are processed in one walk, so the resolution's uniqueness
/// invariant holds across the whole mutation, not per property.
///
/// Policies are applied per edge: a `Full` edge enqueues its targets and
/// re-seeds the traversal from each of them as if all of their properties
/// had changed; a `Shallow` edge enqueues its targets but stops there; a
/// `None` edge never fires. An edge whose depth bound is exhausted behaves
/// as `None` for the remainder of that branch. A (type, id) pair is
/// re-seeded at most once per resolution, which terminates the walk even
/// over cyclic association graphs.
///
/// Resolution never partially fails: it either completes, or surfaces a
/// configuration-class error (unknown type reached by a navigated key)
/// immediately.
pub struct ReindexingResolver<'a> {
    model: &'a DependencyModel,
    navigator: &'a dyn AssociationNavigator,
}

enum ChangeScope {
    /// The target was re-seeded after its embedded content changed; every
    /// property is considered changed.
    All,
    Paths(Vec<PropertyPath>),
}

struct WorkItem {
    key: DocumentKey,
    scope: ChangeScope,
    hops: u32,
}

impl<'a> ReindexingResolver<'a> {
    pub fn new(
        model: &'a DependencyModel,
        navigator: &'a dyn AssociationNavigator,
    ) -> ReindexingResolver<'a> {
        ReindexingResolver { model, navigator }
    }

    /// Resolves the documents affected by a mutation of `source_id` of type
    /// `source_type` where `changed` properties were touched.
    ///
    /// A mutated entity that is itself a root indexed type is always part of
    /// its own resolution, independent of any edges.
    pub fn resolve(
        &self,
        source_type: &TypeName,
        source_id: &EntityId,
        changed: &[PropertyPath],
    ) -> Result<ReindexingResolution> {
        let source_node = self.model.node(source_type)?;
        let source_key = DocumentKey::new(source_type.clone(), source_id.clone());

        let mut resolution = ReindexingResolution::new();
        if source_node.is_indexed() {
            resolution.insert(source_key.clone());
        }

        let mut reseeded = AHashSet::new();
        reseeded.insert(source_key.clone());

        let mut queue = VecDeque::new();
        queue.push_back(WorkItem {
            key: source_key,
            scope: ChangeScope::Paths(changed.to_vec()),
            hops: 0,
        });

        while let Some(mut item) = queue.pop_front() {
            let node = self.model.node(item.key.type_name())?;

            // A matched derived value reacts to further propagation exactly
            // like a plain stored field: fold its path into the live changed
            // set before matching edges.
            if let ChangeScope::Paths(paths) = &mut item.scope {
                Self::expand_derived(node.derived_dependencies(), paths);
            }

            for edge in node.edges() {
                let fires = match &item.scope {
                    ChangeScope::All => true,
                    ChangeScope::Paths(paths) => paths.iter().any(|path| edge.matches(path)),
                };
                if !fires || edge.policy() == ReindexPolicy::None {
                    continue;
                }
                if edge.depth_limit().is_some_and(|limit| item.hops >= limit) {
                    continue;
                }

                for target in self.navigator.inverse(edge, &item.key)? {
                    let target_node = self.model.node(target.type_name())?;
                    if target_node.is_indexed() {
                        resolution.insert(target.clone());
                    }
                    if edge.policy() == ReindexPolicy::Full && reseeded.insert(target.clone()) {
                        queue.push_back(WorkItem {
                            key: target,
                            scope: ChangeScope::All,
                            hops: item.hops + 1,
                        });
                    }
                }
            }
        }

        Ok(resolution)
    }

    fn expand_derived(
        derived: &[entwine_model::DerivedValueDependency],
        paths: &mut Vec<PropertyPath>,
    ) {
        loop {
            let mut grew = false;
            for dependency in derived {
                if paths.contains(dependency.path()) {
                    continue;
                }
                if paths.iter().any(|path| dependency.matches(path)) {
                    paths.push(dependency.path().clone());
                    grew = true;
                }
            }
            if !grew {
                return;
            }
        }
    }
}
