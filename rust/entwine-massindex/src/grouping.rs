//! Grouping of polymorphic target types for bulk loading.
//!
//! When a hierarchy is targeted (say `Work` and its subtype `Novel`), one
//! query against the common supertype covers every included subtype. Issuing
//! per-type queries instead would both cost more round trips and index
//! entities twice when they are reachable through more than one requested
//! type.

use entwine_common::{Result, error::Error};
use entwine_model::{DependencyModel, TypeName};

/// The pairwise classification of two target types.
///
/// Computed from the model's explicit supertype metadata, never from
/// language-level inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// The first type is a supertype of (or equal to) the second.
    Super,
    /// The first type is a subtype of the second.
    Included,
    /// The types are unrelated.
    None,
}

impl Grouping {
    /// Classifies `first` against `second` using the model's supertype
    /// chains.
    pub fn classify(model: &DependencyModel, first: &TypeName, second: &TypeName) -> Grouping {
        if model.is_assignable_from(first, second) {
            Grouping::Super
        } else if model.is_assignable_from(second, first) {
            Grouping::Included
        } else {
            Grouping::None
        }
    }
}

/// One group of target types covered by a single supertype query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeGroup {
    root: TypeName,
    types: Vec<TypeName>,
}

impl TypeGroup {
    fn of(root: TypeName) -> TypeGroup {
        TypeGroup {
            types: vec![root.clone()],
            root,
        }
    }

    /// The common supertype the group is queried through.
    pub fn root(&self) -> &TypeName {
        &self.root
    }

    /// All requested types covered by this group, root included.
    pub fn types(&self) -> &[TypeName] {
        &self.types
    }
}

/// Partitions the requested types into supertype-rooted groups.
///
/// Every requested type must be a mapped, root indexed type; requesting an
/// unknown or contained-only type is a configuration error. Duplicates in
/// the request are collapsed.
pub fn group_types(model: &DependencyModel, requested: &[TypeName]) -> Result<Vec<TypeGroup>> {
    entwine_common::verify_arg!(requested, !requested.is_empty());
    let mut groups: Vec<TypeGroup> = Vec::new();
    for type_name in requested {
        let node = model.node(type_name)?;
        if !node.is_indexed() {
            return Err(Error::configuration(
                type_name.as_str(),
                "contained types have no documents to mass index",
            ));
        }
        if groups.iter().any(|group| group.types.contains(type_name)) {
            continue;
        }
        let mut merged = false;
        for group in &mut groups {
            match Grouping::classify(model, &group.root, type_name) {
                Grouping::Super => {
                    group.types.push(type_name.clone());
                    merged = true;
                    break;
                }
                Grouping::Included => {
                    group.root = type_name.clone();
                    group.types.push(type_name.clone());
                    merged = true;
                    break;
                }
                Grouping::None => {}
            }
        }
        if !merged {
            groups.push(TypeGroup::of(type_name.clone()));
        }
    }

    // Promoting a root may have made two groups mergeable.
    loop {
        let mut merge_pair = None;
        'outer: for (a, group_a) in groups.iter().enumerate() {
            for (b, group_b) in groups.iter().enumerate().skip(a + 1) {
                if Grouping::classify(model, &group_a.root, &group_b.root) != Grouping::None {
                    merge_pair = Some((a, b));
                    break 'outer;
                }
            }
        }
        let Some((a, b)) = merge_pair else {
            return Ok(groups);
        };
        let absorbed = groups.remove(b);
        let group = &mut groups[a];
        if Grouping::classify(model, &group.root, &absorbed.root) == Grouping::Included {
            group.root = absorbed.root.clone();
        }
        group.types.extend(absorbed.types);
    }
}
