//! The static dependency path model for the Entwine indexing engine.
//!
//! This crate describes, per mapped type, how a property change on one type
//! reaches the indexed documents of other types. The model is built once at
//! startup from declarative metadata and is immutable afterwards; it is
//! shared read-only across every unit of work and every mass-indexing run.
//!
//! # Overview
//!
//! The model is assembled from a few building blocks:
//!
//! - [`path::PropertyPath`] - an ordered sequence of named property steps,
//!   optionally traversing multi-valued containers
//! - [`dependency::DependencyEdge`] - connects a source type's property path
//!   to a target type, tagged with a [`dependency::ReindexPolicy`] and an
//!   optional depth bound
//! - [`dependency::DerivedValueDependency`] - a computed property together
//!   with the property paths its value depends on
//! - [`node::TypeNode`] - one mapped type: its declared properties, outgoing
//!   edges, derived dependencies, and whether it owns a document of its own
//!
//! [`model::DependencyModel`] ties the nodes together and answers the two
//! queries the reindexing resolver needs: which edges fire for a changed
//! property, and which derived values a type declares. Construction fails
//! fast on configuration errors (unknown types, paths that do not start at a
//! declared property, empty derived dependencies); after
//! [`model::DependencyModelBuilder::build`] succeeds, no runtime fault can
//! originate here.

pub mod dependency;
pub mod ident;
pub mod model;
pub mod node;
pub mod path;

pub use dependency::{DependencyEdge, DerivedValueDependency, ReindexPolicy};
pub use ident::{DocumentKey, EntityId, TypeName};
pub use model::{DependencyModel, DependencyModelBuilder};
pub use node::{TypeDef, TypeNode};
pub use path::{ContainerExtractor, PathStep, PropertyPath};
