//! Type names, entity identifiers and document keys.

use std::fmt;
use std::sync::Arc;

/// The name of a mapped type.
///
/// Interned behind an `Arc`, so cloning is cheap and keys built from type
/// names do not copy the name text around.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(Arc<str>);

impl TypeName {
    pub fn new(name: impl Into<Arc<str>>) -> TypeName {
        TypeName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> TypeName {
        TypeName::new(name)
    }
}

impl From<String> for TypeName {
    fn from(name: String) -> TypeName {
        TypeName::new(name)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque entity identifier, rendered to text by the mapper.
///
/// The engine never interprets identifiers; it only compares them and hands
/// them back to the primary store and the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Arc<str>);

impl EntityId {
    pub fn new(id: impl Into<Arc<str>>) -> EntityId {
        EntityId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> EntityId {
        EntityId::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> EntityId {
        EntityId::new(id)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> EntityId {
        EntityId::new(id.to_string())
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> EntityId {
        EntityId::new(id.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (type, identifier) pair addressing one index document.
///
/// Keys are always exact-typed: even when a traversal or a bulk query went
/// through a common supertype, the key records the concrete type of the
/// entity, because one document belongs to exactly one concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    type_name: TypeName,
    id: EntityId,
}

impl DocumentKey {
    pub fn new(type_name: impl Into<TypeName>, id: impl Into<EntityId>) -> DocumentKey {
        DocumentKey {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}
