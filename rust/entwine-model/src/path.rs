//! Property paths: ordered sequences of named steps from a root type.
//!
//! A path identifies a value or an associated type reachable from a mapped
//! type, e.g. `authors.name` for the `name` property of every element of the
//! `authors` association. Paths are immutable once built and their identity
//! is their step sequence.

use std::fmt;
use std::sync::Arc;

use entwine_common::{Result, error::Error};

/// How a multi-valued container is traversed by a path step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerExtractor {
    /// Elements of a list or set.
    Collection,
    /// Keys of a map.
    MapKeys,
    /// Values of a map.
    MapValues,
}

/// One step of a property path: a property access, optionally traversing
/// a multi-valued container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    name: Box<str>,
    extractor: Option<ContainerExtractor>,
}

impl PathStep {
    /// A plain property access.
    pub fn property(name: impl Into<Box<str>>) -> PathStep {
        PathStep {
            name: name.into(),
            extractor: None,
        }
    }

    /// A property access traversing the elements of a collection.
    pub fn collection(name: impl Into<Box<str>>) -> PathStep {
        PathStep {
            name: name.into(),
            extractor: Some(ContainerExtractor::Collection),
        }
    }

    /// A property access traversing a container with the given extractor.
    pub fn container(name: impl Into<Box<str>>, extractor: ContainerExtractor) -> PathStep {
        PathStep {
            name: name.into(),
            extractor: Some(extractor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extractor(&self) -> Option<ContainerExtractor> {
        self.extractor
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.extractor {
            None => write!(f, "{}", self.name),
            Some(ContainerExtractor::Collection) => write!(f, "{}[]", self.name),
            Some(ContainerExtractor::MapKeys) => write!(f, "{}[keys]", self.name),
            Some(ContainerExtractor::MapValues) => write!(f, "{}[values]", self.name),
        }
    }
}

/// An ordered, immutable sequence of [`PathStep`]s.
///
/// Cheap to clone; equality and hashing are defined by the step sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    steps: Arc<[PathStep]>,
}

impl PropertyPath {
    /// Builds a path from a non-empty sequence of steps.
    pub fn new(steps: impl Into<Vec<PathStep>>) -> Result<PropertyPath> {
        let steps: Vec<PathStep> = steps.into();
        if steps.is_empty() {
            return Err(Error::configuration("property path", "path has no steps"));
        }
        Ok(PropertyPath {
            steps: steps.into(),
        })
    }

    /// Parses a dotted path such as `authors.name`.
    ///
    /// A step may carry a container-extractor suffix: `authors[].name`
    /// traverses the elements of the `authors` collection, `editions[keys]`
    /// and `editions[values]` traverse map keys and values respectively.
    ///
    /// Fails with a configuration error on an empty path or an empty or
    /// malformed step.
    pub fn parse(text: &str) -> Result<PropertyPath> {
        let mut steps = Vec::new();
        for part in text.split('.') {
            let (name, extractor) = match part.find('[') {
                None => (part, None),
                Some(pos) => {
                    let extractor = match &part[pos..] {
                        "[]" => ContainerExtractor::Collection,
                        "[keys]" => ContainerExtractor::MapKeys,
                        "[values]" => ContainerExtractor::MapValues,
                        other => {
                            return Err(Error::configuration(
                                text,
                                format!("unknown container extractor '{other}'"),
                            ));
                        }
                    };
                    (&part[..pos], Some(extractor))
                }
            };
            if name.is_empty() {
                return Err(Error::configuration(text, "empty step in property path"));
            }
            steps.push(PathStep {
                name: name.into(),
                extractor,
            });
        }
        PropertyPath::new(steps)
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The first step of the path. Paths are never empty.
    pub fn head(&self) -> &PathStep {
        &self.steps[0]
    }

    /// Returns `true` if `self` is a prefix of, or equal to, `other`.
    pub fn is_prefix_of(&self, other: &PropertyPath) -> bool {
        other.steps.len() >= self.steps.len() && other.steps[..self.steps.len()] == *self.steps
    }

    /// Returns `true` if one of the two paths is a prefix of the other.
    ///
    /// This is the overlap test used when matching a changed property
    /// against a declared dependency: a change to `address` touches
    /// `address.city`, and a change to `address.city` touches `address`.
    pub fn intersects(&self, other: &PropertyPath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            if index != 0 {
                write!(f, ".")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}
