//! Path resolution against a concrete document
//!
//! Traversal rules:
//! - a missing (or `null`) key on the way down becomes an empty mapping
//! - an index must already exist; sequences are never created or extended
//! - the final segment names the slot that receives the value

use serde_json::{Map, Value};

use crate::path::{DocPath, PathError, Segment};

/// Write target produced by [`PathResolver::resolve`]
///
/// Holds the container and the final key, so `container[key] = value`
/// is exactly [`Target::set`].
#[derive(Debug)]
pub enum Target<'a> {
    /// A key inside a mapping; created on write if absent
    Field {
        map: &'a mut Map<String, Value>,
        key: &'a str,
    },
    /// An existing position inside a sequence
    Slot { seq: &'a mut Vec<Value>, index: usize },
}

impl Target<'_> {
    /// Current value at the target, if any
    #[must_use]
    pub fn get(&self) -> Option<&Value> {
        match self {
            Self::Field { map, key } => map.get(*key),
            Self::Slot { seq, index } => seq.get(*index),
        }
    }

    /// Store `value` at the target, returning the previous value
    ///
    /// A slot past the end of its sequence stores nothing and returns
    /// `None`; sequences never grow.
    pub fn set(self, value: Value) -> Option<Value> {
        match self {
            Self::Field { map, key } => map.insert(key.to_string(), value),
            Self::Slot { seq, index } => seq
                .get_mut(index)
                .map(|slot| std::mem::replace(slot, value)),
        }
    }
}

/// Resolves [`DocPath`]s inside documents
///
/// Writes may leave freshly created intermediate mappings behind when a
/// later segment fails; callers that need all-or-nothing semantics resolve
/// against a clone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    /// Walk `path` and return the container that owns its final segment
    ///
    /// # Errors
    /// - [`PathError::Empty`] for the root path
    /// - [`PathError::OutOfRange`] when an index is past the end
    /// - [`PathError::MissingSequence`] when an index follows an absent key
    /// - [`PathError::NotAContainer`] when traversal hits a leaf
    pub fn resolve<'a>(
        document: &'a mut Value,
        path: &'a DocPath,
    ) -> Result<Target<'a>, PathError> {
        let segments = path.segments();
        let (last, parents) = segments.split_last().ok_or(PathError::Empty)?;

        let mut current = document;
        for (depth, segment) in parents.iter().enumerate() {
            let next_is_index = segments[depth + 1].is_index();
            current = descend(current, segment, next_is_index, path, depth)?;
        }

        let depth = parents.len();
        match last {
            Segment::Key(key) => match current {
                Value::Object(map) => Ok(Target::Field { map, key }),
                other => Err(not_a_container(path, depth, "mapping", other)),
            },
            Segment::Index(index) => match current {
                Value::Array(seq) => {
                    let len = seq.len();
                    if *index < len {
                        Ok(Target::Slot { seq, index: *index })
                    } else {
                        Err(PathError::OutOfRange {
                            path: path.prefix_string(depth),
                            index: *index,
                            len,
                        })
                    }
                }
                other => Err(not_a_container(path, depth, "sequence", other)),
            },
        }
    }

    /// Write `value` at `path`, returning the value it replaced
    ///
    /// # Errors
    /// Same as [`PathResolver::resolve`]
    pub fn write(
        document: &mut Value,
        path: &DocPath,
        value: Value,
    ) -> Result<Option<Value>, PathError> {
        Self::resolve(document, path).map(|target| target.set(value))
    }

    /// Read the value at `path` without creating anything
    #[must_use]
    pub fn read<'a>(document: &'a Value, path: &DocPath) -> Option<&'a Value> {
        if path.is_empty() {
            return None;
        }
        path.iter().try_fold(document, |current, segment| match segment {
            Segment::Key(key) => current.as_object()?.get(key),
            Segment::Index(index) => current.as_array()?.get(*index),
        })
    }

    /// Whether `path` addresses an existing value
    #[inline]
    #[must_use]
    pub fn exists(document: &Value, path: &DocPath) -> bool {
        Self::read(document, path).is_some()
    }
}

fn descend<'a>(
    current: &'a mut Value,
    segment: &Segment,
    next_is_index: bool,
    path: &DocPath,
    depth: usize,
) -> Result<&'a mut Value, PathError> {
    match segment {
        Segment::Key(key) => {
            let map = match current {
                Value::Object(map) => map,
                other => return Err(not_a_container(path, depth, "mapping", other)),
            };
            let absent = map.get(key).map_or(true, Value::is_null);
            if absent && next_is_index {
                return Err(PathError::MissingSequence {
                    path: path.prefix_string(depth + 1),
                });
            }
            let child = map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if child.is_null() {
                *child = Value::Object(Map::new());
            }
            Ok(child)
        }
        Segment::Index(index) => match current {
            Value::Array(seq) => {
                let len = seq.len();
                seq.get_mut(*index).ok_or_else(|| PathError::OutOfRange {
                    path: path.prefix_string(depth),
                    index: *index,
                    len,
                })
            }
            other => Err(not_a_container(path, depth, "sequence", other)),
        },
    }
}

fn not_a_container(path: &DocPath, depth: usize, expected: &'static str, found: &Value) -> PathError {
    PathError::NotAContainer {
        path: path.prefix_string(depth),
        expected,
        found: kind_name(found),
    }
}

/// Human-readable name of a value's shape, as used in error messages
#[must_use]
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
