//! Dot-delimited field paths over JSON values.
//!
//! A path such as `variants.0.price` is split on `.`. A segment that parses
//! as a non-negative integer addresses a sequence element; every other
//! segment is an object key. Reads never mutate their input. Writes build
//! fresh intermediate containers, choosing array or object purely from
//! whether the segment being written is an index.

use std::fmt;

use serde_json::{Map, Value};

/// A parsed dot-delimited path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// An object key (e.g., "variants", "price")
    Key(String),
    /// A sequence index (e.g., "0"); the raw text is kept for object lookups
    Index(usize, String),
}

impl PathSegment {
    fn parse(segment: &str) -> Self {
        match segment.parse::<usize>() {
            Ok(index) => PathSegment::Index(index, segment.to_string()),
            Err(_) => PathSegment::Key(segment.to_string()),
        }
    }

    /// Text used when this segment addresses an object
    fn as_key(&self) -> &str {
        match self {
            PathSegment::Key(key) => key,
            PathSegment::Index(_, raw) => raw,
        }
    }
}

impl FieldPath {
    /// Parse a dot-delimited path
    ///
    /// ```
    /// use shopbridge::mapping::{FieldPath, PathSegment};
    ///
    /// let path = FieldPath::parse("variants.0.price");
    /// assert_eq!(path.segments.len(), 3);
    /// assert_eq!(path.segments[1], PathSegment::Index(0, "0".to_string()));
    /// ```
    pub fn parse(path: &str) -> Self {
        Self {
            raw: path.to_string(),
            segments: path.split('.').map(PathSegment::parse).collect(),
        }
    }

    /// Read the value at this path.
    ///
    /// Returns `None` when a key is absent, an index is out of range, the
    /// walk passes through a scalar, or the value found is `null`.
    pub fn read<'a>(&self, data: &'a Value) -> Option<&'a Value> {
        let mut current = data;

        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment.as_key())?,
                Value::Array(items) => match segment {
                    PathSegment::Index(index, _) => items.get(*index)?,
                    PathSegment::Key(_) => return None,
                },
                _ => return None,
            };

            if current.is_null() {
                return None;
            }
        }

        Some(current)
    }

    /// Read from an object root
    pub fn read_from<'a>(&self, data: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let head = data.get(first.as_key())?;
        if head.is_null() {
            return None;
        }
        FieldPath::from_segments(rest).read(head)
    }

    /// Write `value` at this path into an object root.
    ///
    /// Returns `false` when the path starts with an index, since an object
    /// root cannot hold a sequence at its top level.
    pub fn write_into(&self, root: &mut Map<String, Value>, value: Value) -> bool {
        let Some((first, rest)) = self.segments.split_first() else {
            return false;
        };
        if let PathSegment::Index(..) = first {
            tracing::debug!("Cannot write path '{}' into an object root", self.raw);
            return false;
        }

        let slot = root.entry(first.as_key().to_string()).or_insert(Value::Null);
        let existing = std::mem::take(slot);
        *slot = write_node(existing, rest, value);
        true
    }

    /// Write `value` at this path into an arbitrary value, returning the
    /// updated value.
    pub fn write(&self, current: Value, value: Value) -> Value {
        write_node(current, &self.segments, value)
    }

    fn from_segments(segments: &[PathSegment]) -> Self {
        let raw = segments
            .iter()
            .map(PathSegment::as_key)
            .collect::<Vec<_>>()
            .join(".");
        Self {
            raw,
            segments: segments.to_vec(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn write_node(current: Value, segments: &[PathSegment], value: Value) -> Value {
    let Some((segment, rest)) = segments.split_first() else {
        return value;
    };

    match segment {
        PathSegment::Index(index, _) => {
            let mut items = match current {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            if items.len() <= *index {
                items.resize(*index + 1, Value::Null);
            }
            let existing = std::mem::take(&mut items[*index]);
            items[*index] = write_node(existing, rest, value);
            Value::Array(items)
        }
        PathSegment::Key(key) => {
            let mut map = match current {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            let existing = map.remove(key).unwrap_or(Value::Null);
            map.insert(key.clone(), write_node(existing, rest, value));
            Value::Object(map)
        }
    }
}

/// Read `path` from `data`
pub fn get_nested<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    FieldPath::parse(path).read_from(data)
}

/// Write `value` at `path` into `data`
pub fn set_nested(data: &mut Map<String, Value>, path: &str, value: Value) -> bool {
    FieldPath::parse(path).write_into(data, value)
}
