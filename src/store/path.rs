// ============================================================================
// chatmod-core - Paths
// Dot-separated addressing into a JSON tree
// ============================================================================
//
// "a.b.2.c" walks object key "a", object key "b", array index 2, key "c".
// Reads are lenient: anything that does not resolve is simply absent.
// Writes are strict: the path is validated before the tree is touched, so
// a rejected write never leaves half-created containers behind.
// ============================================================================

use serde_json::{Map, Value};

use crate::core::constants::{MAX_ARRAY_PADDING, PATH_SEPARATOR, RESERVED_SEGMENTS};
use crate::core::error::StoreError;

/// Split and validate a path for writing.
pub fn parse(path: &str) -> Result<Vec<&str>, StoreError> {
    if path.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    for segment in &segments {
        if segment.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        if RESERVED_SEGMENTS.contains(segment) {
            return Err(StoreError::ReservedSegment {
                path: path.to_string(),
                segment: (*segment).to_string(),
            });
        }
    }
    Ok(segments)
}

/// Array index named by a segment, if it is one.
fn array_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Resolve `path` against `root`. `None` if any segment is missing.
pub fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return None;
    }
    path.split(PATH_SEPARATOR)
        .try_fold(root, |node, segment| child(node, segment))
}

fn child<'v>(node: &'v Value, segment: &str) -> Option<&'v Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => array_index(segment).and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Check that `segments` can be written into `root` without reinterpreting
/// an existing array as an object, and without padding an array by more than
/// [`MAX_ARRAY_PADDING`] slots.
pub fn check_writable(root: &Value, path: &str, segments: &[&str]) -> Result<(), StoreError> {
    let mut node = Some(root);
    for segment in segments {
        let Some(current) = node else { break };
        if let Value::Array(items) = current {
            match array_index(segment) {
                Some(index) if index <= items.len().saturating_add(MAX_ARRAY_PADDING) => {}
                _ => return Err(StoreError::InvalidPath(path.to_string())),
            }
        }
        node = child(current, segment).filter(|c| c.is_object() || c.is_array());
    }
    Ok(())
}

/// Write `value` at `segments`, creating objects along the way and
/// replacing scalars that sit where a container is needed.
///
/// Callers run [`check_writable`] first.
pub fn write(root: &mut Value, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut node = root;
    for segment in parents {
        node = descend(node, segment);
    }
    assign(node, last, value);
}

fn descend<'v>(node: &'v mut Value, segment: &str) -> &'v mut Value {
    let slot = match node {
        Value::Array(items) => {
            let index = array_index(segment).unwrap_or(items.len());
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        Value::Object(map) => map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new())),
        _ => {
            *node = Value::Object(Map::new());
            return descend(node, segment);
        }
    };
    if !slot.is_object() && !slot.is_array() {
        *slot = Value::Object(Map::new());
    }
    slot
}

fn assign(node: &mut Value, segment: &str, value: Value) {
    match node {
        Value::Array(items) => {
            let index = array_index(segment).unwrap_or(items.len());
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            items[index] = value;
        }
        Value::Object(map) => {
            map.insert(segment.to_string(), value);
        }
        _ => {
            let mut map = Map::new();
            map.insert(segment.to_string(), value);
            *node = Value::Object(map);
        }
    }
}

/// Whether a change at `changed` is relevant to a listener interested in
/// `watched`: same path, or one is a segment-wise prefix of the other.
///
/// The store itself never bubbles notifications; listeners that care about a
/// subtree filter with this.
///
/// # Example
///
/// ```
/// use chatmod_core::store::path_affects;
///
/// assert!(path_affects("theme.colors.bg", "theme"));
/// assert!(path_affects("theme", "theme.colors"));
/// assert!(!path_affects("themes", "theme"));
/// ```
pub fn path_affects(changed: &str, watched: &str) -> bool {
    fn is_prefix(short: &str, long: &str) -> bool {
        long.strip_prefix(short)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(PATH_SEPARATOR))
    }
    is_prefix(watched, changed) || is_prefix(changed, watched)
}

/// Short name of a value's JSON kind, for diagnostics.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// TESTS
// =============================================================================
