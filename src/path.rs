//! Dotted-path projection over plain data.

use serde_json::Value;

/// Resolve a dotted `path` against `value`.
///
/// Segments select object keys, or array elements when the segment parses as
/// an index (`"list.0.id"`). An empty path yields the value itself. Any
/// missing segment yields `Value::Null`; this never fails.
pub fn project(value: &Value, path: &str) -> Value {
    let mut current = value;

    for segment in path.split('.').filter(|segment| !segment.is_empty()) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };

        match next {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }

    current.clone()
}
