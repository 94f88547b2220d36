//! Dotted-path resolution against a run's inputs map (§4.4 TemplateResolver,
//! §4.4 path-expression fields such as `merge.config.paths` and
//! `loop.config.input`).
//!
//! A leading `$` is stripped. The literal segment `_all` resolves to the
//! whole inputs map; any other first segment is looked up as a step id (or
//! other top-level key) in the inputs map, and the remaining dotted
//! segments drill into that value's objects and arrays. A numeric segment
//! indexes an array. A path that cannot be resolved — missing key, index
//! out of range, or drilling into a scalar — resolves to `None` rather
//! than erroring; callers decide what a miss means for them (the template
//! resolver leaves the placeholder intact, `merge`/`loop` treat it as a
//! missing input).

use std::collections::HashMap;

use serde_json::Value;

pub fn resolve_path(path: &str, inputs: &HashMap<String, Value>) -> Option<Value> {
    let path = path.trim();
    let path = path.strip_prefix('$').unwrap_or(path);
    if path.is_empty() {
        return None;
    }

    let mut segments = path.split('.');
    let first = segments.next()?;

    let mut current = if first == "_all" {
        Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    } else {
        inputs.get(first)?.clone()
    };

    for segment in segments {
        current = step_into(&current, segment)?;
    }

    Some(current)
}

fn step_into(value: &Value, segment: &str) -> Option<Value> {
    if let Ok(index) = segment.parse::<usize>() {
        if let Value::Array(items) = value {
            return items.get(index).cloned();
        }
    }
    match value {
        Value::Object(map) => map.get(segment).cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_object_path() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!({"b": "x"}));
        assert_eq!(resolve_path("a.b", &inputs), Some(json!("x")));
    }

    #[test]
    fn strips_leading_dollar() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!(1));
        assert_eq!(resolve_path("$a", &inputs), Some(json!(1)));
    }

    #[test]
    fn all_resolves_whole_map() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!(1));
        inputs.insert("b".to_string(), json!(2));
        let resolved = resolve_path("_all", &inputs).unwrap();
        assert_eq!(resolved, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn indexes_arrays_numerically() {
        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), json!({"items": [10, 20, 30]}));
        assert_eq!(resolve_path("a.items.1", &inputs), Some(json!(20)));
    }

    #[test]
    fn missing_path_is_none() {
        let inputs = HashMap::new();
        assert_eq!(resolve_path("missing.field", &inputs), None);
    }
}
