// Sanitization helpers shared by Context Memory persistence and the
// Execution Logger: strip values that can't survive a durable store round
// trip, and cap the size of anything written for debuggability.

use serde_json::Value;

/// Recursively drop `null` entries from objects, serialize any array that
/// contains a nested array to a single text value (the durable store
/// disallows nested arrays), and cap strings/object key counts so a single
/// pathological payload can't blow up durable storage.
pub fn summarize(value: &Value, max_string_len: usize, max_object_keys: usize) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(truncate(s, max_string_len)),
        Value::Array(items) => {
            if items.iter().any(|v| v.is_array()) {
                let text = serde_json::to_string(items).unwrap_or_default();
                return Value::String(truncate(&text, max_string_len));
            }
            Value::Array(items.iter().map(|v| summarize(v, max_string_len, max_object_keys)).collect())
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map.iter() {
                if v.is_null() {
                    continue;
                }
                if out.len() >= max_object_keys {
                    out.insert(
                        "_truncated".to_string(),
                        Value::String(format!("{} additional keys omitted", map.len() - out.len())),
                    );
                    break;
                }
                out.insert(k.clone(), summarize(v, max_string_len, max_object_keys));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Context Memory's persist-summary variant (spec §4.3): unlike
/// [`summarize`] — which only collapses *nested* arrays to text for the
/// durable store — every array at any depth is reported by length only,
/// as `{"type": "array", "count": N}`. Strings and object-key caps behave
/// the same as [`summarize`].
pub fn summarize_context(value: &Value, max_string_len: usize, max_object_keys: usize) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(truncate(s, max_string_len)),
        Value::Array(items) => serde_json::json!({"type": "array", "count": items.len()}),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map.iter() {
                if v.is_null() {
                    continue;
                }
                if out.len() >= max_object_keys {
                    break;
                }
                out.insert(k.clone(), summarize_context(v, max_string_len, max_object_keys));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_len).collect();
    format!("{}…", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_are_dropped_from_objects() {
        let input = serde_json::json!({"a": 1, "b": null, "c": "x"});
        let out = summarize(&input, 100, 10);
        assert!(out.get("b").is_none());
        assert_eq!(out["a"], 1);
    }

    #[test]
    fn long_strings_are_truncated() {
        let long = "y".repeat(20);
        let out = summarize(&Value::String(long), 5, 10);
        assert_eq!(out.as_str().unwrap(), "yyyyy…");
    }

    #[test]
    fn nested_arrays_serialize_to_text() {
        let input = serde_json::json!([[1, 2], [3], 4]);
        let out = summarize(&input, 100, 10);
        assert_eq!(out, serde_json::json!("[[1,2],[3],4]"));
    }

    #[test]
    fn flat_arrays_pass_through_unchanged() {
        let input = serde_json::json!([1, 2, 3]);
        let out = summarize(&input, 100, 10);
        assert_eq!(out, input);
    }

    #[test]
    fn object_key_count_is_capped() {
        let mut map = serde_json::Map::new();
        for i in 0..10 {
            map.insert(format!("k{}", i), serde_json::json!(i));
        }
        let out = summarize(&Value::Object(map), 100, 3);
        let obj = out.as_object().unwrap();
        assert_eq!(obj.len(), 4); // 3 kept + _truncated marker
        assert!(obj.contains_key("_truncated"));
    }
}
