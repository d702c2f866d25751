// Variable Resolver — substitutes `{{path}}` references in step parameter
// maps against a step context snapshot.

use serde_json::Value;

use crate::engine::context::StepContext;

/// Resolve a single value against `context`.
///
/// A string that matches exactly `{{ <path> }}` (optional surrounding
/// whitespace) returns the raw value at that path, preserving its type.
/// A string containing embedded `{{ <path> }}` tokens has each token
/// replaced by its stringified value (objects/arrays become JSON text;
/// a missing path leaves the token verbatim). Arrays and objects recurse;
/// other scalars pass through unchanged.
pub fn resolve(value: &Value, context: &StepContext) -> Value {
    match value {
        Value::String(s) => resolve_string(s, context),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, context)).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve(v, context));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Resolve every value in a parameter map, as the executor does before
/// invoking a handler.
pub fn resolve_params(
    params: &std::collections::HashMap<String, Value>,
    context: &StepContext,
) -> std::collections::HashMap<String, Value> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), resolve(v, context)))
        .collect()
}

fn resolve_string(s: &str, context: &StepContext) -> Value {
    if let Some(path) = exact_token(s) {
        return lookup(&path, context).unwrap_or_else(|| Value::String(s.to_string()));
    }

    if !s.contains("{{") {
        return Value::String(s.to_string());
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        let Some(end_rel) = rest[start..].find("}}") else {
            out.push_str(rest);
            rest = "";
            break;
        };
        let end = start + end_rel;
        out.push_str(&rest[..start]);
        let path = rest[start + 2..end].trim();
        match lookup(path, context) {
            Some(value) if !value.is_null() => out.push_str(&stringify(&value)),
            // An explicit `null` at the path is indistinguishable from a
            // missing one once stringified; both leave the token verbatim.
            Some(_) | None => out.push_str(&rest[start..end + 2]),
        }
        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    Value::String(out)
}

/// Returns `Some(path)` if `s` is, modulo whitespace, exactly one
/// `{{ path }}` token and nothing else.
fn exact_token(s: &str) -> Option<String> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim().to_string())
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Dotted-path lookup. Tries `stepOutputs.<path>` first (named aliases and
/// positional `step_1`, `step_2`, … are first-class), then falls back to
/// walking the context snapshot itself (`user.email`, `trigger.type`).
/// Missing segments yield `None`.
fn lookup(path: &str, context: &StepContext) -> Option<Value> {
    let segments = parse_path(path)?;
    if let Some(first) = segments.first() {
        if let PathSegment::Key(key) = first {
            if let Some(root) = context.step_outputs.get(key) {
                if let Some(value) = walk(root, &segments[1..]) {
                    return Some(value);
                }
            }
        }
    }
    let root = context.as_value();
    walk(&root, &segments)
}

enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parses a restricted grammar: dot-separated identifiers, each optionally
/// followed by one or more `[<digit+>]` index suffixes. No arbitrary
/// expressions.
fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    if path.is_empty() {
        return None;
    }
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut chars = part.char_indices().peekable();
        let mut key_end = part.len();
        for (i, c) in part.char_indices() {
            if c == '[' {
                key_end = i;
                break;
            }
        }
        let key = &part[..key_end];
        if key.is_empty() {
            return None;
        }
        segments.push(PathSegment::Key(key.to_string()));

        let mut remainder = &part[key_end..];
        while !remainder.is_empty() {
            let rest = remainder.strip_prefix('[')?;
            let close = rest.find(']')?;
            let idx: usize = rest[..close].parse().ok()?;
            segments.push(PathSegment::Index(idx));
            remainder = &rest[close + 1..];
        }
        let _ = chars.peek();
    }
    Some(segments)
}

fn walk(root: &Value, segments: &[PathSegment]) -> Option<Value> {
    let mut current = root.clone();
    for segment in segments {
        current = match (segment, &current) {
            (PathSegment::Key(k), Value::Object(map)) => map.get(k)?.clone(),
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_step1_price() -> StepContext {
        let mut ctx = StepContext::empty_for_test();
        ctx.step_outputs
            .insert("step_1".to_string(), serde_json::json!({"price": "190.23"}));
        ctx
    }

    #[test]
    fn exact_token_preserves_type() {
        let mut ctx = StepContext::empty_for_test();
        ctx.step_outputs
            .insert("step_1".to_string(), serde_json::json!({"items": [1, 2, 3]}));
        let resolved = resolve(&serde_json::json!("{{step_1.items}}"), &ctx);
        assert_eq!(resolved, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn embedded_token_stringifies_scalar() {
        let ctx = ctx_with_step1_price();
        let resolved = resolve(&serde_json::json!("Price: {{step_1.price}}"), &ctx);
        assert_eq!(resolved, serde_json::json!("Price: 190.23"));
    }

    #[test]
    fn missing_path_leaves_token_verbatim() {
        let ctx = StepContext::empty_for_test();
        let resolved = resolve(&serde_json::json!("{{step_9.missing}}"), &ctx);
        assert_eq!(resolved, serde_json::json!("{{step_9.missing}}"));
    }

    #[test]
    fn present_but_null_path_leaves_embedded_token_verbatim() {
        let mut ctx = StepContext::empty_for_test();
        ctx.step_outputs
            .insert("step_1".to_string(), serde_json::json!({"foo": null}));
        let resolved = resolve(&serde_json::json!("value: {{step_1.foo}} end"), &ctx);
        assert_eq!(resolved, serde_json::json!("value: {{step_1.foo}} end"));
    }

    #[test]
    fn falls_back_to_context_fields() {
        let ctx = StepContext::empty_for_test();
        let resolved = resolve(&serde_json::json!("{{user.email}}"), &ctx);
        assert_eq!(resolved, serde_json::json!("user@example.com"));
    }

    #[test]
    fn indexed_array_access() {
        let mut ctx = StepContext::empty_for_test();
        ctx.step_outputs.insert(
            "step_1".to_string(),
            serde_json::json!({"items": [{"title": "first"}, {"title": "second"}]}),
        );
        let resolved = resolve(&serde_json::json!("{{step_1.items[0].title}}"), &ctx);
        assert_eq!(resolved, serde_json::json!("first"));
    }

    #[test]
    fn recurses_into_arrays_and_objects() {
        let ctx = ctx_with_step1_price();
        let input = serde_json::json!({"to": "{{user.email}}", "lines": ["{{step_1.price}}"]});
        let resolved = resolve(&input, &ctx);
        assert_eq!(resolved["to"], serde_json::json!("user@example.com"));
        assert_eq!(resolved["lines"][0], serde_json::json!("190.23"));
    }
}
