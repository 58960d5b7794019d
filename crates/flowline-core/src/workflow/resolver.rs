//! Value resolution for step inputs and output bindings.
//!
//! A binding is either a literal or a `$`-prefixed dotted path into the
//! execution context (`$order.customer.id`). Paths only descend through maps;
//! any other value along the way means the binding is undefined, which is
//! reported as `None` rather than as an error.

use std::collections::BTreeMap;

use flowline_types::context::{ContextMap, ContextValue, ExecutionContext};

/// Prefix marking a string binding as a context path.
pub const PATH_SENTINEL: char = '$';

/// Resolve a binding expression against the context.
///
/// Strings starting with `$` are looked up as paths; every other value
/// (including maps and lists) is returned as-is.
pub fn resolve(expr: &ContextValue, context: &ExecutionContext) -> Option<ContextValue> {
    match expr {
        ContextValue::String(s) => match s.strip_prefix(PATH_SENTINEL) {
            Some(path) => lookup_path(context.as_map(), path).cloned(),
            None => Some(expr.clone()),
        },
        other => Some(other.clone()),
    }
}

/// Walk a dot-delimited path through nested maps.
///
/// Empty paths and empty segments never match.
pub fn lookup_path<'a>(map: &'a ContextMap, path: &str) -> Option<&'a ContextValue> {
    let mut segments = path.split('.');
    let first = segments.next().filter(|s| !s.is_empty())?;
    let mut current = map.get(first)?;
    for segment in segments {
        if segment.is_empty() {
            return None;
        }
        current = match current {
            ContextValue::Map(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve every input binding of a step.
///
/// Undefined bindings are left out of the returned map.
pub fn resolve_inputs(
    inputs: &BTreeMap<String, ContextValue>,
    context: &ExecutionContext,
) -> ContextMap {
    let mut resolved = ContextMap::new();
    for (name, expr) in inputs {
        match resolve(expr, context) {
            Some(value) => {
                resolved.insert(name.clone(), value);
            }
            None => {
                tracing::debug!(input = %name, binding = %expr, "input binding is undefined");
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx(json: serde_json::Value) -> ExecutionContext {
        ExecutionContext::from(flowline_types::context::map_from_json(json).unwrap())
    }

    #[test]
    fn resolves_top_level_and_nested_paths() {
        let context = ctx(serde_json::json!({ "seed": 42, "a": { "b": { "c": "deep" } } }));
        assert_eq!(
            resolve(&"$seed".into(), &context),
            Some(ContextValue::Number(42.0))
        );
        assert_eq!(
            resolve(&"$a.b.c".into(), &context),
            Some(ContextValue::from("deep"))
        );
        assert!(matches!(
            resolve(&"$a.b".into(), &context),
            Some(ContextValue::Map(_))
        ));
    }

    #[test]
    fn undefined_path_through_scalar_is_none() {
        let context = ctx(serde_json::json!({ "a": { "b": 1 } }));
        assert_eq!(resolve(&"$a.b.c".into(), &context), None);
        assert_eq!(resolve(&"$missing".into(), &context), None);
        assert_eq!(resolve(&"$".into(), &context), None);
    }

    #[test]
    fn empty_segments_never_match() {
        let mut inner = ContextMap::new();
        inner.insert(String::new(), ContextValue::from("blank"));
        inner.insert("b".to_string(), ContextValue::Number(1.0));
        let mut context = ExecutionContext::new();
        context.insert("a", ContextValue::Map(inner));

        assert_eq!(resolve(&"$a..b".into(), &context), None);
        assert_eq!(resolve(&"$a.".into(), &context), None);
        assert_eq!(resolve(&"$.a".into(), &context), None);
        assert_eq!(resolve(&"$a.b".into(), &context), Some(ContextValue::Number(1.0)));
    }

    #[test]
    fn lists_null_and_timestamps_stop_the_walk() {
        let mut context = ctx(serde_json::json!({ "list": [{ "x": 1 }], "nothing": null }));
        context.insert("when", ContextValue::Timestamp(Utc::now()));

        assert_eq!(resolve(&"$list.0".into(), &context), None);
        assert_eq!(resolve(&"$nothing.x".into(), &context), None);
        assert_eq!(resolve(&"$when.year".into(), &context), None);
        assert_eq!(
            resolve(&"$nothing".into(), &context),
            Some(ContextValue::Null)
        );
    }

    #[test]
    fn non_path_values_are_literals() {
        let context = ExecutionContext::new();
        assert_eq!(
            resolve(&"plain".into(), &context),
            Some(ContextValue::from("plain"))
        );
        assert_eq!(
            resolve(&ContextValue::Number(3.0), &context),
            Some(ContextValue::Number(3.0))
        );

        let mut nested = ContextMap::new();
        nested.insert("ref".to_string(), "$seed".into());
        let literal = ContextValue::Map(nested);
        assert_eq!(resolve(&literal, &context), Some(literal.clone()));
    }

    #[test]
    fn resolve_inputs_omits_undefined_bindings() {
        let context = ctx(serde_json::json!({ "seed": 42 }));
        let mut inputs = BTreeMap::new();
        inputs.insert("x".to_string(), "$seed".into());
        inputs.insert("y".to_string(), "$nope".into());
        inputs.insert("z".to_string(), "literal".into());

        let resolved = resolve_inputs(&inputs, &context);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["x"], ContextValue::Number(42.0));
        assert_eq!(resolved["z"], ContextValue::from("literal"));
        assert!(!resolved.contains_key("y"));
    }
}
