//! Input projection: evaluating `in` bindings against state and slot variables.

use serde_json::Value;

use super::merge_spread;
use crate::compose::{is_optional_wrapper, Bindings};
use crate::path::{is_path, Roots};
use crate::value::{is_step_definition, State};

/// Reserved string resolving to a copy of the whole state.
pub const STATE_REF: &str = "__lcod_state__";

/// Reserved string naming the step result; absent on input.
pub const RESULT_REF: &str = "__lcod_result__";

/// Nested key copied verbatim instead of being resolved.
const VERBATIM_KEY: &str = "bindings";

/// Build a step input from its `in` bindings.
///
/// Spreads are applied first in declaration order, then keyed bindings, so an
/// explicit key always wins over a spread key of the same name.
pub fn build_input(bindings: &Bindings, roots: &Roots<'_>) -> State {
    let mut input = State::new();
    for spread in bindings.spreads() {
        let payload = resolve_value(&spread.source, roots);
        merge_spread(&mut input, payload, spread);
    }
    for (key, binding) in bindings.entries() {
        match resolve_value(binding.expr(), roots) {
            Some(value) => {
                input.insert(key.to_string(), value);
            }
            None if binding.is_optional() => {}
            None => {
                input.insert(key.to_string(), Value::Null);
            }
        }
    }
    input
}

/// Resolve one binding expression.
///
/// Returns `None` when a path does not lead anywhere. Nested lists and maps
/// are resolved member by member, except step definitions which are data.
pub fn resolve_value(value: &Value, roots: &Roots<'_>) -> Option<Value> {
    match value {
        Value::String(s) => resolve_str(s, roots),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| resolve_nested(item, roots).unwrap_or(Value::Null))
                .collect(),
        )),
        Value::Object(map) if is_optional_wrapper(map) => {
            resolve_value(map.get("value").unwrap_or(&Value::Null), roots)
        }
        Value::Object(_) if is_step_definition(value) => Some(value.clone()),
        Value::Object(map) => {
            let mut resolved = State::new();
            for (key, member) in map {
                if key == VERBATIM_KEY {
                    resolved.insert(key.clone(), member.clone());
                    continue;
                }
                match resolve_nested(member, roots) {
                    Some(v) => {
                        resolved.insert(key.clone(), v);
                    }
                    None if member.as_object().is_some_and(is_optional_wrapper) => {}
                    None => {
                        resolved.insert(key.clone(), Value::Null);
                    }
                }
            }
            Some(Value::Object(resolved))
        }
        other => Some(other.clone()),
    }
}

fn resolve_nested(value: &Value, roots: &Roots<'_>) -> Option<Value> {
    if is_step_definition(value) {
        return Some(value.clone());
    }
    resolve_value(value, roots)
}

fn resolve_str(s: &str, roots: &Roots<'_>) -> Option<Value> {
    match s {
        STATE_REF => Some(Value::Object(roots.state().clone())),
        RESULT_REF => None,
        path if is_path(path) => roots.resolve(path),
        literal => Some(Value::String(literal.to_string())),
    }
}
