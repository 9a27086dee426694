//! Output projection: merging a step result back into the state.

use serde_json::Value;

use super::input::RESULT_REF;
use super::merge_spread;
use crate::compose::Bindings;
use crate::path::{select_relative, STATE_ROOT};
use crate::value::State;

/// Apply `out` bindings of a step to `state`.
///
/// Spreads only apply to map results. A plain binding reads:
/// - the whole result for `"$"`;
/// - a sub-value for a `"$.path"` alias;
/// - the named key of a map result for any other string.
pub fn apply_outputs(state: &mut State, bindings: &Bindings, result: &Value) {
    if result.is_object() {
        for spread in bindings.spreads() {
            let payload = spread_payload(&spread.source, result);
            merge_spread(state, payload, spread);
        }
    }

    for (key, binding) in bindings.entries() {
        match read_alias(binding.expr(), result) {
            Some(value) => {
                state.insert(key.to_string(), value);
            }
            None if binding.is_optional() => {}
            None => {
                state.insert(key.to_string(), Value::Null);
            }
        }
    }
}

fn spread_payload(source: &Value, result: &Value) -> Option<Value> {
    match source.as_str() {
        Some(path) if path.starts_with("$.") => select_relative(result, path).cloned(),
        _ => Some(result.clone()),
    }
}

fn read_alias(alias: &Value, result: &Value) -> Option<Value> {
    let alias = alias.as_str()?;
    if alias == STATE_ROOT || alias == RESULT_REF {
        return Some(result.clone());
    }
    if alias.starts_with("$.") {
        return select_relative(result, alias).cloned();
    }
    result.as_object()?.get(alias).cloned()
}
