//! Path expressions over state and slot variables.
//!
//! `$.a.b.2` walks the state, `$slot.item` walks the slot variables. Map
//! segments are keys, list segments are integer indexes. A missing segment or
//! a segment applied to the wrong shape yields `None` (absent), never an error.

use serde_json::Value;

use crate::value::State;

/// Root name of state paths.
pub const STATE_ROOT: &str = "$";

/// Root name of slot-variable paths.
pub const SLOT_ROOT: &str = "$slot";

/// Returns true when `s` is a state or slot path expression.
pub fn is_path(s: &str) -> bool {
    s.starts_with("$.") || s.starts_with("$slot.")
}

/// Follow `segments` into `value`.
pub fn select<'v, 's>(
    value: &'v Value,
    segments: impl IntoIterator<Item = &'s str>,
) -> Option<&'v Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a `$.`-prefixed path relative to a single value.
pub fn select_relative<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let rest = path.strip_prefix(STATE_ROOT)?;
    if rest.is_empty() {
        return Some(value);
    }
    select(value, rest.strip_prefix('.')?.split('.'))
}

/// The two roots a path expression can start from.
#[derive(Debug, Clone, Copy)]
pub struct Roots<'a> {
    state: &'a State,
    slot: &'a State,
}

impl<'a> Roots<'a> {
    /// Create roots over a state and its slot variables.
    pub fn new(state: &'a State, slot: &'a State) -> Self {
        Self { state, slot }
    }

    /// The state root.
    pub fn state(&self) -> &'a State {
        self.state
    }

    /// Resolve `path` to an owned copy of the addressed value.
    ///
    /// A bare root (`$` or `$slot`) yields the whole map.
    pub fn resolve(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let root = match segments.next()? {
            STATE_ROOT => self.state,
            SLOT_ROOT => self.slot,
            _ => return None,
        };
        let Some(first) = segments.next() else {
            return Some(Value::Object(root.clone()));
        };
        let head = root.get(first)?;
        select(head, segments).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::into_state;
    use serde_json::json;

    fn state(value: Value) -> State {
        into_state(value).unwrap()
    }

    #[test]
    fn test_resolve_state_and_slot_paths() {
        let s = state(json!({"a": {"b": [10, 20, {"c": true}]}}));
        let slot = state(json!({"item": "x", "index": 1}));
        let roots = Roots::new(&s, &slot);

        assert_eq!(roots.resolve("$.a.b.1"), Some(json!(20)));
        assert_eq!(roots.resolve("$.a.b.2.c"), Some(json!(true)));
        assert_eq!(roots.resolve("$slot.item"), Some(json!("x")));
        assert_eq!(roots.resolve("$slot"), Some(json!({"item": "x", "index": 1})));
    }

    #[test]
    fn test_missing_or_wrong_shape_is_absent() {
        let s = state(json!({"a": {"b": [1]}, "n": 3}));
        let slot = State::new();
        let roots = Roots::new(&s, &slot);

        assert_eq!(roots.resolve("$.missing"), None);
        assert_eq!(roots.resolve("$.a.b.5"), None);
        assert_eq!(roots.resolve("$.a.b.x"), None);
        assert_eq!(roots.resolve("$.n.deeper"), None);
        assert_eq!(roots.resolve("$slot.item"), None);
        assert_eq!(roots.resolve("other.a"), None);
    }

    #[test]
    fn test_stored_null_is_present() {
        let s = state(json!({"a": null}));
        let slot = State::new();
        assert_eq!(Roots::new(&s, &slot).resolve("$.a"), Some(Value::Null));
    }

    #[test]
    fn test_resolution_is_a_fresh_copy() {
        let s = state(json!({"obj": {"list": [1, 2]}}));
        let slot = State::new();
        let roots = Roots::new(&s, &slot);

        let mut first = roots.resolve("$.obj").unwrap();
        let second = roots.resolve("$.obj").unwrap();
        first["list"][0] = json!(99);

        assert_eq!(second, json!({"list": [1, 2]}));
        assert_eq!(s["obj"], json!({"list": [1, 2]}));
    }

    #[test]
    fn test_select_relative() {
        let v = json!({"payload": {"x": 1}});
        assert_eq!(select_relative(&v, "$"), Some(&v));
        assert_eq!(select_relative(&v, "$.payload.x"), Some(&json!(1)));
        assert_eq!(select_relative(&v, "payload"), None);
        assert!(is_path("$.a"));
        assert!(is_path("$slot.item"));
        assert!(!is_path("$"));
        assert!(!is_path("literal"));
    }
}
