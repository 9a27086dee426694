//! `in`/`out` binding descriptors.
//!
//! On the wire a binding map is a plain object. Two reserved shapes are
//! recognised:
//! - `"__lcod_spreads__": [{source, pick?, optional?}, ...]` projects keys of
//!   an object into the surrounding map;
//! - `{"__lcod_optional__": true, "value": ...}` omits the key when the value
//!   resolves to nothing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::KernelError;

/// Reserved key holding spread descriptors.
pub const SPREAD_KEY: &str = "__lcod_spreads__";

/// Reserved flag marking an optional binding.
pub const OPTIONAL_FLAG: &str = "__lcod_optional__";

/// Projects all keys (or the `pick` subset) of the object at `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadDescriptor {
    /// Where the object comes from (path expression or literal).
    #[serde(default)]
    pub source: Value,

    /// Keys to copy; all keys when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pick: Option<Vec<String>>,

    /// Skip picked keys that are missing instead of writing `null`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl SpreadDescriptor {
    /// Spread every key of `source`.
    pub fn new(source: impl Into<Value>) -> Self {
        Self {
            source: source.into(),
            pick: None,
            optional: false,
        }
    }

    /// Restrict the spread to `keys`.
    pub fn pick<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pick = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Mark the spread optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// One keyed binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Always written; an absent value becomes `null`.
    Required(Value),
    /// Omitted entirely when the value is absent.
    Optional(Value),
}

impl Binding {
    /// The wrapped expression.
    pub fn expr(&self) -> &Value {
        match self {
            Binding::Required(v) | Binding::Optional(v) => v,
        }
    }

    /// Returns true for optional bindings.
    pub fn is_optional(&self) -> bool {
        matches!(self, Binding::Optional(_))
    }

    fn from_wire(value: Value) -> Self {
        match value {
            Value::Object(mut map) if is_optional_wrapper(&map) => {
                Binding::Optional(map.remove("value").unwrap_or(Value::Null))
            }
            other => Binding::Required(other),
        }
    }

    fn to_wire(&self) -> Value {
        match self {
            Binding::Required(v) => v.clone(),
            Binding::Optional(v) => {
                let mut map = Map::new();
                map.insert(OPTIONAL_FLAG.to_string(), Value::Bool(true));
                map.insert("value".to_string(), v.clone());
                Value::Object(map)
            }
        }
    }
}

/// Returns true when `map` is an optional wrapper.
pub fn is_optional_wrapper(map: &Map<String, Value>) -> bool {
    map.get(OPTIONAL_FLAG) == Some(&Value::Bool(true))
}

/// Parsed `in` or `out` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Bindings {
    spreads: Vec<SpreadDescriptor>,
    entries: Vec<(String, Binding)>,
}

impl Bindings {
    /// Create an empty binding map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required binding.
    pub fn bind(mut self, key: impl Into<String>, expr: impl Into<Value>) -> Self {
        self.insert(key.into(), Binding::Required(expr.into()));
        self
    }

    /// Add an optional binding.
    pub fn bind_optional(mut self, key: impl Into<String>, expr: impl Into<Value>) -> Self {
        self.insert(key.into(), Binding::Optional(expr.into()));
        self
    }

    /// Add a spread descriptor.
    pub fn spread(mut self, descriptor: SpreadDescriptor) -> Self {
        self.spreads.push(descriptor);
        self
    }

    /// Spread descriptors in declaration order.
    pub fn spreads(&self) -> &[SpreadDescriptor] {
        &self.spreads
    }

    /// Keyed bindings in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.entries.iter().map(|(k, b)| (k.as_str(), b))
    }

    /// Returns true when there is nothing to bind.
    pub fn is_empty(&self) -> bool {
        self.spreads.is_empty() && self.entries.is_empty()
    }

    fn insert(&mut self, key: String, binding: Binding) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = binding,
            None => self.entries.push((key, binding)),
        }
    }
}

impl TryFrom<Map<String, Value>> for Bindings {
    type Error = KernelError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut bindings = Bindings::new();
        for (key, value) in map {
            if key != SPREAD_KEY {
                bindings.insert(key, Binding::from_wire(value));
                continue;
            }
            let Value::Array(descriptors) = value else {
                return Err(KernelError::InvalidBinding(format!(
                    "{SPREAD_KEY} must be a list of spread descriptors"
                )));
            };
            for descriptor in descriptors {
                if !descriptor.is_object() {
                    continue;
                }
                let descriptor: SpreadDescriptor = serde_json::from_value(descriptor)
                    .map_err(|e| KernelError::InvalidBinding(e.to_string()))?;
                bindings.spreads.push(descriptor);
            }
        }
        Ok(bindings)
    }
}

impl From<Bindings> for Map<String, Value> {
    fn from(bindings: Bindings) -> Self {
        let mut map = Map::new();
        if !bindings.spreads.is_empty() {
            let spreads = bindings
                .spreads
                .iter()
                .filter_map(|s| serde_json::to_value(s).ok())
                .collect();
            map.insert(SPREAD_KEY.to_string(), Value::Array(spreads));
        }
        for (key, binding) in &bindings.entries {
            map.insert(key.clone(), binding.to_wire());
        }
        map
    }
}
