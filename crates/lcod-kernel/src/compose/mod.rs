//! Compose data model: steps, step sequences and slots.

mod bindings;
mod document;

pub use bindings::{
    is_optional_wrapper, Binding, Bindings, SpreadDescriptor, OPTIONAL_FLAG, SPREAD_KEY,
};
pub use document::Compose;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

/// Name of the default nested sequence.
pub const CHILDREN_SLOT: &str = "children";

/// Alias of [`CHILDREN_SLOT`].
pub const BODY_SLOT: &str = "body";

/// Slot name to step sequence.
pub type SlotMap = HashMap<String, Sequence>;

/// One function invocation in a compose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Call identifier (`lcod://...@version`).
    pub call: String,

    /// Input bindings.
    #[serde(rename = "in", default, skip_serializing_if = "Bindings::is_empty")]
    pub inputs: Bindings,

    /// Output bindings.
    #[serde(rename = "out", default, skip_serializing_if = "Bindings::is_empty")]
    pub outputs: Bindings,

    /// Named nested sequences.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub slots: SlotMap,

    /// Default nested sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Sequence>,

    /// Per-iteration extraction path used by loops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect_path: Option<String>,
}

impl Step {
    /// Create a step calling `call` with no bindings.
    pub fn new(call: impl Into<String>) -> Self {
        Self {
            call: call.into(),
            inputs: Bindings::new(),
            outputs: Bindings::new(),
            slots: SlotMap::new(),
            children: None,
            collect_path: None,
        }
    }

    /// Set the input bindings.
    pub fn with_inputs(mut self, inputs: Bindings) -> Self {
        self.inputs = inputs;
        self
    }

    /// Set the output bindings.
    pub fn with_outputs(mut self, outputs: Bindings) -> Self {
        self.outputs = outputs;
        self
    }

    /// Declare a named slot.
    pub fn with_slot(mut self, name: impl Into<String>, steps: impl Into<Sequence>) -> Self {
        self.slots.insert(name.into(), steps.into());
        self
    }

    /// Set the collect path.
    pub fn with_collect_path(mut self, path: impl Into<String>) -> Self {
        self.collect_path = Some(path.into());
        self
    }

    /// Slots with the default sequence folded in.
    ///
    /// `children` comes first, named slots override it, and a `body` slot
    /// doubles as `children` when the latter is not declared.
    pub fn slot_map(&self) -> SlotMap {
        let mut slots = SlotMap::with_capacity(self.slots.len() + 1);
        if let Some(children) = &self.children {
            slots.insert(CHILDREN_SLOT.to_string(), children.clone());
        }
        for (name, steps) in &self.slots {
            slots.insert(name.clone(), steps.clone());
        }
        if !slots.contains_key(CHILDREN_SLOT) {
            if let Some(body) = slots.get(BODY_SLOT).cloned() {
                slots.insert(CHILDREN_SLOT.to_string(), body);
            }
        }
        slots
    }
}

/// Look up a slot, treating `children` and `body` as the same slot.
pub fn resolve_slot<'a>(slots: &'a SlotMap, name: &str) -> Option<&'a Sequence> {
    slots.get(name).or_else(|| match name {
        CHILDREN_SLOT => slots.get(BODY_SLOT),
        BODY_SLOT => slots.get(CHILDREN_SLOT),
        _ => None,
    })
}

/// Immutable, cheaply clonable list of steps.
///
/// `null` entries are dropped while parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence(Arc<[Step]>);

impl Sequence {
    /// An empty sequence.
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for Sequence {
    type Target = [Step];

    fn deref(&self) -> &[Step] {
        &self.0
    }
}

impl From<Vec<Step>> for Sequence {
    fn from(steps: Vec<Step>) -> Self {
        Self(Arc::from(steps))
    }
}

impl FromIterator<Step> for Sequence {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for Sequence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let steps: Vec<Option<Step>> = Vec::deserialize(deserializer)?;
        Ok(steps.into_iter().flatten().collect())
    }
}

impl Serialize for Sequence {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_deserialization() {
        let step: Step = serde_json::from_value(json!({
            "call": "lcod://flow/foreach@1",
            "in": {"list": "$.numbers"},
            "out": {"results": "results"},
            "slots": {
                "body": [{"call": "lcod://impl/echo@1"}, null],
                "else": []
            },
            "collectPath": "$.val"
        }))
        .unwrap();

        assert_eq!(step.call, "lcod://flow/foreach@1");
        assert_eq!(step.collect_path.as_deref(), Some("$.val"));
        assert_eq!(step.slots["body"].len(), 1);
        assert!(step.slots["else"].is_empty());
    }

    #[test]
    fn test_slot_map_aliases_body_and_children() {
        let child = Step::new("lcod://impl/set@1");
        let step = Step::new("lcod://flow/foreach@1").with_slot("body", vec![child.clone()]);
        let slots = step.slot_map();

        assert_eq!(slots["children"][0], child);
        assert_eq!(resolve_slot(&slots, "body").map(|s| s.len()), Some(1));

        let step: Step = serde_json::from_value(json!({
            "call": "lcod://flow/try@1",
            "children": [{"call": "lcod://impl/set@1"}]
        }))
        .unwrap();
        let slots = step.slot_map();
        assert!(resolve_slot(&slots, "body").is_some());
        assert!(resolve_slot(&slots, "catch").is_none());
    }

    #[test]
    fn test_named_slot_overrides_children() {
        let step = Step {
            children: Some(vec![Step::new("a")].into()),
            ..Step::new("x").with_slot("children", vec![Step::new("b")])
        };
        assert_eq!(step.slot_map()["children"][0].call, "b");
    }

    #[test]
    fn test_step_serialization_skips_empty_fields() {
        let step = Step::new("lcod://impl/set@1");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json, json!({"call": "lcod://impl/set@1"}));
    }
}
