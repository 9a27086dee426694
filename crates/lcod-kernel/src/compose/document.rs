//! Compose documents (`{compose: [...]}`) in YAML or JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Sequence, Step};
use crate::error::KernelError;

/// A parsed compose document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Compose {
    /// Top-level steps; empty when the document has no `compose` key.
    #[serde(default)]
    pub compose: Sequence,
}

impl Compose {
    /// Parse a YAML document.
    pub fn from_yaml_str(source: &str) -> Result<Self, KernelError> {
        let value: Value = serde_yaml::from_str(source)?;
        Self::from_value(value)
    }

    /// Parse a JSON document.
    pub fn from_json_str(source: &str) -> Result<Self, KernelError> {
        let value: Value = serde_json::from_str(source)?;
        Self::from_value(value)
    }

    /// Build from an already parsed value.
    pub fn from_value(value: Value) -> Result<Self, KernelError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(mut map) => match map.remove("compose") {
                None | Some(Value::Null) => Ok(Self::default()),
                Some(steps @ Value::Array(_)) => {
                    let compose = serde_json::from_value(steps)
                        .map_err(|e| KernelError::Parse(e.to_string()))?;
                    Ok(Self { compose })
                }
                Some(_) => Err(KernelError::Parse("compose must be a list of steps".to_string())),
            },
            _ => Err(KernelError::Parse("compose document must be an object".to_string())),
        }
    }

    /// The top-level steps.
    pub fn steps(&self) -> &[Step] {
        &self.compose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FOREACH_DEMO: &str = r#"
compose:
  - call: lcod://flow/foreach@1
    in:
      list: $.numbers
    collectPath: $.val
    slots:
      body:
        - call: lcod://impl/echo@1
          in:
            value: $slot.item
          out:
            val: val
      else:
        - call: lcod://impl/echo@1
          in:
            value: empty
          out:
            val: val
    out:
      results: results
"#;

    #[test]
    fn test_parse_yaml_compose() {
        let compose = Compose::from_yaml_str(FOREACH_DEMO).unwrap();
        assert_eq!(compose.steps().len(), 1);

        let step = &compose.steps()[0];
        assert_eq!(step.call, "lcod://flow/foreach@1");
        assert_eq!(step.collect_path.as_deref(), Some("$.val"));
        assert_eq!(step.slots["body"][0].call, "lcod://impl/echo@1");
    }

    #[test]
    fn test_parse_json_skips_null_steps() {
        let compose = Compose::from_json_str(
            r#"{"compose": [null, {"call": "lcod://impl/set@1", "in": {"a": 1}}]}"#,
        )
        .unwrap();
        assert_eq!(compose.steps().len(), 1);
    }

    #[test]
    fn test_missing_compose_is_empty() {
        assert!(Compose::from_value(json!({"id": "demo"})).unwrap().steps().is_empty());
        assert!(Compose::from_yaml_str("compose: null").unwrap().steps().is_empty());
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            Compose::from_value(json!({"compose": "nope"})),
            Err(KernelError::Parse(_))
        ));
        assert!(matches!(
            Compose::from_value(json!({"compose": [{"in": {}}]})),
            Err(KernelError::Parse(_))
        ));
        assert!(matches!(Compose::from_yaml_str("a: [1"), Err(KernelError::Yaml(_))));
    }
}
