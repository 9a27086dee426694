//! Compose contracts implemented by the kernel itself.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::{ExecutionContext, StepMeta};
use crate::error::{Interrupt, KernelError, KernelResult};
use crate::registry::Registry;
use crate::value::State;

pub const RUN_SLOT: &str = "lcod://contract/compose/run_slot@1";

/// Code reported when a slot run by [`RUN_SLOT`] fails.
pub const SLOT_EXECUTION_FAILED: &str = "slot_execution_failed";

/// Register the kernel contracts.
pub fn register(registry: &mut Registry) -> &mut Registry {
    registry.register(RUN_SLOT, run_slot)
}

/// `run_slot` input.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunSlotInput {
    #[serde(default)]
    slot: Option<Value>,

    #[serde(default)]
    optional: Option<Value>,

    #[serde(default)]
    state: Option<Value>,

    #[serde(default)]
    slot_vars: Option<Value>,
}

/// Run one of the calling step's slots and report the outcome as data.
///
/// Returns `{ran: false, result: null}` when an optional slot is not declared,
/// `{ran: true, result}` on success and `{ran: true, error: {message, code}}`
/// when the slot fails, cancellation included. Loop signals are not caught;
/// a cancelled run still stops at the next step boundary.
pub fn run_slot(ctx: &mut ExecutionContext, input: State, meta: &StepMeta) -> KernelResult<Value> {
    let input: RunSlotInput = serde_json::from_value(Value::Object(input))?;
    let slot = match input.slot {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => return Err(KernelError::InvalidInput("slot must be provided".to_string()).into()),
    };
    let optional = matches!(input.optional, Some(Value::Bool(true)));
    if optional && !meta.has_slot(&slot) {
        tracing::trace!(slot = %slot, "Optional slot not declared, skipping");
        return Ok(json!({ "ran": false, "result": null }));
    }

    let state = input.state.and_then(crate::value::into_state);
    let slot_vars = input.slot_vars.and_then(crate::value::into_state);
    match ctx.run_slot(&slot, state, slot_vars) {
        Ok(result) => Ok(json!({ "ran": true, "result": result })),
        Err(Interrupt::Error(e)) => {
            tracing::debug!(slot = %slot, error = %e, "Slot execution failed");
            Ok(json!({
                "ran": true,
                "error": { "message": e.to_string(), "code": SLOT_EXECUTION_FAILED }
            }))
        }
        Err(signal) => Err(signal),
    }
}
