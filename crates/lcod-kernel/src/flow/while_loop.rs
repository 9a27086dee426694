//! `lcod://flow/while@1`.

use serde_json::{json, Value};

use super::FlowSignal;
use crate::context::{ExecutionContext, StepMeta};
use crate::error::{FlowError, Interrupt, KernelResult};
use crate::value::{is_truthy, type_name, State};

/// Loop `condition` then `body` over an explicit `state`.
///
/// Both slots receive a copy of the loop state as their starting state and
/// `{index, state}` as slot variables. The body's final state becomes the
/// loop state. The condition slot may replace the state through a `state`
/// key. `else` runs when the body never ran. Returns `{state, iterations}`.
pub fn flow_while(
    ctx: &mut ExecutionContext,
    mut input: State,
    meta: &StepMeta,
) -> KernelResult<Value> {
    let mut state = initial_state(input.remove("state"))?;
    let max_iterations = max_iterations(input.remove("maxIterations"))?;
    let mut iterations: u64 = 0;

    loop {
        ctx.ensure_not_cancelled()?;
        if let Some(max) = max_iterations {
            if iterations >= max {
                return Err(FlowError::new(
                    "flow_while_max_iterations",
                    format!("flow/while exceeded maxIterations ({max})"),
                )
                .into());
            }
        }

        let vars = loop_vars(json!(iterations), &state);
        let output = ctx.run_slot("condition", Some(state.clone()), Some(vars.clone()))?;
        ctx.ensure_not_cancelled()?;
        let (proceed, replacement) = interpret_condition(output)?;
        if let Some(replacement) = replacement {
            state = replacement;
        }
        if !proceed {
            break;
        }

        iterations += 1;
        match ctx.run_slot("body", Some(state.clone()), Some(vars)) {
            Ok(next) => state = next,
            Err(Interrupt::Signal(FlowSignal::Continue)) => continue,
            Err(Interrupt::Signal(FlowSignal::Break)) => break,
            Err(e) => return Err(e),
        }
    }

    if iterations == 0 && meta.has_slot("else") {
        let vars = loop_vars(json!(-1), &state);
        state = ctx.run_slot("else", Some(state.clone()), Some(vars))?;
    }

    tracing::trace!(iterations, "while loop finished");
    Ok(json!({ "state": state, "iterations": iterations }))
}

fn initial_state(raw: Option<Value>) -> KernelResult<State> {
    match raw {
        None | Some(Value::Null) => Ok(State::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(FlowError::new(
            "flow_while_invalid_state",
            "flow/while state must be an object",
        )
        .with_data(json!({ "type": type_name(&other) }))
        .into()),
    }
}

/// Zero or negative limits mean unbounded.
fn max_iterations(raw: Option<Value>) -> KernelResult<Option<u64>> {
    let invalid = |message: &str, value: Value| -> Interrupt {
        FlowError::new("flow_while_invalid_max_iterations", message)
            .with_data(json!({ "value": value }))
            .into()
    };
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let Some(f) = n.as_f64() else {
                return Err(invalid("maxIterations must be numeric", Value::Number(n)));
            };
            if f <= 0.0 {
                return Ok(None);
            }
            if f.fract() != 0.0 {
                return Err(invalid("maxIterations must be an integer", Value::Number(n)));
            }
            Ok(Some(f as u64))
        }
        Some(other) => Err(invalid("maxIterations must be numeric", other)),
    }
}

fn loop_vars(index: Value, state: &State) -> State {
    let mut vars = State::new();
    vars.insert("index".to_string(), index);
    vars.insert("state".to_string(), Value::Object(state.clone()));
    vars
}

/// Read the verdict of the condition slot.
///
/// The first present key among `continue`, `cond` and `value` decides; an
/// empty state means stop.
fn interpret_condition(mut output: State) -> KernelResult<(bool, Option<State>)> {
    let replacement = match output.get("state") {
        Some(Value::Object(map)) => Some(map.clone()),
        _ => None,
    };
    let empty = output.is_empty();
    let candidate = ["continue", "cond", "value"]
        .into_iter()
        .find(|key| output.contains_key(*key))
        .and_then(|key| output.remove(key))
        .filter(|v| !v.is_null());
    match candidate {
        Some(verdict) => Ok((is_truthy(&verdict), replacement)),
        None if empty => Ok((false, replacement)),
        None => Err(FlowError::new(
            "flow_while_invalid_condition",
            "condition slot must return a boolean or object with cond/value",
        )
        .into()),
    }
}
