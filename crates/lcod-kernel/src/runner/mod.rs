//! Compose runner: executes a sequence of steps against an evolving state.
//!
//! For every step the runner:
//! 1. checks cancellation;
//! 2. resolves `in` against the current state and slot variables;
//! 3. installs a step frame so the invoked function can run the step's slots;
//! 4. dispatches through the context inside a cleanup scope;
//! 5. removes the frame (also on failure) and applies `out` to the state.

mod input;
mod output;

pub use input::{build_input, resolve_value, RESULT_REF, STATE_REF};
pub use output::apply_outputs;

use serde_json::Value;
use std::sync::Arc;

use crate::compose::{SpreadDescriptor, Step};
use crate::context::{ExecutionContext, StepFrame, StepMeta};
use crate::error::{KernelError, KernelResult};
use crate::path::Roots;
use crate::value::State;

/// Run `steps` starting from `initial` (empty when `None`).
///
/// Returns the final state. Errors and control signals raised by a step stop
/// the sequence and are returned as they are.
pub fn run_steps(
    ctx: &mut ExecutionContext,
    steps: &[Step],
    initial: Option<State>,
    slot_vars: State,
) -> KernelResult<State> {
    let mut state = initial.unwrap_or_default();

    for (index, step) in steps.iter().enumerate() {
        ctx.ensure_not_cancelled()?;
        tracing::debug!(index, call = %step.call, "Running step");

        let input = build_input(&step.inputs, &Roots::new(&state, &slot_vars));
        let slots = Arc::new(step.slot_map());
        let meta = StepMeta {
            slots: Arc::clone(&slots),
            slot_vars: slot_vars.clone(),
            collect_path: step.collect_path.clone(),
        };

        ctx.push_frame(StepFrame {
            slots,
            state,
            slot_vars: slot_vars.clone(),
        });
        let result = ctx.scoped(|ctx| ctx.call(&step.call, input, &meta));
        state = ctx
            .pop_frame()
            .map(|frame| frame.state)
            .ok_or(KernelError::RunnerUnavailable("run_steps"))?;

        let result = result?;
        apply_outputs(&mut state, &step.outputs, &result);
    }

    Ok(state)
}

/// Merge the keys of a spread payload into `target`.
///
/// A payload that is absent or not a map contributes nothing. With `pick`,
/// missing keys are written as `null` unless the spread is optional.
pub(crate) fn merge_spread(target: &mut State, payload: Option<Value>, spread: &SpreadDescriptor) {
    let Some(Value::Object(mut payload)) = payload else {
        tracing::debug!(source = %spread.source, "Spread source is not an object, skipping");
        return;
    };
    match &spread.pick {
        Some(keys) => {
            for key in keys {
                match payload.remove(key) {
                    Some(value) => {
                        target.insert(key.clone(), value);
                    }
                    None if spread.optional => {}
                    None => {
                        target.insert(key.clone(), Value::Null);
                    }
                }
            }
        }
        None => target.extend(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{Bindings, Sequence};
    use crate::registry::Registry;
    use crate::value::into_state;
    use serde_json::json;
    use std::sync::Mutex;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register("lcod://impl/echo@1", |_ctx, input, _meta| Ok(Value::Object(input)))
            .register("lcod://impl/fail@1", |_ctx, _input, _meta| {
                Err(KernelError::InvalidInput("boom".to_string()).into())
            })
            .register("lcod://impl/children@1", |ctx, _input, _meta| {
                Ok(Value::Object(ctx.run_slot("children", None, None)?))
            });
        registry
    }

    fn context(registry: Registry) -> ExecutionContext {
        ExecutionContext::new(Arc::new(registry))
    }

    fn run(ctx: &mut ExecutionContext, steps: Vec<Step>, initial: Value) -> KernelResult<State> {
        run_steps(ctx, &steps, into_state(initial), State::new())
    }

    #[test]
    fn test_steps_thread_state() {
        let mut ctx = context(registry());
        let steps = vec![
            Step::new("lcod://impl/echo@1")
                .with_inputs(Bindings::new().bind("value", 1))
                .with_outputs(Bindings::new().bind("a", "value")),
            Step::new("lcod://impl/echo@1")
                .with_inputs(Bindings::new().bind("value", "$.a"))
                .with_outputs(Bindings::new().bind("b", "value")),
        ];

        let state = run(&mut ctx, steps, json!({"seed": true})).unwrap();
        assert_eq!(Value::Object(state), json!({"seed": true, "a": 1, "b": 1}));
    }

    #[test]
    fn test_state_isolation_between_steps() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = registry();
        let log = Arc::clone(&seen);
        registry.register("lcod://impl/record@1", move |_ctx, input, _meta| {
            log.lock().unwrap().push(Value::Object(input));
            Ok(json!({}))
        });
        let mut ctx = context(registry);

        let steps = vec![
            Step::new("lcod://impl/echo@1")
                .with_inputs(Bindings::new().bind("k", "written"))
                .with_outputs(Bindings::new().bind("k", "k")),
            Step::new("lcod://impl/record@1").with_inputs(Bindings::new().bind("other", "$.other")),
        ];
        run(&mut ctx, steps, json!({"other": {"x": 1}})).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!({"other": {"x": 1}})]);
    }

    #[test]
    fn test_input_is_a_copy_of_state() {
        let mut registry = registry();
        registry.register("lcod://impl/mutate@1", |_ctx, mut input, _meta| {
            if let Some(Value::Object(obj)) = input.get_mut("obj") {
                obj.insert("x".to_string(), json!(99));
            }
            Ok(json!({}))
        });
        let mut ctx = context(registry);

        let steps = vec![Step::new("lcod://impl/mutate@1").with_inputs(Bindings::new().bind("obj", "$.obj"))];
        let state = run(&mut ctx, steps, json!({"obj": {"x": 1}})).unwrap();
        assert_eq!(state["obj"], json!({"x": 1}));
    }

    #[test]
    fn test_failure_stops_sequence() {
        let mut ctx = context(registry());
        let steps = vec![
            Step::new("lcod://impl/fail@1"),
            Step::new("lcod://impl/echo@1").with_outputs(Bindings::new().bind("reached", "$")),
        ];

        let err = run(&mut ctx, steps, json!({})).unwrap_err().into_error();
        assert!(matches!(err, KernelError::InvalidInput(_)));
    }

    #[test]
    fn test_unknown_call_is_fatal() {
        let mut ctx = context(registry());
        let steps = vec![Step::new("lcod://impl/missing@1")];
        let err = run(&mut ctx, steps, json!({})).unwrap_err().into_error();
        assert!(matches!(err, KernelError::FunctionNotRegistered(id) if id == "lcod://impl/missing@1"));
    }

    #[test]
    fn test_cancellation_before_step() {
        let mut ctx = context(registry());
        ctx.cancel();
        let steps = vec![Step::new("lcod://impl/echo@1")];
        let err = run(&mut ctx, steps, json!({})).unwrap_err().into_error();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_slots_run_against_a_copy_of_caller_state() {
        let mut ctx = context(registry());
        let inner = Step::new("lcod://impl/echo@1")
            .with_inputs(Bindings::new().bind("v", "$.x"))
            .with_outputs(Bindings::new().bind("x", "v").bind("inner", "v"));
        let steps = vec![Step {
            children: Some(Sequence::from(vec![inner])),
            ..Step::new("lcod://impl/children@1")
        }
        .with_outputs(Bindings::new().bind("fromChild", "inner"))];

        let state = run(&mut ctx, steps, json!({"x": 5})).unwrap();
        assert_eq!(Value::Object(state), json!({"x": 5, "fromChild": 5}));
    }

    #[test]
    fn test_frames_are_removed_after_failure() {
        let mut ctx = context(registry());
        let steps = vec![Step::new("lcod://impl/fail@1")];
        assert!(run(&mut ctx, steps, json!({})).is_err());

        let err = ctx.run_slot("children", None, None).unwrap_err().into_error();
        assert!(matches!(err, KernelError::RunnerUnavailable(_)));
        assert_eq!(ctx.scope_depth(), 1);
    }

    #[test]
    fn test_step_cleanups_run_after_call() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = registry();
        let events = Arc::clone(&log);
        registry.register("lcod://impl/defer@1", move |ctx, _input, _meta| {
            let events = Arc::clone(&events);
            ctx.defer(move || {
                events.lock().unwrap().push("cleanup");
                Ok(())
            });
            Ok(json!({}))
        });
        let mut ctx = context(registry);

        run(&mut ctx, vec![Step::new("lcod://impl/defer@1")], json!({})).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["cleanup"]);
    }

    #[test]
    fn test_slot_vars_reach_step_meta() {
        let mut registry = registry();
        registry.register("lcod://impl/meta@1", |_ctx, _input, meta| {
            Ok(json!({"vars": Value::Object(meta.slot_vars.clone()), "path": meta.collect_path()}))
        });
        let mut ctx = context(registry);

        let steps = vec![Step::new("lcod://impl/meta@1")
            .with_collect_path("$.x")
            .with_outputs(Bindings::new().bind("vars", "vars").bind("path", "path"))];
        let state = run_steps(&mut ctx, &steps, None, into_state(json!({"index": 2})).unwrap()).unwrap();
        assert_eq!(Value::Object(state), json!({"vars": {"index": 2}, "path": "$.x"}));
    }
}
