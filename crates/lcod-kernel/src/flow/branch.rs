//! `lcod://flow/if@1`.

use serde_json::Value;

use crate::context::{ExecutionContext, StepMeta};
use crate::error::KernelResult;
use crate::value::State;

/// Run `then` when `cond` is exactly `true`, `else` otherwise.
///
/// The chosen slot runs on a copy of the caller's state and its final state
/// is the result.
pub fn flow_if(ctx: &mut ExecutionContext, input: State, _meta: &StepMeta) -> KernelResult<Value> {
    let cond = matches!(input.get("cond"), Some(Value::Bool(true)));
    let branch = if cond { "then" } else { "else" };
    tracing::trace!(cond, branch, "Selected branch");
    Ok(Value::Object(ctx.run_slot(branch, None, None)?))
}

#[cfg(test)]
mod tests {
    use crate::compose::{Bindings, Step};
    use crate::context::ExecutionContext;
    use crate::flow;
    use crate::registry::Registry;
    use crate::runner::run_steps;
    use crate::value::{into_state, State};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn set(key: &str, value: Value) -> Step {
        Step::new("lcod://impl/set@1")
            .with_inputs(Bindings::new().bind(key, value))
            .with_outputs(Bindings::new().bind(key, key))
    }

    fn run_if(cond: Value) -> State {
        let mut registry = Registry::new();
        flow::register(&mut registry);
        registry.register("lcod://impl/set@1", |_ctx, input, _meta| Ok(Value::Object(input)));
        let mut ctx = ExecutionContext::new(Arc::new(registry));

        let step = Step::new(flow::IF)
            .with_inputs(Bindings::new().bind("cond", "$.flag"))
            .with_slot("then", vec![set("branch", json!("then")), set("thenOnly", json!(1))])
            .with_slot("else", vec![set("branch", json!("else"))])
            .with_outputs(Bindings::new().bind("branch", "branch").bind_optional("thenOnly", "thenOnly"));

        run_steps(&mut ctx, &[step], into_state(json!({"flag": cond})), State::new()).unwrap()
    }

    #[test]
    fn test_if_true_runs_then_only() {
        let state = run_if(json!(true));
        assert_eq!(state["branch"], json!("then"));
        assert_eq!(state["thenOnly"], json!(1));
    }

    #[test]
    fn test_if_false_runs_else_only() {
        let state = run_if(json!(false));
        assert_eq!(state["branch"], json!("else"));
        assert!(!state.contains_key("thenOnly"));
    }

    #[test]
    fn test_if_requires_strict_true() {
        assert_eq!(run_if(json!("yes"))["branch"], json!("else"));
        assert_eq!(run_if(json!(1))["branch"], json!("else"));
    }

    #[test]
    fn test_missing_branch_returns_caller_state() {
        let mut registry = Registry::new();
        flow::register(&mut registry);
        let mut ctx = ExecutionContext::new(Arc::new(registry));

        let step = Step::new(flow::IF)
            .with_inputs(Bindings::new().bind("cond", false))
            .with_outputs(Bindings::new().bind("copy", "$"));
        let state = run_steps(&mut ctx, &[step], into_state(json!({"a": 1})), State::new()).unwrap();
        assert_eq!(state["copy"], json!({"a": 1}));
    }
}
