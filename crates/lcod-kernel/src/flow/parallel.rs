//! `lcod://flow/parallel@1`.

use serde_json::Value;

use super::{iteration_vars, results};
use crate::context::{ExecutionContext, StepMeta};
use crate::error::{Interrupt, KernelResult};
use crate::path::Roots;
use crate::value::State;

/// Run the `tasks` slot once per entry of the `tasks` input.
///
/// Tasks run one after the other on the calling thread. Each result is the
/// task's final state, or the value `collectPath` selects from it (`null`
/// when nothing is there). A failing task is raised as a structured error.
pub fn flow_parallel(
    ctx: &mut ExecutionContext,
    mut input: State,
    meta: &StepMeta,
) -> KernelResult<Value> {
    let tasks = match input.remove("tasks") {
        Some(Value::Array(tasks)) => tasks,
        _ => Vec::new(),
    };
    if !meta.has_slot("tasks") {
        return Ok(results(Vec::new()));
    }

    let mut collected = Vec::with_capacity(tasks.len());
    for (index, task) in tasks.into_iter().enumerate() {
        ctx.ensure_not_cancelled()?;
        let vars = iteration_vars(Some(task), index as i64);
        let state = match ctx.run_slot("tasks", None, Some(vars.clone())) {
            Ok(state) => state,
            Err(Interrupt::Error(e)) => return Err(e.to_flow_error().into()),
            Err(e) => return Err(e),
        };
        let value = match meta.collect_path() {
            Some(path) => Roots::new(&state, &vars).resolve(path).unwrap_or(Value::Null),
            None => Value::Object(state),
        };
        collected.push(value);
    }

    Ok(results(collected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{Bindings, Step};
    use crate::error::KernelError;
    use crate::flow;
    use crate::registry::Registry;
    use crate::runner::run_steps;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> ExecutionContext {
        let mut registry = Registry::new();
        flow::register(&mut registry);
        registry.register("lcod://impl/set@1", |_ctx, input, _meta| Ok(Value::Object(input)));
        ExecutionContext::new(Arc::new(registry))
    }

    fn parallel(tasks: Value, body: Vec<Step>) -> Step {
        Step::new(flow::PARALLEL)
            .with_inputs(Bindings::new().bind("tasks", tasks))
            .with_slot("tasks", body)
            .with_outputs(Bindings::new().bind("results", "results"))
    }

    fn label() -> Step {
        Step::new("lcod://impl/set@1")
            .with_inputs(Bindings::new().bind("label", "$slot.item.name"))
            .with_outputs(Bindings::new().bind("label", "label"))
    }

    #[test]
    fn test_parallel_collects_states_in_order() {
        let mut ctx = context();
        let step = parallel(json!([{"name": "a"}, {"name": "b"}]), vec![label()]);
        let state = run_steps(&mut ctx, &[step], None, State::new()).unwrap();
        assert_eq!(state["results"], json!([{"label": "a"}, {"label": "b"}]));
    }

    #[test]
    fn test_parallel_collect_path() {
        let mut ctx = context();
        let step = parallel(json!([{"name": "a"}, {"name": "b"}]), vec![label()])
            .with_collect_path("$.label");
        let state = run_steps(&mut ctx, &[step], None, State::new()).unwrap();
        assert_eq!(state["results"], json!(["a", "b"]));

        let step = parallel(json!([{"name": "a"}]), vec![label()]).with_collect_path("$.missing");
        let state = run_steps(&mut ctx, &[step], None, State::new()).unwrap();
        assert_eq!(state["results"], json!([null]));
    }

    #[test]
    fn test_parallel_without_slot() {
        let mut ctx = context();
        let step = Step::new(flow::PARALLEL)
            .with_inputs(Bindings::new().bind("tasks", json!([1, 2])))
            .with_outputs(Bindings::new().bind("results", "results"));
        let state = run_steps(&mut ctx, &[step], None, State::new()).unwrap();
        assert_eq!(state["results"], json!([]));
    }

    #[test]
    fn test_parallel_failures_become_structured() {
        let mut ctx = context();
        let step = parallel(json!([1]), vec![Step::new("lcod://impl/missing@1")]);
        let err = run_steps(&mut ctx, &[step], None, State::new())
            .unwrap_err()
            .into_error();
        let KernelError::Flow(error) = err else {
            panic!("expected a flow error");
        };
        assert_eq!(error.code, "unexpected_error");
        assert!(error.message.contains("lcod://impl/missing@1"));
    }

    #[test]
    fn test_parallel_cancellation_becomes_structured() {
        let mut registry = Registry::new();
        flow::register(&mut registry);
        registry.register("lcod://impl/cancel@1", |ctx, _input, _meta| {
            ctx.cancel();
            ctx.ensure_not_cancelled()?;
            Ok(json!({}))
        });
        let mut ctx = ExecutionContext::new(Arc::new(registry));

        let step = parallel(json!([1, 2]), vec![Step::new("lcod://impl/cancel@1")]);
        let err = run_steps(&mut ctx, &[step], None, State::new())
            .unwrap_err()
            .into_error();
        assert_eq!(err.code(), "unexpected_error");
        assert_eq!(err.to_string(), "Execution cancelled");
    }
}
