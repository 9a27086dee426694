//! Flow primitives.
//!
//! Branching and looping are ordinary registry entries built on
//! [`ExecutionContext::run_slot`]:
//! - `if` - run the `then` or `else` slot
//! - `foreach` - run `body` per list item, honouring `continue`/`break`
//! - `while` - loop a `condition` slot and a `body` slot over an explicit state
//! - `parallel` - run the `tasks` slot per task, in order
//! - `throw`/`try` - raise and handle structured errors
//! - `continue`/`break` - raise loop control signals
//! - `check_abort` - fail when the run was cancelled

mod branch;
mod errors;
mod foreach;
mod parallel;
mod signal;
mod while_loop;

pub use self::branch::flow_if;
pub use self::errors::{flow_throw, flow_try};
pub use self::foreach::flow_foreach;
pub use self::parallel::flow_parallel;
pub use self::signal::{flow_break, flow_continue, FlowSignal};
pub use self::while_loop::flow_while;

use serde_json::{json, Value};

use crate::context::{ExecutionContext, StepMeta};
use crate::error::KernelResult;
use crate::path::Roots;
use crate::registry::Registry;
use crate::value::State;

pub const IF: &str = "lcod://flow/if@1";
pub const FOREACH: &str = "lcod://flow/foreach@1";
pub const CONTINUE: &str = "lcod://flow/continue@1";
pub const BREAK: &str = "lcod://flow/break@1";
pub const THROW: &str = "lcod://flow/throw@1";
pub const TRY: &str = "lcod://flow/try@1";
pub const WHILE: &str = "lcod://flow/while@1";
pub const PARALLEL: &str = "lcod://flow/parallel@1";
pub const CHECK_ABORT: &str = "lcod://flow/check_abort@1";

/// Register every flow primitive.
pub fn register(registry: &mut Registry) -> &mut Registry {
    registry
        .register(IF, flow_if)
        .register(FOREACH, flow_foreach)
        .register(CONTINUE, flow_continue)
        .register(BREAK, flow_break)
        .register(THROW, flow_throw)
        .register(TRY, flow_try)
        .register(WHILE, flow_while)
        .register(PARALLEL, flow_parallel)
        .register(CHECK_ABORT, flow_check_abort)
}

/// Fail with `Cancelled` once the run was cancelled.
pub fn flow_check_abort(
    ctx: &mut ExecutionContext,
    _input: State,
    _meta: &StepMeta,
) -> KernelResult<Value> {
    ctx.ensure_not_cancelled()?;
    Ok(json!({}))
}

/// Slot variables of one loop iteration; `item` is left out when `None`.
fn iteration_vars(item: Option<Value>, index: i64) -> State {
    let mut vars = State::new();
    if let Some(item) = item {
        vars.insert("item".to_string(), item);
    }
    vars.insert("index".to_string(), json!(index));
    vars
}

/// Extract a per-iteration value with `$` bound to the iteration state and
/// `$slot` to its slot variables. `null` counts as nothing to collect.
fn collect(path: &str, state: &State, vars: &State) -> Option<Value> {
    Roots::new(state, vars).resolve(path).filter(|v| !v.is_null())
}

fn results(results: Vec<Value>) -> Value {
    json!({ "results": results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::into_state;

    #[test]
    fn test_register_flow_primitives() {
        let mut registry = Registry::new();
        register(&mut registry);
        for id in [IF, FOREACH, CONTINUE, BREAK, THROW, TRY, WHILE, PARALLEL, CHECK_ABORT] {
            assert!(registry.has(id), "{id} should be registered");
        }
    }

    #[test]
    fn test_iteration_vars() {
        assert_eq!(Value::Object(iteration_vars(Some(json!("a")), 0)), json!({"item": "a", "index": 0}));
        assert_eq!(Value::Object(iteration_vars(None, -1)), json!({"index": -1}));
    }

    #[test]
    fn test_collect() {
        let state = into_state(json!({"val": 3, "nothing": null})).unwrap();
        let vars = iteration_vars(Some(json!("x")), 1);
        assert_eq!(collect("$.val", &state, &vars), Some(json!(3)));
        assert_eq!(collect("$slot.index", &state, &vars), Some(json!(1)));
        assert_eq!(collect("$.nothing", &state, &vars), None);
        assert_eq!(collect("$.missing", &state, &vars), None);
    }

    #[test]
    fn test_check_abort() {
        let mut ctx = ExecutionContext::new(std::sync::Arc::new(Registry::new()));
        assert_eq!(flow_check_abort(&mut ctx, State::new(), &StepMeta::default()).unwrap(), json!({}));

        ctx.cancel();
        let err = flow_check_abort(&mut ctx, State::new(), &StepMeta::default())
            .unwrap_err()
            .into_error();
        assert!(err.is_cancelled());
    }
}
