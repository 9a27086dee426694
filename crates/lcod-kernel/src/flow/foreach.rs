//! `lcod://flow/foreach@1`.

use serde_json::Value;

use super::{collect, iteration_vars, results, FlowSignal};
use crate::context::{ExecutionContext, StepMeta};
use crate::error::{Interrupt, KernelResult};
use crate::value::State;

/// Run the `body` slot once per element of `list` (or `stream`).
///
/// Each iteration sees `$slot.item` and `$slot.index`. `continue` drops the
/// iteration result, `break` ends the loop. With `collectPath` the value it
/// selects is collected, otherwise the item itself. An empty list runs the
/// `else` slot once with index `-1`; only a `collectPath` value is collected
/// from it.
pub fn flow_foreach(
    ctx: &mut ExecutionContext,
    mut input: State,
    meta: &StepMeta,
) -> KernelResult<Value> {
    let source = if input.contains_key("list") {
        input.remove("list")
    } else {
        input.remove("stream")
    };
    let items = into_items(source);
    let mut collected = Vec::new();

    if items.is_empty() {
        let vars = iteration_vars(None, -1);
        let state = ctx.run_slot("else", None, Some(vars.clone()))?;
        if let Some(path) = meta.collect_path() {
            collected.extend(collect(path, &state, &vars));
        }
        return Ok(results(collected));
    }

    tracing::trace!(items = items.len(), "Starting foreach");
    for (index, item) in items.into_iter().enumerate() {
        ctx.ensure_not_cancelled()?;
        let vars = iteration_vars(Some(item.clone()), index as i64);
        match ctx.run_slot("body", None, Some(vars.clone())) {
            Ok(state) => match meta.collect_path() {
                Some(path) => collected.extend(collect(path, &state, &vars)),
                None => collected.push(item),
            },
            Err(Interrupt::Signal(FlowSignal::Continue)) => continue,
            Err(Interrupt::Signal(FlowSignal::Break)) => break,
            Err(e) => return Err(e),
        }
    }

    Ok(results(collected))
}

/// `null` iterates nothing, a scalar or map iterates once.
fn into_items(source: Option<Value>) -> Vec<Value> {
    match source {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    }
}
