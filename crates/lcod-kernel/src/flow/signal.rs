//! Loop control signals.

use serde_json::Value;

use crate::context::{ExecutionContext, StepMeta};
use crate::error::{Interrupt, KernelResult};
use crate::value::State;

/// Out-of-band loop control, caught by the nearest enclosing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSignal {
    /// Skip the rest of the current iteration.
    Continue,
    /// Leave the loop.
    Break,
}

impl std::fmt::Display for FlowSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowSignal::Continue => f.write_str("continue"),
            FlowSignal::Break => f.write_str("break"),
        }
    }
}

/// Raise [`FlowSignal::Continue`].
pub fn flow_continue(
    _ctx: &mut ExecutionContext,
    _input: State,
    _meta: &StepMeta,
) -> KernelResult<Value> {
    Err(Interrupt::Signal(FlowSignal::Continue))
}

/// Raise [`FlowSignal::Break`].
pub fn flow_break(
    _ctx: &mut ExecutionContext,
    _input: State,
    _meta: &StepMeta,
) -> KernelResult<Value> {
    Err(Interrupt::Signal(FlowSignal::Break))
}
