//! `lcod://flow/throw@1` and `lcod://flow/try@1`.

use serde_json::Value;

use super::FlowSignal;
use crate::compose::CHILDREN_SLOT;
use crate::context::{ExecutionContext, StepMeta};
use crate::error::{FlowError, Interrupt, KernelResult};
use crate::value::{non_blank_str, State};

const DEFAULT_THROW_CODE: &str = "flow_throw";
const DEFAULT_THROW_MESSAGE: &str = "Flow throw";

/// Raise a structured error from `code`, `message` and `data`.
pub fn flow_throw(
    _ctx: &mut ExecutionContext,
    mut input: State,
    _meta: &StepMeta,
) -> KernelResult<Value> {
    let code = non_blank_str(&input, "code").unwrap_or(DEFAULT_THROW_CODE).to_string();
    let message = non_blank_str(&input, "message")
        .unwrap_or(DEFAULT_THROW_MESSAGE)
        .to_string();
    let mut error = FlowError::new(code, message);
    if let Some(data) = input.remove("data").filter(|d| !d.is_null()) {
        error = error.with_data(data);
    }
    Err(error.into())
}

/// How a protected slot ended.
enum Outcome {
    Done(State),
    Signal(FlowSignal),
    Failed(FlowError),
}

impl Outcome {
    /// Fatal errors, cancellation included, settle as `unexpected_error` failures.
    fn settle(result: KernelResult<State>) -> Self {
        match result {
            Ok(state) => Outcome::Done(state),
            Err(Interrupt::Signal(signal)) => Outcome::Signal(signal),
            Err(Interrupt::Error(e)) => Outcome::Failed(e.to_flow_error()),
        }
    }
}

/// Run `children`, handing failures to `catch` and always running `finally`.
///
/// Slot variables carry the `phase` and, in `catch`/`finally`, the normalized
/// `error`. A failure left unhandled is raised again after `finally`, as is a
/// loop signal from `children` or `catch`.
pub fn flow_try(ctx: &mut ExecutionContext, _input: State, meta: &StepMeta) -> KernelResult<Value> {
    let mut result = State::new();
    let mut signal = None;
    let mut pending = None;

    match Outcome::settle(ctx.run_slot(CHILDREN_SLOT, None, Some(phase_vars("try", None)))) {
        Outcome::Done(state) => result = state,
        Outcome::Signal(s) => signal = Some(s),
        Outcome::Failed(error) if meta.has_slot("catch") => {
            tracing::debug!(code = %error.code, "Handling error in catch slot");
            let vars = phase_vars("catch", Some(&error));
            match Outcome::settle(ctx.run_slot("catch", None, Some(vars))) {
                Outcome::Done(state) => result = state,
                Outcome::Signal(s) => signal = Some(s),
                Outcome::Failed(error) => pending = Some(error),
            }
        }
        Outcome::Failed(error) => pending = Some(error),
    }

    if meta.has_slot("finally") {
        let vars = phase_vars("finally", pending.as_ref());
        result.extend(ctx.run_slot("finally", None, Some(vars))?);
    }

    if let Some(signal) = signal {
        return Err(Interrupt::Signal(signal));
    }
    if let Some(error) = pending {
        return Err(error.into());
    }
    Ok(Value::Object(result))
}

fn phase_vars(phase: &str, error: Option<&FlowError>) -> State {
    let mut vars = State::new();
    vars.insert("phase".to_string(), Value::String(phase.to_string()));
    if let Some(error) = error {
        vars.insert("error".to_string(), error.to_value());
    }
    vars
}
