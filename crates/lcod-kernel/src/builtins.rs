//! Built-in functions and the default registry.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::LogLevel;
use crate::context::{ExecutionContext, StepMeta};
use crate::contracts;
use crate::error::KernelResult;
use crate::flow;
use crate::registry::Registry;
use crate::value::State;

pub const LOG: &str = "lcod://kernel/log@1";
pub const SET: &str = "lcod://impl/set@1";

/// Create a registry with the flow primitives, kernel contracts and built-ins.
pub fn create_default_registry() -> Registry {
    let mut registry = Registry::new();

    flow::register(&mut registry);
    contracts::register(&mut registry);
    registry.register(LOG, kernel_log).register(SET, impl_set);

    registry
}

/// Returns the input unchanged; used to seed state.
pub fn impl_set(_ctx: &mut ExecutionContext, input: State, _meta: &StepMeta) -> KernelResult<Value> {
    Ok(Value::Object(input))
}

/// `kernel/log` input.
#[derive(Debug, Default, Deserialize)]
struct LogInput {
    #[serde(default)]
    level: Option<String>,

    #[serde(default)]
    message: Option<Value>,

    #[serde(default)]
    data: Option<Value>,

    #[serde(default)]
    tags: Option<Value>,
}

/// Emit a `tracing` event unless `level` is below the context's log level.
///
/// An unknown or missing level logs at `info`.
pub fn kernel_log(ctx: &mut ExecutionContext, input: State, _meta: &StepMeta) -> KernelResult<Value> {
    let input: LogInput = serde_json::from_value(Value::Object(input))?;
    let level = input
        .level
        .as_deref()
        .and_then(|l| l.parse::<LogLevel>().ok())
        .unwrap_or(LogLevel::Info);
    if level < ctx.log_level() {
        return Ok(json!({}));
    }

    let message = match input.message {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let data = input.data.unwrap_or(Value::Null);
    let tags = input.tags.unwrap_or(Value::Null);

    match level {
        LogLevel::Trace => tracing::trace!(target: "lcod", %data, %tags, "{message}"),
        LogLevel::Debug => tracing::debug!(target: "lcod", %data, %tags, "{message}"),
        LogLevel::Info => tracing::info!(target: "lcod", %data, %tags, "{message}"),
        LogLevel::Warn => tracing::warn!(target: "lcod", %data, %tags, "{message}"),
        LogLevel::Error => tracing::error!(target: "lcod", %data, %tags, "{message}"),
        LogLevel::Fatal => tracing::error!(target: "lcod", fatal = true, %data, %tags, "{message}"),
    }

    Ok(json!({}))
}
