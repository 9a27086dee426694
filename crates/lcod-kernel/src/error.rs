//! Kernel error and interruption types.
//!
//! A function call ends in one of three ways: a value, a control signal
//! ([`Interrupt::Signal`]) or an error ([`Interrupt::Error`]). Signals are not
//! failures; only loops consume them.

use serde_json::{json, Value};
use thiserror::Error;

use crate::flow::FlowSignal;

/// Code attached to failures that did not carry a structured code.
pub const UNEXPECTED_ERROR_CODE: &str = "unexpected_error";

/// Structured application error raised by `throw`-style primitives.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct FlowError {
    /// Machine readable error code.
    pub code: String,

    /// Human readable message.
    pub message: String,

    /// Optional payload.
    pub data: Option<Value>,
}

impl FlowError {
    /// Create a structured error without payload.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Render as `{code, message, data?}`.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("code".to_string(), json!(self.code));
        map.insert("message".to_string(), json!(self.message));
        if let Some(data) = &self.data {
            map.insert("data".to_string(), data.clone());
        }
        Value::Object(map)
    }
}

/// Errors that can occur while running a compose.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Neither the id nor its contract binding is registered.
    #[error("Function not registered: {0}")]
    FunctionNotRegistered(String),

    /// The context was cancelled.
    #[error("Execution cancelled")]
    Cancelled,

    /// Structured error raised by a function.
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// Malformed `in`/`out` binding descriptor.
    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    /// A function rejected its input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// `run_children`/`run_slot` called outside of a step invocation.
    #[error("{0} is unavailable in this context")]
    RunnerUnavailable(&'static str),

    /// A control signal escaped every enclosing loop.
    #[error("Flow signal '{0}' escaped its enclosing loop")]
    UnhandledSignal(FlowSignal),

    /// Compose document could not be parsed.
    #[error("Compose parse error: {0}")]
    Parse(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(String),

    /// Failure reported by a user function.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KernelError {
    /// Returns true for the cancellation condition.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, KernelError::Cancelled)
    }

    /// Error code used when the error is turned into data.
    pub fn code(&self) -> &str {
        match self {
            KernelError::Flow(e) => &e.code,
            KernelError::FunctionNotRegistered(_) => "function_not_registered",
            KernelError::Cancelled => "cancelled",
            _ => UNEXPECTED_ERROR_CODE,
        }
    }

    /// Convert into a structured error, keeping flow errors as they are.
    pub fn to_flow_error(&self) -> FlowError {
        match self {
            KernelError::Flow(e) => e.clone(),
            other => {
                let message = other.to_string();
                let message = if message.trim().is_empty() {
                    "Unexpected error".to_string()
                } else {
                    message
                };
                FlowError::new(UNEXPECTED_ERROR_CODE, message)
            }
        }
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(e: serde_json::Error) -> Self {
        KernelError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for KernelError {
    fn from(e: serde_yaml::Error) -> Self {
        KernelError::Yaml(e.to_string())
    }
}

/// Non-value outcome of a function call.
#[derive(Debug, Error)]
pub enum Interrupt {
    /// Loop control signal travelling to the nearest `foreach`.
    #[error("flow signal: {0}")]
    Signal(FlowSignal),

    /// Structured or fatal failure.
    #[error(transparent)]
    Error(#[from] KernelError),
}

impl Interrupt {
    /// Returns the signal if this is one.
    pub fn signal(&self) -> Option<FlowSignal> {
        match self {
            Interrupt::Signal(signal) => Some(*signal),
            Interrupt::Error(_) => None,
        }
    }

    /// Turn an escaped signal into a fatal error.
    pub fn into_error(self) -> KernelError {
        match self {
            Interrupt::Signal(signal) => KernelError::UnhandledSignal(signal),
            Interrupt::Error(e) => e,
        }
    }
}

impl From<FlowSignal> for Interrupt {
    fn from(signal: FlowSignal) -> Self {
        Interrupt::Signal(signal)
    }
}

impl From<FlowError> for Interrupt {
    fn from(e: FlowError) -> Self {
        Interrupt::Error(KernelError::Flow(e))
    }
}

impl From<serde_json::Error> for Interrupt {
    fn from(e: serde_json::Error) -> Self {
        Interrupt::Error(e.into())
    }
}

impl From<anyhow::Error> for Interrupt {
    fn from(e: anyhow::Error) -> Self {
        Interrupt::Error(KernelError::Other(e))
    }
}

/// Result type for function invocations and compose runs.
pub type KernelResult<T> = Result<T, Interrupt>;
