//! LCOD Compose Kernel
//!
//! Execution engine for LCOD compose documents: sequences of function calls
//! wired together through a shared state, with nested slots for branching
//! and iteration.
//!
//! This crate provides:
//! - Compose data model and YAML/JSON document parsing
//! - Function registry with contract-to-implementation bindings
//! - Step runner with path, spread and optional binding projection
//! - Flow primitives: if, foreach, while, parallel, try/throw, continue/break
//! - Execution context with cleanup scopes and cooperative cancellation
//! - Kernel facade with run results and timeouts

pub mod builtins;
pub mod compose;
pub mod config;
pub mod context;
pub mod contracts;
pub mod error;
pub mod flow;
pub mod kernel;
pub mod path;
pub mod registry;
pub mod runner;
pub mod value;

pub use builtins::create_default_registry;
pub use compose::{Bindings, Compose, Sequence, SpreadDescriptor, Step};
pub use config::{KernelConfig, LogLevel};
pub use context::{CancellationToken, ExecutionContext, StepMeta};
pub use error::{FlowError, Interrupt, KernelError, KernelResult};
pub use flow::FlowSignal;
pub use kernel::{Kernel, RunResult, RunStatus};
pub use registry::{Function, Registry};
pub use value::State;
