//! Execution context passed to functions during a compose run.
//!
//! Owns:
//! - the registry used for dispatch
//! - the cancellation token checked at step and iteration boundaries
//! - a stack of cleanup scopes, one per nested invocation
//! - a stack of step frames describing where `run_slot`/`run_children` recurse

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::compose::{resolve_slot, Sequence, SlotMap, Step};
use crate::config::{KernelConfig, LogLevel};
use crate::error::{KernelError, KernelResult};
use crate::registry::Registry;
use crate::runner;
use crate::value::State;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Metadata describing the step being invoked.
#[derive(Debug, Clone, Default)]
pub struct StepMeta {
    /// Declared slots, `children`/`body` normalized.
    pub slots: Arc<SlotMap>,

    /// Slot variables visible to the step.
    pub slot_vars: State,

    /// Loop extraction path.
    pub collect_path: Option<String>,
}

impl StepMeta {
    /// Returns true when `name` has at least one declared step.
    pub fn has_slot(&self, name: &str) -> bool {
        resolve_slot(&self.slots, name).is_some_and(|steps| !steps.is_empty())
    }

    /// The collect path, ignoring blank values.
    pub fn collect_path(&self) -> Option<&str> {
        self.collect_path.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// Where nested runs started by the current function recurse.
#[derive(Debug)]
pub(crate) struct StepFrame {
    pub(crate) slots: Arc<SlotMap>,
    pub(crate) state: State,
    pub(crate) slot_vars: State,
}

type Cleanup = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Cleanup callbacks bound to one nested invocation.
///
/// Callbacks run in reverse registration order when the scope is dropped.
/// A failing callback is logged and does not stop the others.
#[derive(Default)]
pub struct Scope {
    cleanups: Vec<Cleanup>,
}

impl Scope {
    fn defer(&mut self, cleanup: Cleanup) {
        self.cleanups.push(cleanup);
    }

    /// Number of pending callbacks.
    pub fn len(&self) -> usize {
        self.cleanups.len()
    }

    /// Returns true when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.cleanups.is_empty()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        while let Some(cleanup) = self.cleanups.pop() {
            if let Err(e) = cleanup() {
                tracing::warn!(error = %e, "Scope cleanup failed");
            }
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}

/// Execution context passed to functions during execution.
#[derive(Debug)]
pub struct ExecutionContext {
    registry: Arc<Registry>,
    cancellation: CancellationToken,
    working_directory: PathBuf,
    log_level: LogLevel,
    scopes: Vec<Scope>,
    frames: Vec<StepFrame>,
}

impl ExecutionContext {
    /// Create a new execution context with default settings.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, &KernelConfig::default())
    }

    /// Create a context using the working directory and log level of `config`.
    pub fn with_config(registry: Arc<Registry>, config: &KernelConfig) -> Self {
        Self {
            registry,
            cancellation: CancellationToken::new(),
            working_directory: config.working_directory.clone(),
            log_level: config.log_level,
            scopes: vec![Scope::default()],
            frames: Vec::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The registry used for dispatch.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Directory relative paths are resolved against.
    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Minimum level of `kernel/log` events.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// A handle that can cancel this context from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fail with [`KernelError::Cancelled`] when cancellation was requested.
    pub fn ensure_not_cancelled(&self) -> Result<(), KernelError> {
        if self.is_cancelled() {
            return Err(KernelError::Cancelled);
        }
        Ok(())
    }

    /// Resolve `id` and invoke it.
    ///
    /// Failures and signals raised by the function are returned untouched.
    pub fn call(&mut self, id: &str, input: State, meta: &StepMeta) -> KernelResult<Value> {
        self.ensure_not_cancelled()?;
        let registry = Arc::clone(&self.registry);
        let entry = registry.resolve(id)?;
        entry.invoke(self, input, meta)
    }

    /// Run `steps` as a nested sequence of the current step.
    ///
    /// `state` defaults to a copy of the caller's state, `slot_vars` to the
    /// caller's slot variables.
    pub fn run_children(
        &mut self,
        steps: &[Step],
        state: Option<State>,
        slot_vars: Option<State>,
    ) -> KernelResult<State> {
        self.ensure_not_cancelled()?;
        let (base, vars) = {
            let frame = self
                .frames
                .last()
                .ok_or(KernelError::RunnerUnavailable("run_children"))?;
            (
                state.unwrap_or_else(|| frame.state.clone()),
                slot_vars.unwrap_or_else(|| frame.slot_vars.clone()),
            )
        };
        self.scoped(|ctx| runner::run_steps(ctx, steps, Some(base), vars))
    }

    /// Run the current step's slot `name`.
    ///
    /// An undeclared slot runs as an empty sequence and yields a copy of the
    /// starting state.
    pub fn run_slot(
        &mut self,
        name: &str,
        state: Option<State>,
        slot_vars: Option<State>,
    ) -> KernelResult<State> {
        self.ensure_not_cancelled()?;
        let (steps, base, vars) = {
            let frame = self
                .frames
                .last()
                .ok_or(KernelError::RunnerUnavailable("run_slot"))?;
            (
                resolve_slot(&frame.slots, name).cloned().unwrap_or_else(Sequence::empty),
                state.unwrap_or_else(|| frame.state.clone()),
                slot_vars.unwrap_or_else(|| frame.slot_vars.clone()),
            )
        };
        tracing::trace!(slot = %name, steps = steps.len(), "Running slot");
        self.scoped(|ctx| runner::run_steps(ctx, &steps, Some(base), vars))
    }

    /// Open a cleanup scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Close the innermost scope, running its cleanups.
    ///
    /// The root scope stays open until the context is dropped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            drop(self.scopes.pop());
        }
    }

    /// Run `f` inside its own scope; the scope closes whatever `f` returns.
    ///
    /// Scopes `f` leaves open are closed too, and scopes below the caller's
    /// depth are never touched.
    pub fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let depth = self.scopes.len();
        self.push_scope();
        let result = f(self);
        while self.scopes.len() > depth {
            self.scopes.pop();
        }
        result
    }

    /// Register a cleanup on the innermost scope.
    pub fn defer(&mut self, cleanup: impl FnOnce() -> anyhow::Result<()> + Send + 'static) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.defer(Box::new(cleanup));
        }
    }

    /// Number of open scopes, the root scope included.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub(crate) fn push_frame(&mut self, frame: StepFrame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop_frame(&mut self) -> Option<StepFrame> {
        self.frames.pop()
    }
}
