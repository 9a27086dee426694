//! Kernel facade: runs a compose on a fresh context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

use crate::builtins::create_default_registry;
use crate::compose::{Compose, Step};
use crate::config::KernelConfig;
use crate::context::{CancellationToken, ExecutionContext};
use crate::error::{Interrupt, KernelError};
use crate::registry::Registry;
use crate::runner;
use crate::value::State;

/// Status of a compose run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The compose completed.
    Success,
    /// The compose failed or was cancelled.
    Failure,
}

impl RunStatus {
    /// Process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Failure => 1,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Outcome of [`Kernel::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Unique id of this run.
    pub run_id: Uuid,

    /// Run status.
    pub status: RunStatus,

    /// Final state on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,

    /// `{code, message, data?}` on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    fn from_outcome(
        run_id: Uuid,
        outcome: Result<State, KernelError>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        match outcome {
            Ok(state) => Self {
                run_id,
                status: RunStatus::Success,
                state: Some(state),
                error: None,
                started_at,
                finished_at,
            },
            Err(e) => {
                let mut error = e.to_flow_error();
                error.code = e.code().to_string();
                Self {
                    run_id,
                    status: RunStatus::Failure,
                    state: None,
                    error: Some(error.to_value()),
                    started_at,
                    finished_at,
                }
            }
        }
    }

    /// Returns true if the run succeeded.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Process exit code.
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// Wall-clock duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Cancels a token once its timeout elapses, unless dropped first.
struct Watchdog {
    done: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn spawn(token: CancellationToken, timeout: Duration) -> Self {
        let (done, finished) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = finished.recv_timeout(timeout) {
                tracing::info!(timeout_ms = timeout.as_millis() as u64, "Compose timed out, cancelling");
                token.cancel();
            }
        });
        Self {
            done: Some(done),
            handle: Some(handle),
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        drop(self.done.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Timeout watchdog panicked");
            }
        }
    }
}

/// Registry plus configuration; each run gets its own context.
#[derive(Debug, Clone)]
pub struct Kernel {
    registry: Arc<Registry>,
    config: KernelConfig,
}

impl Kernel {
    /// Create a kernel with default configuration.
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, KernelConfig::default())
    }

    /// Create a kernel with explicit configuration.
    pub fn with_config(registry: Registry, config: KernelConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
        }
    }

    /// Default registry, configuration loaded from `.env` and the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = KernelConfig::load()?;
        Ok(Self::with_config(create_default_registry(), config))
    }

    /// The registry used for dispatch.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Kernel configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// A fresh execution context.
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::with_config(Arc::clone(&self.registry), &self.config)
    }

    /// Run `steps` from `initial` and return the final state.
    pub fn execute(&self, steps: &[Step], initial: State) -> Result<State, KernelError> {
        self.execute_with_cancellation(steps, initial, CancellationToken::new())
    }

    /// Like [`Kernel::execute`], cancellable through `token`.
    pub fn execute_with_cancellation(
        &self,
        steps: &[Step],
        initial: State,
        token: CancellationToken,
    ) -> Result<State, KernelError> {
        let mut ctx = self.context().with_cancellation(token);
        let _watchdog = self
            .config
            .timeout
            .map(|timeout| Watchdog::spawn(ctx.cancellation_token(), timeout));

        tracing::debug!(steps = steps.len(), "Executing compose");
        let result = runner::run_steps(&mut ctx, steps, Some(initial), State::new())
            .map_err(Interrupt::into_error);
        match &result {
            Ok(_) => tracing::debug!("Compose completed"),
            Err(e) if e.is_cancelled() => tracing::info!("Compose cancelled"),
            Err(e) => tracing::debug!(error = %e, "Compose failed"),
        }
        result
    }

    /// Execute a parsed compose document.
    pub fn execute_compose(&self, compose: &Compose, initial: State) -> Result<State, KernelError> {
        self.execute(compose.steps(), initial)
    }

    /// Execute and report the outcome with timestamps.
    pub fn run(&self, steps: &[Step], initial: State) -> RunResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = tracing::info_span!("compose_run", %run_id);
        let outcome = span.in_scope(|| self.execute(steps, initial));
        let result = RunResult::from_outcome(run_id, outcome, started_at);
        tracing::info!(
            %run_id,
            status = %result.status,
            duration_ms = result.duration_ms(),
            "Compose run finished"
        );
        result
    }
}
