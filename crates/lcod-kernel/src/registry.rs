//! Function registry and contract binding.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{ExecutionContext, StepMeta};
use crate::error::{KernelError, KernelResult};
use crate::value::State;

/// Identifier prefix of abstract contracts.
pub const CONTRACT_PREFIX: &str = "lcod://contract/";

/// Returns true when `id` names a contract rather than an implementation.
pub fn is_contract_id(id: &str) -> bool {
    id.starts_with(CONTRACT_PREFIX)
}

/// Function trait for implementing callable compose targets.
///
/// A function may recurse into its step's slots through
/// [`ExecutionContext::run_slot`] and [`ExecutionContext::run_children`].
pub trait Function: Send + Sync {
    /// Invoke the function with its resolved input.
    fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        input: State,
        meta: &StepMeta,
    ) -> KernelResult<Value>;
}

impl<F> Function for F
where
    F: Fn(&mut ExecutionContext, State, &StepMeta) -> KernelResult<Value> + Send + Sync,
{
    fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        input: State,
        meta: &StepMeta,
    ) -> KernelResult<Value> {
        self(ctx, input, meta)
    }
}

/// A registered function.
#[derive(Clone)]
pub struct Entry {
    id: String,
    function: Arc<dyn Function>,
    outputs: Vec<String>,
}

impl Entry {
    /// The id this entry was registered under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declared output keys (empty when unrestricted).
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Invoke the function, restricting a map result to the declared outputs.
    pub fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        input: State,
        meta: &StepMeta,
    ) -> KernelResult<Value> {
        let result = self.function.invoke(ctx, input, meta)?;
        if self.outputs.is_empty() {
            return Ok(result);
        }
        match result {
            Value::Object(mut map) => Ok(Value::Object(
                self.outputs
                    .iter()
                    .map(|key| (key.clone(), map.remove(key).unwrap_or(Value::Null)))
                    .collect(),
            )),
            other => Ok(other),
        }
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("outputs", &self.outputs)
            .finish()
    }
}

/// Registry of callable functions plus the contract binding table.
#[derive(Default)]
pub struct Registry {
    functions: HashMap<String, Entry>,
    bindings: HashMap<String, String>,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure under `id`, replacing any previous entry.
    pub fn register<F>(&mut self, id: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&mut ExecutionContext, State, &StepMeta) -> KernelResult<Value>
            + Send
            + Sync
            + 'static,
    {
        self.register_function(id, function)
    }

    /// Register a [`Function`] implementation under `id`.
    pub fn register_function<T: Function + 'static>(
        &mut self,
        id: impl Into<String>,
        function: T,
    ) -> &mut Self {
        self.insert(id.into(), Arc::new(function), Vec::new())
    }

    /// Register a function whose map results are filtered to `outputs`.
    pub fn register_with_outputs<T, I, S>(
        &mut self,
        id: impl Into<String>,
        function: T,
        outputs: I,
    ) -> &mut Self
    where
        T: Function + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let outputs = outputs.into_iter().map(Into::into).collect();
        self.insert(id.into(), Arc::new(function), outputs)
    }

    fn insert(&mut self, id: String, function: Arc<dyn Function>, outputs: Vec<String>) -> &mut Self {
        let entry = Entry {
            id: id.clone(),
            function,
            outputs,
        };
        self.functions.insert(id, entry);
        self
    }

    /// Remove a function.
    pub fn unregister(&mut self, id: &str) -> Option<Entry> {
        self.functions.remove(id)
    }

    /// Direct lookup, without contract indirection.
    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.functions.get(id)
    }

    /// Check if a function is registered.
    pub fn has(&self, id: &str) -> bool {
        self.functions.contains_key(id)
    }

    /// List all registered ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.functions.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Replace the contract binding table.
    pub fn set_bindings<I, K, V>(&mut self, bindings: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.bindings = bindings
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Concrete id bound to a contract id.
    pub fn binding(&self, contract_id: &str) -> Option<&str> {
        self.bindings.get(contract_id).map(|s| s.as_str())
    }

    /// The contract binding table.
    pub fn bindings(&self) -> &HashMap<String, String> {
        &self.bindings
    }

    /// Resolve `id` to a function.
    ///
    /// Contract ids that are not registered directly fall back to their bound
    /// implementation.
    pub fn resolve(&self, id: &str) -> Result<&Entry, KernelError> {
        if let Some(entry) = self.functions.get(id) {
            return Ok(entry);
        }
        if is_contract_id(id) {
            if let Some(entry) = self.binding(id).and_then(|target| self.functions.get(target)) {
                tracing::trace!(contract = %id, implementation = %entry.id, "Resolved contract binding");
                return Ok(entry);
            }
        }
        Err(KernelError::FunctionNotRegistered(id.to_string()))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.list())
            .field("bindings", &self.bindings)
            .finish()
    }
}
