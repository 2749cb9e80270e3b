//! Cascading configuration
//!
//! The same settings can be supplied at three levels: globally on the
//! instance, per module, and per action call. [`resolve`] merges the three
//! into one [`EffectiveConfig`] for a single invocation.

mod hooks;
mod resolve;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

pub use hooks::{
    BeforeFn, ErrorFn, HookContext, Hooks, PayloadTransform, ReadResponseTransform, RevertFn,
    SuccessFn,
};
pub use resolve::{resolve, EffectiveConfig};

use crate::error::MuxError;
use crate::store::StoreResult;
use crate::types::{ActionName, ActionType, QueryClauses, StreamEventKind};

/// What to do when one store in the execution order fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort remaining stores and surface the error; no compensation
    #[default]
    Stop,
    /// Record the failure and proceed to the next store
    Continue,
    /// Abort remaining stores and revert every store that already succeeded,
    /// then surface the original error
    Revert,
}

/// Key for an execution-order entry: a specific action name binds tighter
/// than its broader action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKey {
    Action(ActionName),
    Type(ActionType),
}

/// The settings shared by all three configuration levels
#[derive(Clone, Default)]
pub struct SharedConfig {
    /// Ordered store names per action name or action type. An empty list is
    /// treated as absent.
    pub execution_order: HashMap<OrderKey, Vec<String>>,
    pub on_error: Option<ErrorPolicy>,
    /// Payload transform per action type; only the most specific configured
    /// transform applies (no chaining across levels)
    pub modify_payload_on: HashMap<ActionType, PayloadTransform>,
    /// Record transform per stream event kind; same non-chaining rule
    pub modify_read_response_on: HashMap<StreamEventKind, ReadResponseTransform>,
    pub on: Hooks,
    /// Debounce window for remote batch sync, in milliseconds
    pub sync_debounce_ms: Option<u64>,
}

impl SharedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execution_order(mut self, key: OrderKey, stores: Vec<String>) -> Self {
        self.execution_order.insert(key, stores);
        self
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = Some(policy);
        self
    }

    pub fn modify_payload_on<F>(mut self, action_type: ActionType, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.modify_payload_on
            .insert(action_type, Arc::new(transform));
        self
    }

    pub fn modify_read_response_on<F>(mut self, kind: StreamEventKind, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.modify_read_response_on
            .insert(kind, Arc::new(transform));
        self
    }

    pub fn on_before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext) + Send + Sync + 'static,
    {
        self.on.before.push(Arc::new(hook));
        self
    }

    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext, &StoreResult) + Send + Sync + 'static,
    {
        self.on.success.push(Arc::new(hook));
        self
    }

    pub fn on_action_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext, &MuxError) + Send + Sync + 'static,
    {
        self.on.error.push(Arc::new(hook));
        self
    }

    pub fn on_revert<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext, &MuxError) + Send + Sync + 'static,
    {
        self.on.revert.push(Arc::new(hook));
        self
    }

    pub fn sync_debounce_ms(mut self, ms: u64) -> Self {
        self.sync_debounce_ms = Some(ms);
        self
    }
}

impl std::fmt::Debug for SharedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConfig")
            .field("execution_order", &self.execution_order.keys())
            .field("on_error", &self.on_error)
            .field("modify_payload_on", &self.modify_payload_on.keys())
            .field(
                "modify_read_response_on",
                &self.modify_read_response_on.keys(),
            )
            .field("on", &self.on)
            .field("sync_debounce_ms", &self.sync_debounce_ms)
            .finish()
    }
}

/// Instance-wide configuration
#[derive(Debug, Clone, Default)]
pub struct GlobalConfig {
    /// Name of the designated local cache store. Its outcome is the canonical
    /// result of a write action when it participated.
    pub local_store_name: Option<String>,
    pub config: SharedConfig,
}

impl GlobalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_store_name<S: Into<String>>(mut self, name: S) -> Self {
        self.local_store_name = Some(name.into());
        self
    }

    pub fn config(mut self, config: SharedConfig) -> Self {
        self.config = config;
        self
    }
}

/// Per-module configuration
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    pub config: SharedConfig,
    /// Opaque per-store options, keyed by store name, handed to that store's
    /// driver on every call for this module
    pub per_store: HashMap<String, Value>,
    /// Default query clauses for read actions on this module
    pub clauses: QueryClauses,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SharedConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store_options<S: Into<String>>(mut self, store: S, options: Value) -> Self {
        self.per_store.insert(store.into(), options);
        self
    }

    pub fn clauses(mut self, clauses: QueryClauses) -> Self {
        self.clauses = clauses;
        self
    }
}

/// Per-call configuration, the most specific level
pub type ActionConfig = SharedConfig;
