//! Lifecycle hooks fired around every per-store action execution

use std::sync::Arc;

use serde_json::Value;

use crate::error::MuxError;
use crate::store::StoreResult;
use crate::types::{ActionName, ModulePath};

/// Context handed to every hook: which store, which action, on which path,
/// with which (already transformed) payload.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub store: String,
    pub action: ActionName,
    pub path: ModulePath,
    pub payload: Option<Value>,
}

/// Fired before a store executes an action
pub type BeforeFn = Arc<dyn Fn(&HookContext) + Send + Sync>;
/// Fired after a store executed an action successfully
pub type SuccessFn = Arc<dyn Fn(&HookContext, &StoreResult) + Send + Sync>;
/// Fired when a store's action (or its revert) failed
pub type ErrorFn = Arc<dyn Fn(&HookContext, &MuxError) + Send + Sync>;
/// Fired when a store's succeeded action is compensated under revert policy.
/// The error is the original failure that triggered the rollback.
pub type RevertFn = Arc<dyn Fn(&HookContext, &MuxError) + Send + Sync>;

/// The hook set a configuration level can provide.
///
/// Unlike scalar settings, hooks accumulate across the global, module and
/// action levels: every configured handler fires.
#[derive(Clone, Default)]
pub struct Hooks {
    pub before: Vec<BeforeFn>,
    pub success: Vec<SuccessFn>,
    pub error: Vec<ErrorFn>,
    pub revert: Vec<RevertFn>,
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty()
            && self.success.is_empty()
            && self.error.is_empty()
            && self.revert.is_empty()
    }

    /// Append another level's hooks after this one's. Callers chain levels
    /// most specific first.
    pub(crate) fn extend_from(&mut self, other: &Hooks) {
        self.before.extend(other.before.iter().cloned());
        self.success.extend(other.success.iter().cloned());
        self.error.extend(other.error.iter().cloned());
        self.revert.extend(other.revert.iter().cloned());
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before", &self.before.len())
            .field("success", &self.success.len())
            .field("error", &self.error.len())
            .field("revert", &self.revert.len())
            .finish()
    }
}

/// Transform applied to an action payload before any store sees it
pub type PayloadTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Transform applied to each incoming document record before it is merged
/// into the module's data map
pub type ReadResponseTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;
