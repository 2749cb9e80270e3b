//! Action dispatcher
//!
//! Drives one action through the ordered store list: payload transform,
//! before/success/error hooks per store, generated-id propagation, and the
//! configured failure policy including compensating rollback.

mod merge;

use serde_json::Value;
use tracing::{debug, warn};

pub(crate) use merge::merge_fetch_results;

use crate::config::{EffectiveConfig, ErrorPolicy, HookContext, Hooks};
use crate::error::{MuxError, MuxResult, StoreError};
use crate::store::{StoreModuleConfig, StoreRegistration, StoreResult};
use crate::types::{ActionName, DocRecord, ModulePath};

/// Per-store execution state, one per store per action call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Reverted,
}

struct Execution<'a> {
    registration: &'a StoreRegistration,
    config: &'a StoreModuleConfig,
    path: ModulePath,
    state: ExecutionState,
}

/// Everything one dispatch call needs
pub(crate) struct ActionRequest<'a> {
    pub action: ActionName,
    pub payload: Option<Value>,
    pub path: ModulePath,
    /// Stores in execution order, each with its per-module config
    pub stores: Vec<(StoreRegistration, StoreModuleConfig)>,
    pub effective: &'a EffectiveConfig,
    /// Designated local cache store, whose outcome is canonical for writes
    pub local_store_name: Option<&'a str>,
}

/// Aggregated result of one dispatch call
pub(crate) struct DispatchOutcome {
    /// Canonical document id for writes: the local store's outcome when it
    /// participated, else the first succeeded store's
    pub doc_id: Option<String>,
    /// Per-store fetch records in execution order (fetch only)
    pub fetched: Vec<Vec<DocRecord>>,
}

/// Walk the stores sequentially; never fans out. A later store may depend
/// on state produced by an earlier one (a generated id).
pub(crate) async fn dispatch(request: ActionRequest<'_>) -> MuxResult<DispatchOutcome> {
    let ActionRequest {
        action,
        payload,
        path,
        stores,
        effective,
        local_store_name,
    } = request;

    // the revert contract receives the original untransformed payload
    let original_payload = payload.clone();
    let payload = match (&effective.payload_transform, payload) {
        (Some(transform), Some(value)) => Some(transform(value)),
        (_, value) => value,
    };

    let mut executions: Vec<Execution> = stores
        .iter()
        .map(|(registration, config)| Execution {
            registration,
            config,
            path: path.clone(),
            state: ExecutionState::Pending,
        })
        .collect();

    let mut doc_id = path.doc_id.clone();
    let mut inserted_ids: Vec<(String, String)> = Vec::new();
    let mut fetched: Vec<Vec<DocRecord>> = Vec::new();
    let mut first_failure: Option<MuxError> = None;
    let mut any_succeeded = false;

    for index in 0..executions.len() {
        if let Some(id) = &doc_id {
            executions[index].path = path.with_doc_id(id.clone());
        }

        let store = executions[index].registration.name.clone();
        let ctx = HookContext {
            store: store.clone(),
            action,
            path: executions[index].path.clone(),
            payload: payload.clone(),
        };
        for hook in &effective.hooks.before {
            hook(&ctx);
        }

        executions[index].state = ExecutionState::Running;
        debug!(%store, %action, path = %ctx.path, "invoking store");
        let result = invoke(
            executions[index].registration,
            action,
            payload.clone(),
            &executions[index].path,
            executions[index].config,
        )
        .await;

        match result {
            Ok(store_result) => {
                executions[index].state = ExecutionState::Succeeded;
                any_succeeded = true;
                match &store_result {
                    StoreResult::Inserted(id) => {
                        inserted_ids.push((store.clone(), id.clone()));
                        if doc_id.is_none() {
                            doc_id = Some(id.clone());
                        }
                        // a potential revert must target the resolved doc
                        executions[index].path = path.with_doc_id(id.clone());
                    }
                    StoreResult::Fetched(docs) => fetched.push(docs.clone()),
                    _ => {}
                }
                for hook in &effective.hooks.success {
                    hook(&ctx, &store_result);
                }
            }
            Err(source) => {
                executions[index].state = ExecutionState::Failed;
                let error = MuxError::StoreAction {
                    store: store.clone(),
                    action,
                    source,
                };
                warn!(%store, %action, %error, "store action failed");
                for hook in &effective.hooks.error {
                    hook(&ctx, &error);
                }
                match effective.on_error {
                    ErrorPolicy::Stop => return Err(error),
                    ErrorPolicy::Continue => {
                        if first_failure.is_none() {
                            first_failure = Some(error);
                        }
                    }
                    ErrorPolicy::Revert => {
                        revert_succeeded(
                            &mut executions[..index],
                            &original_payload,
                            action,
                            &error,
                            &effective.hooks,
                        )
                        .await;
                        return Err(error);
                    }
                }
            }
        }
    }

    // under `continue`, the call resolves with the successful stores'
    // outcome; with zero successes there is nothing to resolve with
    if !any_succeeded {
        if let Some(error) = first_failure {
            return Err(error);
        }
    }

    let doc_id = canonical_insert_id(&inserted_ids, local_store_name).or(doc_id);

    Ok(DispatchOutcome { doc_id, fetched })
}

/// Compensate every succeeded store in reverse execution order. Reverts are
/// awaited one by one; a failed revert is reported through hooks but never
/// replaces the original error.
async fn revert_succeeded(
    executions: &mut [Execution<'_>],
    original_payload: &Option<Value>,
    action: ActionName,
    original_error: &MuxError,
    hooks: &Hooks,
) {
    for execution in executions.iter_mut().rev() {
        if execution.state != ExecutionState::Succeeded {
            continue;
        }
        let store = execution.registration.name.clone();
        let ctx = HookContext {
            store: store.clone(),
            action,
            path: execution.path.clone(),
            payload: original_payload.clone(),
        };
        debug!(%store, %action, "reverting store action");
        match execution
            .registration
            .driver
            .revert(original_payload.clone(), &execution.path, execution.config, action)
            .await
        {
            Ok(()) => {
                execution.state = ExecutionState::Reverted;
                for hook in &hooks.revert {
                    hook(&ctx, original_error);
                }
            }
            Err(source) => {
                let revert_error = MuxError::Revert {
                    store: store.clone(),
                    action,
                    source,
                };
                warn!(%store, %revert_error, "revert failed");
                for hook in &hooks.revert {
                    hook(&ctx, &revert_error);
                }
                for hook in &hooks.error {
                    hook(&ctx, &revert_error);
                }
            }
        }
    }
}

/// The local store's inserted id when it participated, else the first
/// succeeded store's
fn canonical_insert_id(
    inserted_ids: &[(String, String)],
    local_store_name: Option<&str>,
) -> Option<String> {
    if let Some(local) = local_store_name {
        if let Some((_, id)) = inserted_ids.iter().find(|(store, _)| store == local) {
            return Some(id.clone());
        }
    }
    inserted_ids.first().map(|(_, id)| id.clone())
}

/// Call the driver method matching the action
async fn invoke(
    registration: &StoreRegistration,
    action: ActionName,
    payload: Option<Value>,
    path: &ModulePath,
    config: &StoreModuleConfig,
) -> Result<StoreResult, StoreError> {
    let driver = &registration.driver;
    match action {
        ActionName::Insert => {
            let payload = payload.unwrap_or_else(|| Value::Object(Default::default()));
            driver
                .insert(payload, path, config)
                .await
                .map(StoreResult::Inserted)
        }
        ActionName::Merge => driver
            .merge(required(payload, action)?, path, config)
            .await
            .map(|_| StoreResult::Done),
        ActionName::Assign => driver
            .assign(required(payload, action)?, path, config)
            .await
            .map(|_| StoreResult::Done),
        ActionName::Replace => driver
            .replace(required(payload, action)?, path, config)
            .await
            .map(|_| StoreResult::Done),
        ActionName::Delete => driver
            .delete(payload, path, config)
            .await
            .map(|_| StoreResult::Done),
        ActionName::DeleteProp => driver
            .delete_prop(prop_list(payload), path, config)
            .await
            .map(|_| StoreResult::Done),
        ActionName::Fetch => driver
            .fetch(payload, path, config)
            .await
            .map(|response| StoreResult::Fetched(response.docs)),
        ActionName::Stream => Err(StoreError::new(
            "stream actions are handled by the stream coordinator",
        )),
    }
}

fn required(payload: Option<Value>, action: ActionName) -> Result<Value, StoreError> {
    payload.ok_or_else(|| StoreError::new(format!("'{}' requires a payload", action)))
}

/// Prop deletions travel as a JSON array of dot-notation paths
fn prop_list(payload: Option<Value>) -> Vec<String> {
    match payload {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(prop) => Some(prop),
                _ => None,
            })
            .collect(),
        Some(Value::String(prop)) => vec![prop],
        _ => Vec::new(),
    }
}
