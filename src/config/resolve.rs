//! Three-level configuration resolution
//!
//! Merge rules, per field:
//! - scalars (`on_error`, `sync_debounce_ms`): most specific non-empty value
//!   wins (action > module > global)
//! - `execution_order`: most specific applicable entry wins, looked up first
//!   by exact action name, then by the action's broader type, falling back
//!   through action config, then module, then global
//! - hooks: accumulate across all levels, most specific first
//! - payload / read-response transforms: only the most specific configured
//!   transform applies
//!
//! Resolution never fails; absent fields default to no-op.

use std::collections::HashMap;

use super::{
    ErrorPolicy, Hooks, OrderKey, PayloadTransform, ReadResponseTransform, SharedConfig,
};
use crate::types::{ActionName, StreamEventKind};

/// The merged configuration driving one action invocation
#[derive(Clone)]
pub struct EffectiveConfig {
    /// Resolved store order for this action; `None` means registration order
    pub execution_order: Option<Vec<String>>,
    pub on_error: ErrorPolicy,
    /// The transform for this action's type, if any level configured one
    pub payload_transform: Option<PayloadTransform>,
    /// Most specific record transform per stream event kind
    pub read_response_transforms: HashMap<StreamEventKind, ReadResponseTransform>,
    /// All hooks of all levels, most specific first
    pub hooks: Hooks,
    pub sync_debounce_ms: Option<u64>,
}

pub fn resolve(
    global: &SharedConfig,
    module: &SharedConfig,
    action_cfg: Option<&SharedConfig>,
    action: ActionName,
) -> EffectiveConfig {
    let levels: [Option<&SharedConfig>; 3] = [action_cfg, Some(module), Some(global)];

    let execution_order = levels
        .iter()
        .flatten()
        .find_map(|level| order_entry(level, action));

    let on_error = levels
        .iter()
        .flatten()
        .find_map(|level| level.on_error)
        .unwrap_or_default();

    let payload_transform = levels
        .iter()
        .flatten()
        .find_map(|level| level.modify_payload_on.get(&action.action_type()).cloned());

    let mut read_response_transforms = HashMap::new();
    for kind in [
        StreamEventKind::Added,
        StreamEventKind::Modified,
        StreamEventKind::Removed,
    ] {
        if let Some(transform) = levels
            .iter()
            .flatten()
            .find_map(|level| level.modify_read_response_on.get(&kind).cloned())
        {
            read_response_transforms.insert(kind, transform);
        }
    }

    let mut hooks = Hooks::default();
    for level in levels.iter().flatten() {
        hooks.extend_from(&level.on);
    }

    let sync_debounce_ms = levels
        .iter()
        .flatten()
        .find_map(|level| level.sync_debounce_ms);

    EffectiveConfig {
        execution_order,
        on_error,
        payload_transform,
        read_response_transforms,
        hooks,
        sync_debounce_ms,
    }
}

/// Within one level, an exact action-name entry beats an action-type entry.
/// Empty store lists are treated as absent.
fn order_entry(level: &SharedConfig, action: ActionName) -> Option<Vec<String>> {
    level
        .execution_order
        .get(&OrderKey::Action(action))
        .filter(|stores| !stores.is_empty())
        .or_else(|| {
            level
                .execution_order
                .get(&OrderKey::Type(action.action_type()))
                .filter(|stores| !stores.is_empty())
        })
        .cloned()
}
