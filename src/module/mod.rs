//! Module layer
//!
//! The instance owns the attached stores, the global configuration, the
//! per-collection shared data maps and the open-stream registry. Collection
//! and doc handles are cheap clones over that shared state and expose the
//! module-facing operations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::config::{resolve, ActionConfig, GlobalConfig, ModuleConfig};
use crate::dispatch::{dispatch, merge_fetch_results, ActionRequest, DispatchOutcome};
use crate::error::{MuxError, MuxResult};
use crate::store::{StoreModuleConfig, StoreRegistration, StoreRegistry};
use crate::stream::{stream_signature, StreamCoordinator, StreamHandle, StreamRequest};
use crate::types::{ActionName, ModulePath, QueryClauses, StreamEventKind};

type CollectionData = Arc<RwLock<BTreeMap<String, Value>>>;

struct MuxInner {
    registry: StoreRegistry,
    global: GlobalConfig,
    /// One shared data map per collection path, created lazily
    data: Mutex<HashMap<String, CollectionData>>,
    streams: StreamCoordinator,
    /// (store name, module path) pairs whose driver setup already ran
    modules_set_up: Mutex<HashSet<(String, String)>>,
}

/// The orchestration instance: attached stores plus global configuration.
///
/// Cheap to clone; clones share stores, data maps and open streams.
#[derive(Clone)]
pub struct StoreMux {
    inner: Arc<MuxInner>,
}

impl StoreMux {
    pub fn new(global: GlobalConfig, registry: StoreRegistry) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                registry,
                global,
                data: Mutex::new(HashMap::new()),
                streams: StreamCoordinator::new(),
                modules_set_up: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// A handle on a whole collection
    pub fn collection(&self, collection_path: &str) -> Collection {
        self.collection_with_config(collection_path, ModuleConfig::default())
    }

    pub fn collection_with_config(&self, collection_path: &str, config: ModuleConfig) -> Collection {
        let path = ModulePath::collection(collection_path);
        let data = self.inner.collection_data(&path.collection_path);
        let config = Arc::new(config);
        self.inner.setup_module(&path, &config);
        Collection {
            inner: Arc::clone(&self.inner),
            path,
            config,
            data,
        }
    }

    /// A handle on a single document, from a full path like `"pokedex/025"`
    pub fn doc(&self, full_path: &str) -> MuxResult<Doc> {
        self.doc_with_config(full_path, ModuleConfig::default())
    }

    pub fn doc_with_config(&self, full_path: &str, config: ModuleConfig) -> MuxResult<Doc> {
        let path = ModulePath::parse(full_path);
        if !path.is_doc() {
            return Err(MuxError::InvalidDocPath {
                path: full_path.to_string(),
            });
        }
        let data = self.inner.collection_data(&path.collection_path);
        let config = Arc::new(config);
        self.inner.setup_module(&path, &config);
        Ok(Doc {
            inner: Arc::clone(&self.inner),
            path,
            config,
            data,
        })
    }

    /// Close every open stream on this instance
    pub fn close_all_streams(&self) {
        self.inner.streams.close_all();
    }
}

impl MuxInner {
    fn collection_data(&self, collection_path: &str) -> CollectionData {
        self.data
            .lock()
            .entry(collection_path.to_string())
            .or_default()
            .clone()
    }

    /// Run each store's one-time per-module setup
    fn setup_module(&self, path: &ModulePath, config: &ModuleConfig) {
        let sync_debounce_ms = config
            .config
            .sync_debounce_ms
            .or(self.global.config.sync_debounce_ms);
        for registration in self.registry.iter() {
            let key = (registration.name.clone(), path.full_path());
            if self.modules_set_up.lock().insert(key) {
                let store_config =
                    self.store_module_config(registration, config, None, sync_debounce_ms);
                registration.driver.setup_module(path, &store_config);
            }
        }
    }

    fn store_module_config(
        &self,
        registration: &StoreRegistration,
        module: &ModuleConfig,
        clauses: Option<&QueryClauses>,
        sync_debounce_ms: Option<u64>,
    ) -> StoreModuleConfig {
        StoreModuleConfig {
            options: module
                .per_store
                .get(&registration.name)
                .cloned()
                .unwrap_or(Value::Null),
            clauses: clauses.cloned().unwrap_or_else(|| module.clauses.clone()),
            sync_debounce_ms,
        }
    }

    fn ordered_stores(
        &self,
        execution_order: Option<&[String]>,
        action: ActionName,
        module: &ModuleConfig,
        clauses: Option<&QueryClauses>,
        sync_debounce_ms: Option<u64>,
    ) -> MuxResult<Vec<(StoreRegistration, StoreModuleConfig)>> {
        Ok(self
            .registry
            .ordered(execution_order, action)?
            .into_iter()
            .map(|registration| {
                (
                    registration.clone(),
                    self.store_module_config(registration, module, clauses, sync_debounce_ms),
                )
            })
            .collect())
    }

    async fn run_write(
        &self,
        path: ModulePath,
        module: &ModuleConfig,
        action: ActionName,
        payload: Option<Value>,
        action_config: Option<&ActionConfig>,
    ) -> MuxResult<DispatchOutcome> {
        let effective = resolve(&self.global.config, &module.config, action_config, action);
        let stores = self.ordered_stores(
            effective.execution_order.as_deref(),
            action,
            module,
            None,
            effective.sync_debounce_ms,
        )?;
        dispatch(ActionRequest {
            action,
            payload,
            path,
            stores,
            effective: &effective,
            local_store_name: self.global.local_store_name.as_deref(),
        })
        .await
    }

    async fn run_fetch(
        &self,
        path: ModulePath,
        module: &ModuleConfig,
        payload: Option<Value>,
        action_config: Option<&ActionConfig>,
        data: &CollectionData,
    ) -> MuxResult<BTreeMap<String, Value>> {
        let action = ActionName::Fetch;
        let effective = resolve(&self.global.config, &module.config, action_config, action);
        let stores = self.ordered_stores(
            effective.execution_order.as_deref(),
            action,
            module,
            None,
            effective.sync_debounce_ms,
        )?;
        let outcome = dispatch(ActionRequest {
            action,
            payload,
            path,
            stores,
            effective: &effective,
            local_store_name: self.global.local_store_name.as_deref(),
        })
        .await?;
        Ok(merge_fetch_results(
            data,
            outcome.fetched,
            effective
                .read_response_transforms
                .get(&StreamEventKind::Added),
        ))
    }

    async fn run_stream(
        &self,
        path: ModulePath,
        module: &ModuleConfig,
        payload: Option<Value>,
        clauses: Option<QueryClauses>,
        action_config: Option<&ActionConfig>,
        data: &CollectionData,
    ) -> MuxResult<StreamHandle> {
        let action = ActionName::Stream;
        let effective = resolve(&self.global.config, &module.config, action_config, action);
        let clauses = clauses.unwrap_or_else(|| module.clauses.clone());
        let stores = self.ordered_stores(
            effective.execution_order.as_deref(),
            action,
            module,
            Some(&clauses),
            effective.sync_debounce_ms,
        )?;
        let payload = match (&effective.payload_transform, payload) {
            (Some(transform), Some(value)) => Some(transform(value)),
            (_, value) => value,
        };
        self.streams
            .open_or_find(StreamRequest {
                path: &path,
                clauses: &clauses,
                payload,
                stores,
                effective: &effective,
                data: Arc::clone(data),
            })
            .await
    }
}

/// Handle on a collection module
#[derive(Clone)]
pub struct Collection {
    inner: Arc<MuxInner>,
    path: ModulePath,
    config: Arc<ModuleConfig>,
    data: CollectionData,
}

impl Collection {
    pub fn path(&self) -> &str {
        &self.path.collection_path
    }

    /// Chain to a document in this collection, sharing config and data
    pub fn doc<S: Into<String>>(&self, doc_id: S) -> Doc {
        let path = self.path.with_doc_id(doc_id);
        self.inner.setup_module(&path, &self.config);
        Doc {
            inner: Arc::clone(&self.inner),
            path,
            config: Arc::clone(&self.config),
            data: Arc::clone(&self.data),
        }
    }

    /// Read-only snapshot of the collection's data map
    pub fn data(&self) -> BTreeMap<String, Value> {
        self.data.read().clone()
    }

    /// One document from the data map
    pub fn doc_data(&self, doc_id: &str) -> Option<Value> {
        self.data.read().get(doc_id).cloned()
    }

    /// Insert a document; the first store to generate an id fixes the
    /// document identity for all stores. Returns a handle on the new doc.
    pub async fn insert(
        &self,
        payload: Value,
        action_config: Option<ActionConfig>,
    ) -> MuxResult<Doc> {
        let outcome = self
            .inner
            .run_write(
                self.path.clone(),
                &self.config,
                ActionName::Insert,
                Some(payload),
                action_config.as_ref(),
            )
            .await?;
        let doc_id = outcome.doc_id.ok_or(MuxError::MissingDocId {
            action: ActionName::Insert,
        })?;
        Ok(self.doc(doc_id))
    }

    /// Delete a document of this collection by id
    pub async fn delete(&self, doc_id: &str, action_config: Option<ActionConfig>) -> MuxResult<()> {
        self.inner
            .run_write(
                self.path.with_doc_id(doc_id),
                &self.config,
                ActionName::Delete,
                None,
                action_config.as_ref(),
            )
            .await?;
        Ok(())
    }

    /// One-shot read across all stores, merged into the data map
    pub async fn fetch(
        &self,
        payload: Option<Value>,
        action_config: Option<ActionConfig>,
    ) -> MuxResult<BTreeMap<String, Value>> {
        self.inner
            .run_fetch(
                self.path.clone(),
                &self.config,
                payload,
                action_config.as_ref(),
                &self.data,
            )
            .await
    }

    /// Open (or join) a subscription over this collection
    pub async fn stream(
        &self,
        payload: Option<Value>,
        clauses: Option<QueryClauses>,
        action_config: Option<ActionConfig>,
    ) -> MuxResult<StreamHandle> {
        self.inner
            .run_stream(
                self.path.clone(),
                &self.config,
                payload,
                clauses,
                action_config.as_ref(),
                &self.data,
            )
            .await
    }

    /// Find an already-open subscription for this collection's query
    pub fn find_stream(&self, clauses: Option<&QueryClauses>) -> Option<StreamHandle> {
        let clauses = clauses.unwrap_or(&self.config.clauses);
        self.inner
            .streams
            .find(&stream_signature(&self.path, clauses))
    }

    /// Close this collection's subscription. Idempotent; returns whether a
    /// stream was actually closed.
    pub fn close_stream(&self, clauses: Option<&QueryClauses>) -> bool {
        let clauses = clauses.unwrap_or(&self.config.clauses);
        self.inner
            .streams
            .close(&stream_signature(&self.path, clauses))
    }
}

/// Handle on a document module
#[derive(Clone)]
pub struct Doc {
    inner: Arc<MuxInner>,
    path: ModulePath,
    config: Arc<ModuleConfig>,
    data: CollectionData,
}

impl std::fmt::Debug for Doc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doc")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

impl Doc {
    pub fn id(&self) -> &str {
        self.path.doc_id.as_deref().unwrap_or_default()
    }

    pub fn path(&self) -> String {
        self.path.full_path()
    }

    /// Chain to a sub-collection of this document
    pub fn collection(&self, collection_id: &str) -> Collection {
        let path = ModulePath::collection(format!("{}/{}", self.path.full_path(), collection_id));
        let data = self.inner.collection_data(&path.collection_path);
        let config = Arc::new(ModuleConfig::default());
        self.inner.setup_module(&path, &config);
        Collection {
            inner: Arc::clone(&self.inner),
            path,
            config,
            data,
        }
    }

    /// This document's current data, if any store read it in
    pub fn data(&self) -> Option<Value> {
        self.path
            .doc_id
            .as_ref()
            .and_then(|id| self.data.read().get(id).cloned())
    }

    /// Insert at this document's id
    pub async fn insert(&self, payload: Value, action_config: Option<ActionConfig>) -> MuxResult<()> {
        self.inner
            .run_write(
                self.path.clone(),
                &self.config,
                ActionName::Insert,
                Some(payload),
                action_config.as_ref(),
            )
            .await?;
        Ok(())
    }

    /// Deep-merge the payload into this document
    pub async fn merge(&self, payload: Value, action_config: Option<ActionConfig>) -> MuxResult<()> {
        self.write(ActionName::Merge, payload, action_config).await
    }

    /// Shallow-assign the payload's top-level props
    pub async fn assign(&self, payload: Value, action_config: Option<ActionConfig>) -> MuxResult<()> {
        self.write(ActionName::Assign, payload, action_config).await
    }

    /// Replace this document with the payload
    pub async fn replace(&self, payload: Value, action_config: Option<ActionConfig>) -> MuxResult<()> {
        self.write(ActionName::Replace, payload, action_config).await
    }

    /// Delete individual props (dot-notation paths) from this document
    pub async fn delete_prop(
        &self,
        props: Vec<String>,
        action_config: Option<ActionConfig>,
    ) -> MuxResult<()> {
        let payload = Value::Array(props.into_iter().map(Value::String).collect());
        self.inner
            .run_write(
                self.path.clone(),
                &self.config,
                ActionName::DeleteProp,
                Some(payload),
                action_config.as_ref(),
            )
            .await?;
        Ok(())
    }

    /// Delete this document
    pub async fn delete(&self, action_config: Option<ActionConfig>) -> MuxResult<()> {
        self.inner
            .run_write(
                self.path.clone(),
                &self.config,
                ActionName::Delete,
                None,
                action_config.as_ref(),
            )
            .await?;
        Ok(())
    }

    /// One-shot read of this document
    pub async fn fetch(
        &self,
        payload: Option<Value>,
        action_config: Option<ActionConfig>,
    ) -> MuxResult<Option<Value>> {
        let snapshot = self
            .inner
            .run_fetch(
                self.path.clone(),
                &self.config,
                payload,
                action_config.as_ref(),
                &self.data,
            )
            .await?;
        Ok(self
            .path
            .doc_id
            .as_ref()
            .and_then(|id| snapshot.get(id).cloned()))
    }

    /// Open (or join) a subscription on this document
    pub async fn stream(
        &self,
        payload: Option<Value>,
        action_config: Option<ActionConfig>,
    ) -> MuxResult<StreamHandle> {
        self.inner
            .run_stream(
                self.path.clone(),
                &self.config,
                payload,
                Some(QueryClauses::default()),
                action_config.as_ref(),
                &self.data,
            )
            .await
    }

    pub fn find_stream(&self) -> Option<StreamHandle> {
        self.inner
            .streams
            .find(&stream_signature(&self.path, &QueryClauses::default()))
    }

    pub fn close_stream(&self) -> bool {
        self.inner
            .streams
            .close(&stream_signature(&self.path, &QueryClauses::default()))
    }

    async fn write(
        &self,
        action: ActionName,
        payload: Value,
        action_config: Option<ActionConfig>,
    ) -> MuxResult<()> {
        self.inner
            .run_write(
                self.path.clone(),
                &self.config,
                action,
                Some(payload),
                action_config.as_ref(),
            )
            .await?;
        Ok(())
    }
}
