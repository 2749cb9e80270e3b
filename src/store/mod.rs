//! Store driver contract
//!
//! A store driver is the adapter a backing data store (in-memory cache,
//! cloud document database, ...) implements so that modules can orchestrate
//! actions across it. One async method per action; drivers own their wire
//! protocols and per-module state.

mod registry;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

pub use registry::{StoreRegistration, StoreRegistry};

use crate::error::StoreError;
use crate::types::{ActionName, DocRecord, ModulePath, QueryClauses, StreamMessage};

/// Whether a store is the fast local cache or a remote persistence backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Local,
    Remote,
}

/// The per-module configuration a driver receives on every call: its own
/// opaque options, the effective query clauses for read actions, and the
/// resolved batch debounce window for drivers that sync through
/// [`crate::batch::BatchSync`] (fall back to
/// [`crate::batch::DEFAULT_SYNC_DEBOUNCE`] when unset).
#[derive(Debug, Clone, Default)]
pub struct StoreModuleConfig {
    pub options: Value,
    pub clauses: QueryClauses,
    pub sync_debounce_ms: Option<u64>,
}

/// Documents returned by a one-shot fetch
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub docs: Vec<DocRecord>,
}

impl FetchResponse {
    pub fn new(docs: Vec<DocRecord>) -> Self {
        Self { docs }
    }
}

/// Sender half handed to a driver's `stream` implementation. Drop it to
/// signal clean completion.
pub type StreamEventSender = mpsc::UnboundedSender<StreamMessage>;

/// Handle returned by a driver's `stream` implementation. `stop` tears down
/// the driver-side subscription; it is called at most once.
pub struct StoreStream {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl StoreStream {
    pub fn new<F: FnOnce() + Send + 'static>(stop: F) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    /// A stream with no driver-side teardown
    pub fn unmanaged() -> Self {
        Self { stop: None }
    }

    pub(crate) fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl std::fmt::Debug for StoreStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreStream")
            .field("stopped", &self.stop.is_none())
            .finish()
    }
}

/// Outcome of one store's execution of one action, as seen by hooks and the
/// dispatcher.
#[derive(Debug, Clone)]
pub enum StoreResult {
    /// An insert settled on this document id
    Inserted(String),
    /// A write or delete completed
    Done,
    /// A one-shot fetch returned these records
    Fetched(Vec<DocRecord>),
    /// A stream was opened
    Streaming,
}

/// The contract every backing store implements.
///
/// Each method receives the (possibly transformed) payload, the module path
/// and this store's per-module config. `revert` is only invoked under the
/// revert failure policy; `setup_module` runs once per (store, module path)
/// when a module is created.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Insert a document. Called without a doc id on the path, the driver
    /// must generate an id and return it; with one, it must return that id.
    async fn insert(
        &self,
        payload: Value,
        path: &ModulePath,
        config: &StoreModuleConfig,
    ) -> Result<String, StoreError>;

    /// Deep-merge the payload into the document
    async fn merge(
        &self,
        payload: Value,
        path: &ModulePath,
        config: &StoreModuleConfig,
    ) -> Result<(), StoreError>;

    /// Shallow-assign the payload's top-level props onto the document
    async fn assign(
        &self,
        payload: Value,
        path: &ModulePath,
        config: &StoreModuleConfig,
    ) -> Result<(), StoreError>;

    /// Replace the document with the payload
    async fn replace(
        &self,
        payload: Value,
        path: &ModulePath,
        config: &StoreModuleConfig,
    ) -> Result<(), StoreError>;

    /// Delete the document
    async fn delete(
        &self,
        payload: Option<Value>,
        path: &ModulePath,
        config: &StoreModuleConfig,
    ) -> Result<(), StoreError>;

    /// Delete individual props (dot-notation paths) from the document
    async fn delete_prop(
        &self,
        props: Vec<String>,
        path: &ModulePath,
        config: &StoreModuleConfig,
    ) -> Result<(), StoreError>;

    /// One-shot read of the document or collection
    async fn fetch(
        &self,
        payload: Option<Value>,
        path: &ModulePath,
        config: &StoreModuleConfig,
    ) -> Result<FetchResponse, StoreError>;

    /// Open a long-lived stream. Incremental changes go through `events`;
    /// dropping the sender signals completion.
    async fn stream(
        &self,
        payload: Option<Value>,
        path: &ModulePath,
        config: &StoreModuleConfig,
        events: StreamEventSender,
    ) -> Result<StoreStream, StoreError>;

    /// Compensate an already-succeeded action after a later store failed.
    /// Receives the original untransformed payload.
    async fn revert(
        &self,
        _payload: Option<Value>,
        _path: &ModulePath,
        _config: &StoreModuleConfig,
        action: ActionName,
    ) -> Result<(), StoreError> {
        Err(StoreError::new(format!(
            "store does not implement revert for '{}'",
            action
        )))
    }

    /// One-time per-module setup, e.g. seeding initial data
    fn setup_module(&self, _path: &ModulePath, _config: &StoreModuleConfig) {}
}
