//! Mock store drivers shared by the integration tests

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use storemux::{
    ActionName, DocRecord, FetchResponse, ModulePath, StoreDriver, StoreError, StoreModuleConfig,
    StoreStream, StreamEventSender, StreamMessage,
};

/// Shared call journal: one `"store:action:path"` line per driver call, in
/// invocation order across all stores.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn new_journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// An in-memory mock store.
///
/// Fails on demand: either per action via `fail_on`, or when a payload
/// carries `"shouldFail": "<store name>"`.
pub struct MockStore {
    pub name: String,
    journal: Journal,
    /// full doc path → document
    pub docs: Mutex<BTreeMap<String, Value>>,
    /// (action, original payload) per revert call
    pub reverted: Mutex<Vec<(ActionName, Option<Value>)>>,
    /// canned fetch response overriding the stored docs
    pub fetch_response: Mutex<Option<Vec<DocRecord>>>,
    fail_on: Mutex<HashSet<ActionName>>,
    fail_revert: AtomicBool,
    pub setup_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    pub stop_calls: Arc<AtomicUsize>,
    /// senders of streams opened on this store, for pushing events manually
    pub stream_senders: Mutex<Vec<StreamEventSender>>,
    /// debounce windows observed on write calls
    pub seen_debounce: Mutex<Vec<Option<u64>>>,
    next_id: AtomicUsize,
}

impl MockStore {
    pub fn new(name: &str, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            journal,
            docs: Mutex::new(BTreeMap::new()),
            reverted: Mutex::new(Vec::new()),
            fetch_response: Mutex::new(None),
            fail_on: Mutex::new(HashSet::new()),
            fail_revert: AtomicBool::new(false),
            setup_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            stop_calls: Arc::new(AtomicUsize::new(0)),
            stream_senders: Mutex::new(Vec::new()),
            seen_debounce: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        })
    }

    pub fn fail_on(&self, action: ActionName) {
        self.fail_on.lock().insert(action);
    }

    pub fn fail_revert(&self) {
        self.fail_revert.store(true, Ordering::SeqCst);
    }

    pub fn doc(&self, full_path: &str) -> Option<Value> {
        self.docs.lock().get(full_path).cloned()
    }

    pub fn seed(&self, full_path: &str, doc: Value) {
        self.docs.lock().insert(full_path.to_string(), doc);
    }

    pub fn canned_fetch(&self, docs: Vec<DocRecord>) {
        *self.fetch_response.lock() = Some(docs);
    }

    /// Deliver an event on the most recently opened stream
    pub fn push_stream_message(&self, message: StreamMessage) {
        if let Some(sender) = self.stream_senders.lock().last() {
            let _ = sender.send(message);
        }
    }

    fn record(&self, action: ActionName, path: &ModulePath) {
        self.journal
            .lock()
            .push(format!("{}:{}:{}", self.name, action, path.full_path()));
    }

    fn emulated_error(
        &self,
        action: ActionName,
        payload: Option<&Value>,
    ) -> Result<(), StoreError> {
        if self.fail_on.lock().contains(&action) {
            return Err(StoreError::new(format!(
                "emulated '{}' failure in store '{}'",
                action, self.name
            )));
        }
        if let Some(payload) = payload {
            if payload.get("shouldFail").and_then(Value::as_str) == Some(self.name.as_str()) {
                return Err(StoreError::new(format!(
                    "emulated '{}' failure in store '{}'",
                    action, self.name
                )));
            }
        }
        Ok(())
    }

    fn full_path(path: &ModulePath, id: &str) -> String {
        format!("{}/{}", path.collection_path, id)
    }
}

/// Deep-merge `incoming` into `target`: nested objects merge, everything
/// else overwrites.
fn deep_merge(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (key, value) in incoming {
                deep_merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, incoming) => *target = incoming.clone(),
    }
}

#[async_trait]
impl StoreDriver for MockStore {
    async fn insert(
        &self,
        payload: Value,
        path: &ModulePath,
        config: &StoreModuleConfig,
    ) -> Result<String, StoreError> {
        self.emulated_error(ActionName::Insert, Some(&payload))?;
        self.seen_debounce.lock().push(config.sync_debounce_ms);
        let id = match &path.doc_id {
            Some(id) => id.clone(),
            None => format!("{}-{}", self.name, self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        };
        self.record(ActionName::Insert, &path.with_doc_id(id.clone()));
        self.docs
            .lock()
            .insert(Self::full_path(path, &id), payload);
        Ok(id)
    }

    async fn merge(
        &self,
        payload: Value,
        path: &ModulePath,
        _config: &StoreModuleConfig,
    ) -> Result<(), StoreError> {
        self.emulated_error(ActionName::Merge, Some(&payload))?;
        self.record(ActionName::Merge, path);
        let mut docs = self.docs.lock();
        let doc = docs
            .entry(path.full_path())
            .or_insert_with(|| Value::Object(Default::default()));
        deep_merge(doc, &payload);
        Ok(())
    }

    async fn assign(
        &self,
        payload: Value,
        path: &ModulePath,
        _config: &StoreModuleConfig,
    ) -> Result<(), StoreError> {
        self.emulated_error(ActionName::Assign, Some(&payload))?;
        self.record(ActionName::Assign, path);
        let mut docs = self.docs.lock();
        let doc = docs
            .entry(path.full_path())
            .or_insert_with(|| Value::Object(Default::default()));
        if let (Value::Object(doc), Value::Object(incoming)) = (doc, &payload) {
            for (key, value) in incoming {
                doc.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn replace(
        &self,
        payload: Value,
        path: &ModulePath,
        _config: &StoreModuleConfig,
    ) -> Result<(), StoreError> {
        self.emulated_error(ActionName::Replace, Some(&payload))?;
        self.record(ActionName::Replace, path);
        self.docs.lock().insert(path.full_path(), payload);
        Ok(())
    }

    async fn delete(
        &self,
        payload: Option<Value>,
        path: &ModulePath,
        _config: &StoreModuleConfig,
    ) -> Result<(), StoreError> {
        self.emulated_error(ActionName::Delete, payload.as_ref())?;
        self.record(ActionName::Delete, path);
        self.docs.lock().remove(&path.full_path());
        Ok(())
    }

    async fn delete_prop(
        &self,
        props: Vec<String>,
        path: &ModulePath,
        _config: &StoreModuleConfig,
    ) -> Result<(), StoreError> {
        self.emulated_error(ActionName::DeleteProp, None)?;
        self.record(ActionName::DeleteProp, path);
        if let Some(Value::Object(doc)) = self.docs.lock().get_mut(&path.full_path()) {
            for prop in props {
                doc.remove(&prop);
            }
        }
        Ok(())
    }

    async fn fetch(
        &self,
        payload: Option<Value>,
        path: &ModulePath,
        _config: &StoreModuleConfig,
    ) -> Result<FetchResponse, StoreError> {
        self.emulated_error(ActionName::Fetch, payload.as_ref())?;
        self.record(ActionName::Fetch, path);

        if let Some(docs) = self.fetch_response.lock().clone() {
            return Ok(FetchResponse::new(docs));
        }

        let docs = self.docs.lock();
        let records = match &path.doc_id {
            Some(id) => match docs.get(&path.full_path()) {
                Some(doc) => vec![DocRecord::existing(id.clone(), doc.clone())],
                None => vec![DocRecord::missing(id.clone())],
            },
            None => {
                let prefix = format!("{}/", path.collection_path);
                docs.iter()
                    .filter_map(|(full_path, doc)| {
                        full_path.strip_prefix(&prefix).map(|id| {
                            DocRecord::existing(id.to_string(), doc.clone())
                        })
                    })
                    .collect()
            }
        };
        Ok(FetchResponse::new(records))
    }

    async fn stream(
        &self,
        payload: Option<Value>,
        path: &ModulePath,
        _config: &StoreModuleConfig,
        events: StreamEventSender,
    ) -> Result<StoreStream, StoreError> {
        self.emulated_error(ActionName::Stream, payload.as_ref())?;
        self.record(ActionName::Stream, path);
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.stream_senders.lock().push(events);

        let stop_calls = Arc::clone(&self.stop_calls);
        Ok(StoreStream::new(move || {
            stop_calls.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn revert(
        &self,
        payload: Option<Value>,
        path: &ModulePath,
        _config: &StoreModuleConfig,
        action: ActionName,
    ) -> Result<(), StoreError> {
        if self.fail_revert.load(Ordering::SeqCst) {
            return Err(StoreError::new(format!(
                "emulated revert failure in store '{}'",
                self.name
            )));
        }
        self.reverted.lock().push((action, payload));
        if action == ActionName::Insert {
            self.docs.lock().remove(&path.full_path());
        }
        Ok(())
    }

    fn setup_module(&self, _path: &ModulePath, _config: &StoreModuleConfig) {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
    }
}
