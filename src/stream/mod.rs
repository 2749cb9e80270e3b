//! Stream coordinator
//!
//! Manages long-lived read subscriptions per store and multiplexes their
//! incremental events into the module's shared data map. Subscriptions are
//! keyed by a canonical signature over (path, clauses): opening the same
//! query twice returns the existing subscription.

mod signature;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use signature::stream_signature;

use crate::config::{EffectiveConfig, ErrorPolicy, HookContext, ReadResponseTransform};
use crate::error::{MuxError, MuxResult};
use crate::store::{StoreModuleConfig, StoreRegistration, StoreStream};
use crate::types::{
    ActionName, ModulePath, QueryClauses, StreamEvent, StreamEventKind, StreamMessage,
};

/// Lifecycle of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Opening,
    Open,
    Closing,
    Closed,
}

pub(crate) struct OpenStream {
    state: Mutex<StreamState>,
    stops: Mutex<Vec<(String, StoreStream)>>,
    /// Shared with every pump task; once set, late events are discarded
    stopped: Arc<AtomicBool>,
}

impl OpenStream {
    fn new() -> Self {
        Self {
            state: Mutex::new(StreamState::Opening),
            stops: Mutex::new(Vec::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop every per-store registration exactly once
    fn close(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, StreamState::Closing | StreamState::Closed) {
                return;
            }
            *state = StreamState::Closing;
        }
        self.stopped.store(true, Ordering::SeqCst);
        for (store, stream) in self.stops.lock().iter_mut() {
            debug!(%store, "stopping store stream");
            stream.stop();
        }
        *self.state.lock() = StreamState::Closed;
    }

    /// Stop a single store's registration, leaving the rest streaming
    fn stop_store(&self, store: &str) {
        if let Some((_, stream)) = self.stops.lock().iter_mut().find(|(name, _)| name == store) {
            stream.stop();
        }
    }
}

/// Handle to an open subscription. Cheap to clone; all clones refer to the
/// same subscription.
#[derive(Clone)]
pub struct StreamHandle {
    signature: String,
    inner: Arc<OpenStream>,
}

impl StreamHandle {
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn state(&self) -> StreamState {
        *self.inner.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state(), StreamState::Closed)
    }

    fn is_joinable(&self) -> bool {
        matches!(self.state(), StreamState::Opening | StreamState::Open)
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("signature", &self.signature)
            .field("state", &self.state())
            .finish()
    }
}

/// Everything one `open_or_find` call needs
pub(crate) struct StreamRequest<'a> {
    pub path: &'a ModulePath,
    pub clauses: &'a QueryClauses,
    /// Already transformed by the read payload transform
    pub payload: Option<Value>,
    /// Stores in execution order, each with its per-module config
    pub stores: Vec<(StoreRegistration, StoreModuleConfig)>,
    pub effective: &'a EffectiveConfig,
    pub data: Arc<RwLock<BTreeMap<String, Value>>>,
}

/// Registry of open subscriptions, owned by the instance
#[derive(Default)]
pub(crate) struct StreamCoordinator {
    open: RwLock<HashMap<String, StreamHandle>>,
}

impl StreamCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Look up an already-open subscription by signature
    pub(crate) fn find(&self, signature: &str) -> Option<StreamHandle> {
        self.open
            .read()
            .get(signature)
            .filter(|handle| handle.is_joinable())
            .cloned()
    }

    /// Open a subscription over every store in order, or return the existing
    /// one for this signature.
    ///
    /// A store failing to open rejects the call, fires the error hooks, and
    /// leaves stores that already opened streaming; they are torn down by an
    /// explicit close.
    pub(crate) async fn open_or_find(&self, request: StreamRequest<'_>) -> MuxResult<StreamHandle> {
        let signature = stream_signature(request.path, request.clauses);

        let handle = {
            let mut open = self.open.write();
            if let Some(existing) = open.get(&signature) {
                if existing.is_joinable() {
                    return Ok(existing.clone());
                }
            }
            let handle = StreamHandle {
                signature: signature.clone(),
                inner: Arc::new(OpenStream::new()),
            };
            open.insert(signature.clone(), handle.clone());
            handle
        };

        for (registration, store_config) in &request.stores {
            let ctx = HookContext {
                store: registration.name.clone(),
                action: ActionName::Stream,
                path: request.path.clone(),
                payload: request.payload.clone(),
            };
            for hook in &request.effective.hooks.before {
                hook(&ctx);
            }

            let (tx, rx) = mpsc::unbounded_channel();
            debug!(store = %registration.name, path = %request.path, "opening stream");
            match registration
                .driver
                .stream(request.payload.clone(), request.path, store_config, tx)
                .await
            {
                Ok(store_stream) => {
                    handle
                        .inner
                        .stops
                        .lock()
                        .push((registration.name.clone(), store_stream));
                    spawn_pump(
                        registration.name.clone(),
                        rx,
                        Arc::clone(&request.data),
                        request.effective.read_response_transforms.clone(),
                        request.effective.on_error,
                        Arc::clone(&handle.inner.stopped),
                        Arc::downgrade(&handle.inner),
                    );
                }
                Err(source) => {
                    let error = MuxError::StreamOpen {
                        store: registration.name.clone(),
                        source,
                    };
                    warn!(store = %registration.name, %error, "stream open failed");
                    for hook in &request.effective.hooks.error {
                        hook(&ctx, &error);
                    }
                    if handle.inner.stops.lock().is_empty() {
                        // nothing opened, nothing to keep
                        self.close(&signature);
                    } else {
                        *handle.inner.state.lock() = StreamState::Open;
                    }
                    return Err(error);
                }
            }
        }

        *handle.inner.state.lock() = StreamState::Open;
        Ok(handle)
    }

    /// Close the subscription with this signature. Idempotent: closing an
    /// unknown or already-closed signature is a no-op.
    pub(crate) fn close(&self, signature: &str) -> bool {
        // take the handle out before stopping so driver teardown never runs
        // under the registry lock
        let removed = self.open.write().remove(signature);
        match removed {
            Some(handle) => {
                handle.inner.close();
                true
            }
            None => false,
        }
    }

    /// Close every open subscription, e.g. on instance teardown
    pub(crate) fn close_all(&self) {
        let handles: Vec<StreamHandle> = self.open.write().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.inner.close();
        }
    }
}

/// Consume one store's stream channel, applying each event to the shared
/// data map until the channel closes or the subscription stops.
fn spawn_pump(
    store: String,
    mut rx: mpsc::UnboundedReceiver<StreamMessage>,
    data: Arc<RwLock<BTreeMap<String, Value>>>,
    transforms: HashMap<StreamEventKind, ReadResponseTransform>,
    on_error: ErrorPolicy,
    stopped: Arc<AtomicBool>,
    open_stream: Weak<OpenStream>,
) {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if stopped.load(Ordering::SeqCst) {
                debug!(%store, "discarding stream event after close");
                break;
            }
            match message {
                StreamMessage::Event(event) => apply_stream_event(&data, &transforms, event),
                StreamMessage::Error(error) => {
                    warn!(%store, %error, "stream reported an error");
                    if on_error == ErrorPolicy::Stop {
                        if let Some(open) = open_stream.upgrade() {
                            open.stop_store(&store);
                        }
                        break;
                    }
                }
            }
        }
    });
}

/// One event mutates the map as a single uninterrupted step under the lock
pub(crate) fn apply_stream_event(
    data: &RwLock<BTreeMap<String, Value>>,
    transforms: &HashMap<StreamEventKind, ReadResponseTransform>,
    event: StreamEvent,
) {
    let StreamEvent { kind, record } = event;
    match kind {
        StreamEventKind::Added | StreamEventKind::Modified => {
            let doc = match transforms.get(&kind) {
                Some(transform) => transform(record.data),
                None => record.data,
            };
            data.write().insert(record.id, doc);
        }
        StreamEventKind::Removed => {
            if let Some(transform) = transforms.get(&kind) {
                transform(record.data);
            }
            data.write().remove(&record.id);
        }
    }
}
