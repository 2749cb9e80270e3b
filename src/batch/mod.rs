//! Debounced batch sync
//!
//! Remote stores that pay per round trip use this to coalesce discrete
//! write/delete calls issued in quick succession into few atomic
//! multi-operation commits. Operations queue into capacity-bounded frames;
//! a shared countdown restarts on every enqueue and, once a full quiet
//! window elapses, the oldest frame is committed as one atomic batch.

mod countdown;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub use countdown::Countdown;

use crate::error::{BatchCommitError, StoreError};

/// An atomic commit can contain at most this many operations; a frame that
/// would exceed it is sealed and a new frame opened transparently.
pub const MAX_OPERATIONS_PER_FRAME: usize = 500;

/// Debounce window used when no `sync_debounce_ms` is configured
pub const DEFAULT_SYNC_DEBOUNCE: Duration = Duration::from_millis(1000);

/// The kind of a queued write operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Set,
    Update,
    Delete,
}

/// One discrete operation queued for batched commit
#[derive(Debug, Clone)]
pub struct SyncOperation {
    pub kind: SyncKind,
    pub document_path: String,
    pub payload: Option<Value>,
}

impl SyncOperation {
    pub fn set<P: Into<String>>(document_path: P, payload: Value) -> Self {
        Self {
            kind: SyncKind::Set,
            document_path: document_path.into(),
            payload: Some(payload),
        }
    }

    pub fn update<P: Into<String>>(document_path: P, payload: Value) -> Self {
        Self {
            kind: SyncKind::Update,
            document_path: document_path.into(),
            payload: Some(payload),
        }
    }

    pub fn delete<P: Into<String>>(document_path: P) -> Self {
        Self {
            kind: SyncKind::Delete,
            document_path: document_path.into(),
            payload: None,
        }
    }

    /// How many operations this entry counts as towards the frame cap.
    /// Baseline 1; composite field-level operations (server timestamps,
    /// array unions, ...) would count extra here.
    pub fn operation_count(&self) -> usize {
        1
    }
}

/// The backing atomic-commit primitive: all operations in one call succeed
/// or fail together.
#[async_trait]
pub trait BatchCommitter: Send + Sync {
    async fn commit(&self, operations: Vec<SyncOperation>) -> Result<(), StoreError>;
}

struct SyncFrame {
    operation_count: usize,
    operations: Vec<SyncOperation>,
    resolvers: Vec<oneshot::Sender<Result<(), BatchCommitError>>>,
    sealed: bool,
}

impl SyncFrame {
    fn new() -> Self {
        Self {
            operation_count: 0,
            operations: Vec::new(),
            resolvers: Vec::new(),
            sealed: false,
        }
    }
}

struct SyncState {
    queue: VecDeque<SyncFrame>,
    countdown: Option<Countdown>,
    commit_in_flight: bool,
    /// The countdown fired while a commit was in flight; the next frame is
    /// due as soon as that commit settles
    fire_pending: bool,
}

impl SyncState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            countdown: None,
            commit_in_flight: false,
            fire_pending: false,
        }
    }

    /// The frame accepting enqueues, rolling over a full or sealed frame
    fn open_frame_for(&mut self, cost: usize) -> &mut SyncFrame {
        let roll = match self.queue.back() {
            None => true,
            Some(frame) => {
                frame.sealed || frame.operation_count + cost > MAX_OPERATIONS_PER_FRAME
            }
        };
        if roll {
            if let Some(frame) = self.queue.back_mut() {
                frame.sealed = true;
            }
            self.queue.push_back(SyncFrame::new());
        }
        let last = self.queue.len() - 1;
        &mut self.queue[last]
    }
}

struct BatchSyncInner {
    committer: Arc<dyn BatchCommitter>,
    window: Duration,
    state: Mutex<SyncState>,
}

/// Debouncing frame queue in front of a [`BatchCommitter`].
///
/// Cheap to clone; clones share the queue and countdown.
#[derive(Clone)]
pub struct BatchSync {
    inner: Arc<BatchSyncInner>,
}

impl BatchSync {
    pub fn new(committer: Arc<dyn BatchCommitter>) -> Self {
        Self::with_debounce(committer, DEFAULT_SYNC_DEBOUNCE)
    }

    pub fn with_debounce(committer: Arc<dyn BatchCommitter>, window: Duration) -> Self {
        Self {
            inner: Arc::new(BatchSyncInner {
                committer,
                window,
                state: Mutex::new(SyncState::new()),
            }),
        }
    }

    /// Queue one operation; resolves when its frame's commit settles.
    ///
    /// Every queued operation of a frame settles with the same outcome:
    /// all resolved on commit success, all rejected with the same error on
    /// commit failure.
    pub async fn enqueue(&self, operation: SyncOperation) -> Result<(), BatchCommitError> {
        self.enqueue_with(operation, None).await
    }

    /// Queue one operation with a per-call debounce override
    pub async fn enqueue_with(
        &self,
        operation: SyncOperation,
        debounce_override: Option<Duration>,
    ) -> Result<(), BatchCommitError> {
        let rx = {
            let mut state = self.inner.state.lock();
            let cost = operation.operation_count();
            let frame = state.open_frame_for(cost);
            frame.operation_count += cost;
            frame.operations.push(operation);
            let (tx, rx) = oneshot::channel();
            frame.resolvers.push(tx);

            let window = debounce_override.unwrap_or(self.inner.window);
            match &state.countdown {
                Some(countdown) => countdown.restart_with(window),
                None => {
                    let (countdown, done) = Countdown::start(window);
                    state.countdown = Some(countdown);
                    spawn_fire_watch(Arc::clone(&self.inner), done);
                }
            }
            rx
        };

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(BatchCommitError::new("batch sync dropped before commit")),
        }
    }
}

/// Wait for a countdown to fire, then run the commit cycle. A plain fn so
/// the commit cycle can schedule follow-up countdowns without a recursive
/// future type.
fn spawn_fire_watch(inner: Arc<BatchSyncInner>, done: oneshot::Receiver<()>) {
    tokio::spawn(async move {
        if done.await.is_ok() {
            on_countdown_fired(inner).await;
        }
    });
}

/// Commit cycle: dequeue the oldest frame and submit it exactly once. At
/// most one commit is in flight at a time; a fire during an in-flight
/// commit marks the next frame due immediately after it settles.
async fn on_countdown_fired(inner: Arc<BatchSyncInner>) {
    let mut due = {
        let mut state = inner.state.lock();
        state.countdown = None;
        if state.commit_in_flight {
            state.fire_pending = true;
            None
        } else {
            match state.queue.pop_front() {
                Some(frame) => {
                    state.commit_in_flight = true;
                    Some(frame)
                }
                None => None,
            }
        }
    };

    while let Some(frame) = due {
        commit_frame(&inner, frame).await;

        due = {
            let mut state = inner.state.lock();
            state.commit_in_flight = false;
            if state.fire_pending && !state.queue.is_empty() {
                state.fire_pending = false;
                state.commit_in_flight = true;
                state.queue.pop_front()
            } else {
                state.fire_pending = false;
                // frames sealed by the capacity roll are still queued; give
                // them their own quiet window
                if !state.queue.is_empty() && state.countdown.is_none() {
                    let (countdown, done) = Countdown::start(inner.window);
                    state.countdown = Some(countdown);
                    spawn_fire_watch(Arc::clone(&inner), done);
                }
                None
            }
        };
    }
}

async fn commit_frame(inner: &BatchSyncInner, frame: SyncFrame) {
    let SyncFrame {
        operations,
        resolvers,
        operation_count,
        ..
    } = frame;

    debug!(operations = operation_count, "committing batch frame");
    let outcome = match inner.committer.commit(operations).await {
        Ok(()) => Ok(()),
        Err(error) => {
            warn!(%error, "batch frame commit failed");
            Err(BatchCommitError::new(error.message()))
        }
    };

    for resolver in resolvers {
        let _ = resolver.send(outcome.clone());
    }
}
