//! Integration tests for the debounced batch sync: coalescing, the frame
//! capacity cap, uniform settlement and in-flight accumulation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::yield_now;
use tokio::time::{advance, sleep};

use storemux::{BatchCommitter, BatchSync, StoreError, SyncOperation};

/// Records every commit; optionally fails or stalls.
struct RecordingCommitter {
    commits: Mutex<Vec<Vec<SyncOperation>>>,
    fail: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingCommitter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            commits: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            delay: None,
        })
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            commits: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            delay: Some(delay),
        })
    }

    fn commit_sizes(&self) -> Vec<usize> {
        self.commits.lock().iter().map(|ops| ops.len()).collect()
    }
}

#[async_trait]
impl BatchCommitter for RecordingCommitter {
    async fn commit(&self, operations: Vec<SyncOperation>) -> Result<(), StoreError> {
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        self.commits.lock().push(operations);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::new("emulated commit failure"));
        }
        Ok(())
    }
}

/// Let spawned enqueue tasks and the countdown task make progress
async fn settle() {
    for _ in 0..50 {
        yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_spaced_enqueues_coalesce_into_one_commit() {
    let committer = RecordingCommitter::new();
    let sync = BatchSync::with_debounce(committer.clone(), Duration::from_millis(200));

    // 5 operations spaced 10ms apart, all within the 200ms window
    let mut outcomes = Vec::new();
    for i in 0..5 {
        let sync = sync.clone();
        outcomes.push(tokio::spawn(async move {
            sync.enqueue(SyncOperation::set(
                format!("pokedex/{}", i),
                json!({ "n": i }),
            ))
            .await
        }));
        settle().await;
        advance(Duration::from_millis(10)).await;
        settle().await;
    }

    for outcome in outcomes {
        assert!(outcome.await.unwrap().is_ok());
    }
    assert_eq!(committer.commit_sizes(), vec![5]);
}

#[tokio::test(start_paused = true)]
async fn test_frame_cap_yields_two_commits_for_501_operations() {
    let committer = RecordingCommitter::new();
    let sync = BatchSync::with_debounce(committer.clone(), Duration::from_millis(200));

    let outcomes: Vec<_> = (0..501)
        .map(|i| {
            let sync = sync.clone();
            tokio::spawn(async move {
                sync.enqueue(SyncOperation::update(
                    format!("pokedex/{}", i),
                    json!({ "n": i }),
                ))
                .await
            })
        })
        .collect();

    for outcome in futures::future::join_all(outcomes).await {
        assert!(outcome.unwrap().is_ok());
    }
    assert_eq!(committer.commit_sizes(), vec![500, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_commit_failure_rejects_every_operation_uniformly() {
    let committer = RecordingCommitter::new();
    committer.fail.store(true, Ordering::SeqCst);
    let sync = BatchSync::with_debounce(committer.clone(), Duration::from_millis(50));

    let mut outcomes = Vec::new();
    for i in 0..3 {
        let sync = sync.clone();
        outcomes.push(tokio::spawn(async move {
            sync.enqueue(SyncOperation::delete(format!("pokedex/{}", i)))
                .await
        }));
    }

    let mut reasons = Vec::new();
    for outcome in outcomes {
        let err = outcome.await.unwrap().unwrap_err();
        reasons.push(err.reason);
    }
    assert_eq!(reasons.len(), 3);
    assert!(reasons.iter().all(|reason| reason == &reasons[0]));
    assert_eq!(committer.commit_sizes(), vec![3]);
}

#[tokio::test(start_paused = true)]
async fn test_per_call_debounce_override_shrinks_the_window() {
    let committer = RecordingCommitter::new();
    // a default window far larger than the test advances
    let sync = BatchSync::with_debounce(committer.clone(), Duration::from_secs(600));

    let handle = {
        let sync = sync.clone();
        tokio::spawn(async move {
            sync.enqueue_with(
                SyncOperation::set("pokedex/001", json!({"name": "Bulbasaur"})),
                Some(Duration::from_millis(50)),
            )
            .await
        })
    };
    settle().await;
    advance(Duration::from_millis(51)).await;
    settle().await;

    assert_eq!(committer.commit_sizes(), vec![1]);
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_enqueues_during_commit_accumulate_into_next_frame() {
    let committer = RecordingCommitter::with_delay(Duration::from_millis(100));
    let sync = BatchSync::with_debounce(committer.clone(), Duration::from_millis(50));

    let first = {
        let sync = sync.clone();
        tokio::spawn(async move {
            sync.enqueue(SyncOperation::set("pokedex/001", json!({"a": 1})))
                .await
        })
    };
    settle().await;
    // fire the countdown; the commit is now in flight for 100ms
    advance(Duration::from_millis(51)).await;
    settle().await;

    // enqueue while the commit is in flight: lands in the next frame
    let second = {
        let sync = sync.clone();
        tokio::spawn(async move {
            sync.enqueue(SyncOperation::set("pokedex/002", json!({"b": 2})))
                .await
        })
    };
    settle().await;

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(committer.commit_sizes(), vec![1, 1]);
}
