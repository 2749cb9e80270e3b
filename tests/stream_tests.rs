//! Integration tests for the stream coordinator: shared subscriptions,
//! idempotent close, late-event discard and open-failure semantics.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::time::sleep;

use common::{new_journal, MockStore};
use storemux::{
    ActionName, ActionType, DocRecord, GlobalConfig, MuxError, SharedConfig, StoreKind, StoreMux,
    StoreRegistry, StreamEvent, StreamEventKind, StreamMessage, StreamState,
};

struct Setup {
    mux: StoreMux,
    local: Arc<MockStore>,
    remote: Arc<MockStore>,
}

fn setup_with_config(global: SharedConfig) -> Setup {
    let journal = new_journal();
    let local = MockStore::new("local", journal.clone());
    let remote = MockStore::new("remote", journal);

    let mut registry = StoreRegistry::new();
    registry
        .register("local", StoreKind::Local, local.clone())
        .register("remote", StoreKind::Remote, remote.clone());

    let mux = StoreMux::new(
        GlobalConfig::new().local_store_name("local").config(global),
        registry,
    );
    Setup { mux, local, remote }
}

fn setup() -> Setup {
    setup_with_config(SharedConfig::new())
}

/// Let the pump tasks drain their channels
async fn settle() {
    sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_stream_events_reach_the_data_map() {
    let s = setup();
    let pokedex = s.mux.collection("pokedex");

    pokedex.stream(None, None, None).await.unwrap();
    s.remote.push_stream_message(StreamMessage::Event(StreamEvent::added(
        DocRecord::existing("001", json!({"name": "Bulbasaur"})),
    )));
    s.remote.push_stream_message(StreamMessage::Event(StreamEvent::modified(
        DocRecord::existing("001", json!({"name": "Bulbasaur", "hp": 45})),
    )));
    settle().await;

    assert_eq!(
        pokedex.doc_data("001"),
        Some(json!({"name": "Bulbasaur", "hp": 45}))
    );

    s.remote
        .push_stream_message(StreamMessage::Event(StreamEvent::removed("001")));
    settle().await;
    assert!(pokedex.doc_data("001").is_none());
}

#[tokio::test]
async fn test_second_stream_with_same_signature_joins_existing() {
    let s = setup();
    let pokedex = s.mux.collection("pokedex");

    let first = pokedex.stream(None, None, None).await.unwrap();
    let second = pokedex.stream(None, None, None).await.unwrap();

    assert_eq!(first.signature(), second.signature());
    // each store was only asked to open one stream
    assert_eq!(s.local.stream_calls.load(Ordering::SeqCst), 1);
    assert_eq!(s.remote.stream_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_stream_is_idempotent() {
    let s = setup();
    let pokedex = s.mux.collection("pokedex");

    let handle = pokedex.stream(None, None, None).await.unwrap();
    assert_eq!(handle.state(), StreamState::Open);

    assert!(pokedex.close_stream(None));
    assert!(!pokedex.close_stream(None));

    // each store's stop ran exactly once
    assert_eq!(s.local.stop_calls.load(Ordering::SeqCst), 1);
    assert_eq!(s.remote.stop_calls.load(Ordering::SeqCst), 1);
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_events_after_close_are_discarded() {
    let s = setup();
    let pokedex = s.mux.collection("pokedex");

    pokedex.stream(None, None, None).await.unwrap();
    s.local.push_stream_message(StreamMessage::Event(StreamEvent::added(
        DocRecord::existing("001", json!({"name": "Bulbasaur"})),
    )));
    settle().await;
    assert!(pokedex.doc_data("001").is_some());

    pokedex.close_stream(None);

    // delivered after close: must not change the data map
    s.local.push_stream_message(StreamMessage::Event(StreamEvent::added(
        DocRecord::existing("002", json!({"name": "Ivysaur"})),
    )));
    settle().await;
    assert!(pokedex.doc_data("002").is_none());
}

#[tokio::test]
async fn test_find_stream_returns_open_handle_until_closed() {
    let s = setup();
    let pokedex = s.mux.collection("pokedex");

    assert!(pokedex.find_stream(None).is_none());

    let handle = pokedex.stream(None, None, None).await.unwrap();
    let found = pokedex.find_stream(None).expect("stream is open");
    assert_eq!(found.signature(), handle.signature());

    pokedex.close_stream(None);
    assert!(pokedex.find_stream(None).is_none());
}

#[tokio::test]
async fn test_stream_open_failure_rejects_but_keeps_opened_stores() {
    let s = setup();
    s.remote.fail_on(ActionName::Stream);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = errors.clone();
    let action_config = SharedConfig::new().on_action_error(move |ctx, error| {
        seen.lock().push((ctx.store.clone(), error.to_string()));
    });

    let pokedex = s.mux.collection("pokedex");
    let err = pokedex
        .stream(None, None, Some(action_config))
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        MuxError::StreamOpen { store, .. } if store == "remote"
    ));
    {
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "remote");
    }

    // the local stream opened and was not retroactively stopped
    assert_eq!(s.local.stream_calls.load(Ordering::SeqCst), 1);
    assert_eq!(s.local.stop_calls.load(Ordering::SeqCst), 0);

    // its events still flow until the subscription is closed explicitly
    s.local.push_stream_message(StreamMessage::Event(StreamEvent::added(
        DocRecord::existing("001", json!({"name": "Bulbasaur"})),
    )));
    settle().await;
    assert!(pokedex.doc_data("001").is_some());

    assert!(pokedex.close_stream(None));
    assert_eq!(s.local.stop_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stream_payload_transform_and_before_hooks() {
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let seen = payloads.clone();
    let global = SharedConfig::new()
        .modify_payload_on(ActionType::Read, |mut payload| {
            payload["auth"] = json!("Bearer 123123");
            payload
        })
        .on_before(move |ctx| {
            seen.lock().push(ctx.payload.clone());
        });
    let s = setup_with_config(global);

    let pokedex = s.mux.collection("pokedex");
    pokedex.stream(Some(json!({})), None, None).await.unwrap();

    let payloads = payloads.lock();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0], Some(json!({"auth": "Bearer 123123"})));
}

#[tokio::test]
async fn test_stream_read_response_transform_applies_per_event_kind() {
    let global = SharedConfig::new().modify_read_response_on(StreamEventKind::Added, |mut doc| {
        doc["seen"] = json!(true);
        doc
    });
    let s = setup_with_config(global);

    let pokedex = s.mux.collection("pokedex");
    pokedex.stream(None, None, None).await.unwrap();

    s.remote.push_stream_message(StreamMessage::Event(StreamEvent::added(
        DocRecord::existing("002", json!({"name": "Ivysaur"})),
    )));
    settle().await;

    assert_eq!(
        pokedex.doc_data("002"),
        Some(json!({"name": "Ivysaur", "seen": true}))
    );
}

#[tokio::test]
async fn test_doc_and_collection_streams_are_distinct() {
    let s = setup();
    let pokedex = s.mux.collection("pokedex");
    let doc = pokedex.doc("001");

    let collection_stream = pokedex.stream(None, None, None).await.unwrap();
    let doc_stream = doc.stream(None, None).await.unwrap();

    assert_ne!(collection_stream.signature(), doc_stream.signature());
    assert_eq!(s.local.stream_calls.load(Ordering::SeqCst), 2);

    assert!(doc.close_stream());
    assert!(pokedex.close_stream(None));
}

#[tokio::test]
async fn test_close_all_streams() {
    let s = setup();
    let pokedex = s.mux.collection("pokedex");
    let trainers = s.mux.collection("trainers");

    pokedex.stream(None, None, None).await.unwrap();
    trainers.stream(None, None, None).await.unwrap();

    s.mux.close_all_streams();

    assert_eq!(s.local.stop_calls.load(Ordering::SeqCst), 2);
    assert!(pokedex.find_stream(None).is_none());
    assert!(trainers.find_stream(None).is_none());
}
