//! StoreMux — cross-store data action orchestration
//!
//! Coordinates a single logical data action (create, modify, delete, read,
//! or subscribe) across multiple heterogeneous backing stores attached to
//! the same logical document or collection — typically one fast local cache
//! and one or more slower, possibly unreliable remote backends.
//!
//! # Features
//!
//! - **Deterministic execution order**: stores run strictly in sequence;
//!   later stores can rely on state an earlier one produced (a generated id)
//! - **Failure policies**: stop, continue, or revert with compensating
//!   rollback in reverse execution order
//! - **Cascading configuration**: global < module < per-action, with
//!   accumulating lifecycle hooks and non-chaining payload transforms
//! - **Shared subscriptions**: streams are keyed by a canonical query
//!   signature; opening the same query twice joins the existing stream
//! - **Debounced batch sync**: remote drivers coalesce bursts of writes
//!   into few atomic multi-operation commits
//!
//! # Modules
//!
//! - `types`: action names, module paths, document records, query clauses
//! - `config`: the three configuration levels and their resolution
//! - `store`: the `StoreDriver` trait every backing store implements
//! - `module`: the instance plus collection/doc handles
//! - `stream`: the stream coordinator and signatures
//! - `batch`: the debounced batch-sync queue for remote drivers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use storemux::{GlobalConfig, StoreKind, StoreMux, StoreRegistry};
//! # use storemux::StoreDriver;
//! # async fn demo(cache: Arc<dyn StoreDriver>, api: Arc<dyn StoreDriver>) -> storemux::MuxResult<()> {
//! let mut registry = StoreRegistry::new();
//! registry
//!     .register("local", StoreKind::Local, cache)
//!     .register("remote", StoreKind::Remote, api);
//! let mux = StoreMux::new(GlobalConfig::new().local_store_name("local"), registry);
//!
//! let pokedex = mux.collection("pokedex");
//! let pikachu = pokedex.insert(json!({ "name": "Pikachu" }), None).await?;
//! pikachu.merge(json!({ "level": 16 }), None).await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod module;
pub mod store;
pub mod stream;
pub mod types;

mod dispatch;

// Re-export commonly used items at crate root
pub use batch::{BatchCommitter, BatchSync, Countdown, SyncKind, SyncOperation};
pub use config::{
    ActionConfig, EffectiveConfig, ErrorPolicy, GlobalConfig, HookContext, ModuleConfig, OrderKey,
    SharedConfig,
};
pub use error::{BatchCommitError, MuxError, MuxResult, StoreError};
pub use module::{Collection, Doc, StoreMux};
pub use store::{
    FetchResponse, StoreDriver, StoreKind, StoreModuleConfig, StoreRegistry, StoreResult,
    StoreStream, StreamEventSender,
};
pub use stream::{StreamHandle, StreamState};
pub use types::{
    ActionName, ActionType, Direction, DocRecord, ModulePath, OrderByClause, QueryClauses,
    StreamEvent, StreamEventKind, StreamMessage, WhereClause, WhereOp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
