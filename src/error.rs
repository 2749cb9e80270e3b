//! Error taxonomy for the orchestration engine
//!
//! Hooks are the channel for per-store partial-failure detail; the value
//! returned from an action carries only the single final outcome.

use crate::types::ActionName;

/// Result type for orchestration operations
pub type MuxResult<T> = Result<T, MuxError>;

/// A failure reported by a store driver.
///
/// Drivers own their wire protocols, so the core treats driver failures as
/// opaque messages.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(String);

impl StoreError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// A batch frame's atomic commit failed; every operation queued in that frame
/// receives the same error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("batch commit failed: {reason}")]
pub struct BatchCommitError {
    pub reason: String,
}

impl BatchCommitError {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by module actions
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The resolved execution order names a store that was never registered
    #[error("unknown store '{store}' in execution order for action '{action}'")]
    UnknownStore { store: String, action: ActionName },

    /// A document-scoped action was invoked without a document id
    #[error("action '{action}' requires a document id")]
    MissingDocId { action: ActionName },

    /// A doc handle was requested for a path without a document segment
    #[error("'{path}' is not a document path (expected 'collection/docId')")]
    InvalidDocPath { path: String },

    /// A store driver call rejected
    #[error("store '{store}' failed during '{action}': {source}")]
    StoreAction {
        store: String,
        action: ActionName,
        #[source]
        source: StoreError,
    },

    /// A compensating revert call itself rejected. Reported through hooks;
    /// never replaces the original triggering error.
    #[error("revert of '{action}' failed on store '{store}': {source}")]
    Revert {
        store: String,
        action: ActionName,
        #[source]
        source: StoreError,
    },

    /// Opening a stream on one store failed
    #[error("failed to open stream on store '{store}': {source}")]
    StreamOpen {
        store: String,
        #[source]
        source: StoreError,
    },

    /// A debounced batch frame's commit rejected
    #[error(transparent)]
    BatchCommit(#[from] BatchCommitError),
}
