//! Data types for StoreMux
//!
//! This module contains the core data structures shared across the crate.

mod action;
mod clauses;
mod doc;
mod path;

pub use action::{ActionName, ActionType};
pub use clauses::{Direction, OrderByClause, QueryClauses, WhereClause, WhereOp};
pub use doc::{DocRecord, StreamEvent, StreamEventKind, StreamMessage};
pub use path::ModulePath;
