//! Query clauses carried to store drivers
//!
//! The orchestration core never evaluates clauses itself; they are passed
//! through to each driver opaquely and folded into stream signatures so that
//! two subscriptions over the same query share one stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator for a `where` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhereOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "array-contains")]
    ArrayContains,
}

impl WhereOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhereOp::Eq => "==",
            WhereOp::Ne => "!=",
            WhereOp::Lt => "<",
            WhereOp::Le => "<=",
            WhereOp::Gt => ">",
            WhereOp::Ge => ">=",
            WhereOp::In => "in",
            WhereOp::ArrayContains => "array-contains",
        }
    }
}

/// A single `where` filter clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    pub field: String,
    pub op: WhereOp,
    pub value: Value,
}

impl WhereClause {
    pub fn new<F: Into<String>>(field: F, op: WhereOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }
}

/// Sort direction for an `order by` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// A single `order by` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByClause {
    pub field: String,
    pub direction: Direction,
}

impl OrderByClause {
    pub fn new<F: Into<String>>(field: F, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// The full clause set for a read action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryClauses {
    #[serde(default)]
    pub where_clauses: Vec<WhereClause>,
    #[serde(default)]
    pub order_by: Vec<OrderByClause>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueryClauses {
    pub fn is_empty(&self) -> bool {
        self.where_clauses.is_empty() && self.order_by.is_empty() && self.limit.is_none()
    }

    pub fn filter<F: Into<String>>(mut self, field: F, op: WhereOp, value: Value) -> Self {
        self.where_clauses.push(WhereClause::new(field, op, value));
        self
    }

    pub fn order<F: Into<String>>(mut self, field: F, direction: Direction) -> Self {
        self.order_by.push(OrderByClause::new(field, direction));
        self
    }

    pub fn take(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
