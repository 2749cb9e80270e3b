//! Canonical stream signatures
//!
//! Two `stream()` calls over the same module path and clause set must share
//! one subscription. The signature is a deterministic rendering of the path
//! plus the ordered clauses.

use crate::types::{Direction, ModulePath, QueryClauses};

pub fn stream_signature(path: &ModulePath, clauses: &QueryClauses) -> String {
    let mut signature = path.full_path();
    signature.push('?');

    for clause in &clauses.where_clauses {
        signature.push_str("where:");
        signature.push_str(&clause.field);
        signature.push_str(clause.op.as_str());
        signature.push_str(&clause.value.to_string());
        signature.push(';');
    }
    for clause in &clauses.order_by {
        signature.push_str("orderBy:");
        signature.push_str(&clause.field);
        signature.push(':');
        signature.push_str(match clause.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        });
        signature.push(';');
    }
    if let Some(limit) = clauses.limit {
        signature.push_str("limit:");
        signature.push_str(&limit.to_string());
    }

    signature
}
