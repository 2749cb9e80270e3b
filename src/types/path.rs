//! Module paths: a collection path plus optional document id

use serde::{Deserialize, Serialize};

/// Identifies the logical target of an action: a collection, or a single
/// document inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModulePath {
    pub collection_path: String,
    pub doc_id: Option<String>,
}

impl ModulePath {
    /// Path targeting a whole collection
    pub fn collection<S: Into<String>>(collection_path: S) -> Self {
        Self {
            collection_path: collection_path.into(),
            doc_id: None,
        }
    }

    /// Path targeting a single document
    pub fn doc<S: Into<String>, D: Into<String>>(collection_path: S, doc_id: D) -> Self {
        Self {
            collection_path: collection_path.into(),
            doc_id: Some(doc_id.into()),
        }
    }

    /// Parse a full path like `"pokedex/001"` into collection path + doc id.
    ///
    /// The final segment becomes the doc id; everything before it is the
    /// collection path. A path without `/` is a collection path.
    pub fn parse(full_path: &str) -> Self {
        match full_path.rfind('/') {
            Some(idx) => Self::doc(&full_path[..idx], &full_path[idx + 1..]),
            None => Self::collection(full_path),
        }
    }

    pub fn is_doc(&self) -> bool {
        self.doc_id.is_some()
    }

    /// Replace the doc id, e.g. once an insert has generated one
    pub fn with_doc_id<D: Into<String>>(&self, doc_id: D) -> Self {
        Self {
            collection_path: self.collection_path.clone(),
            doc_id: Some(doc_id.into()),
        }
    }

    /// The full slash-joined path
    pub fn full_path(&self) -> String {
        match &self.doc_id {
            Some(id) => format!("{}/{}", self.collection_path, id),
            None => self.collection_path.clone(),
        }
    }
}

impl std::fmt::Display for ModulePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_path())
    }
}
