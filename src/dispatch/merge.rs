//! Result/data merger for one-shot reads
//!
//! Folds the per-store fetch results into the module's shared data map:
//! later stores overwrite earlier ones for the same id, records that no
//! longer exist remove the id. Returns a snapshot restricted to the ids
//! touched by this call, while the shared map accumulates across calls.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use serde_json::Value;

use crate::config::ReadResponseTransform;
use crate::types::DocRecord;

pub(crate) fn merge_fetch_results(
    data: &RwLock<BTreeMap<String, Value>>,
    per_store_docs: Vec<Vec<DocRecord>>,
    added_transform: Option<&ReadResponseTransform>,
) -> BTreeMap<String, Value> {
    let mut touched = BTreeSet::new();

    // fold under the lock as one uninterrupted step
    {
        let mut map = data.write();
        for docs in per_store_docs {
            for record in docs {
                touched.insert(record.id.clone());
                if record.exists {
                    let doc = match added_transform {
                        Some(transform) => transform(record.data),
                        None => record.data,
                    };
                    map.insert(record.id, doc);
                } else {
                    map.remove(&record.id);
                }
            }
        }
    }

    let map = data.read();
    touched
        .into_iter()
        .filter_map(|id| map.get(&id).cloned().map(|doc| (id, doc)))
        .collect()
}
