use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use cagestats_core::Collection;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

use crate::store::{date_key, DocumentStore, Filter, FindQuery, SortOrder, StoreError};

/// In-process document store with the same query semantics as the
/// Postgres backend. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, JsonValue>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert_batch(
        &self,
        collection: Collection,
        docs: Vec<(String, JsonValue)>,
    ) -> Result<u64, StoreError> {
        let mut guard = self.collections.write().await;
        let docs_in = guard.entry(collection).or_default();
        let mut changed = 0;
        for (id, doc) in docs {
            if docs_in.get(&id) != Some(&doc) {
                changed += 1;
            }
            docs_in.insert(id, doc);
        }
        Ok(changed)
    }

    async fn clear(&self, collection: Collection) -> Result<u64, StoreError> {
        let mut guard = self.collections.write().await;
        Ok(guard
            .remove(&collection)
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<JsonValue>, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard.get(&collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn get_many(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> Result<Vec<JsonValue>, StoreError> {
        let guard = self.collections.read().await;
        let Some(docs) = guard.get(&collection) else {
            return Ok(Vec::new());
        };
        let mut wanted = ids.iter().collect::<Vec<_>>();
        wanted.sort();
        wanted.dedup();
        Ok(wanted
            .into_iter()
            .filter_map(|id| docs.get(id).cloned())
            .collect())
    }

    async fn find(
        &self,
        collection: Collection,
        query: &FindQuery,
    ) -> Result<Vec<JsonValue>, StoreError> {
        let guard = self.collections.read().await;
        let Some(docs) = guard.get(&collection) else {
            return Ok(Vec::new());
        };

        let mut hits = docs
            .iter()
            .filter(|(id, _)| {
                query
                    .after
                    .as_deref()
                    .map_or(true, |after| id.as_str() > after)
            })
            .filter(|(_, doc)| query.filters.iter().all(|f| matches_filter(doc, f)))
            .collect::<Vec<_>>();

        if query.order == SortOrder::DateDescending {
            hits.sort_by(|(a_id, a), (b_id, b)| {
                let a_date = a.get("date").and_then(JsonValue::as_str).unwrap_or("");
                let b_date = b.get("date").and_then(JsonValue::as_str).unwrap_or("");
                b_date.cmp(a_date).then_with(|| a_id.cmp(b_id))
            });
        }

        let limit = if query.limit == 0 { usize::MAX } else { query.limit };
        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard.get(&collection).map_or(0, |docs| docs.len() as u64))
    }
}

/// Walks a dotted path, unwrapping arrays at every step.
fn resolve<'a>(doc: &'a JsonValue, path: &str) -> Vec<&'a JsonValue> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            collect_field(value, segment, &mut next);
        }
        current = next;
    }
    current
        .into_iter()
        .flat_map(|v| match v {
            JsonValue::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

fn collect_field<'a>(value: &'a JsonValue, key: &str, out: &mut Vec<&'a JsonValue>) {
    match value {
        JsonValue::Object(map) => {
            if let Some(v) = map.get(key) {
                out.push(v);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect_field(item, key, out);
            }
        }
        _ => {}
    }
}

fn as_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn matches_filter(doc: &JsonValue, filter: &Filter) -> bool {
    match filter {
        Filter::Equals { path, value } => resolve(doc, path)
            .into_iter()
            .any(|v| as_text(v).as_deref() == Some(value.as_str())),
        Filter::Contains { paths, needle } => {
            let needle = needle.to_lowercase();
            paths.iter().any(|path| {
                resolve(doc, path)
                    .into_iter()
                    .filter_map(as_text)
                    .any(|text| text.to_lowercase().contains(&needle))
            })
        }
        Filter::AtLeast { path, value } => resolve(doc, path)
            .into_iter()
            .filter_map(JsonValue::as_f64)
            .any(|n| n >= *value),
        Filter::OnOrAfter { path, date } => {
            let key = date_key(*date);
            resolve(doc, path)
                .into_iter()
                .filter_map(JsonValue::as_str)
                .any(|d| d >= key.as_str())
        }
        Filter::OnOrBefore { path, date } => {
            let key = date_key(*date);
            resolve(doc, path)
                .into_iter()
                .filter_map(JsonValue::as_str)
                .any(|d| d <= key.as_str())
        }
    }
}
