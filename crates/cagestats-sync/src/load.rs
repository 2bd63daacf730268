use std::sync::Arc;

use cagestats_core::{Document, RecordMap};
use cagestats_storage::{DocumentStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("clearing {collection} failed: {source}")]
    Clear {
        collection: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("serializing {collection}/{id} failed: {source}")]
    Serialize {
        collection: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("batch {batch} of {collection} failed ({committed} batches already committed): {source}")]
    Batch {
        collection: &'static str,
        batch: usize,
        committed: usize,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub collection: &'static str,
    /// Documents removed before loading; only volatile collections are cleared.
    pub cleared: u64,
    pub submitted: usize,
    /// Documents created or changed by the upserts.
    pub changed: u64,
    pub batches: usize,
}

/// Upserts a run's records into their collection in bounded batches.
pub struct BatchLoader {
    store: Arc<dyn DocumentStore>,
    batch_size: usize,
}

impl BatchLoader {
    pub fn new(store: Arc<dyn DocumentStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Loads `records` in insertion order, replacing stored documents whole.
    ///
    /// Volatile collections are emptied first, even when `records` is empty.
    /// A failed batch stops the load; earlier batches stay committed.
    pub async fn load<T: Document>(&self, records: &RecordMap<T>) -> Result<LoadReport, LoadError> {
        let collection = T::COLLECTION;
        let name = collection.name();
        let mut report = LoadReport {
            collection: name,
            cleared: 0,
            submitted: records.len(),
            changed: 0,
            batches: 0,
        };

        if collection.is_volatile() {
            report.cleared = self
                .store
                .clear(collection)
                .await
                .map_err(|source| LoadError::Clear {
                    collection: name,
                    source,
                })?;
            debug!(collection = name, cleared = report.cleared, "cleared volatile collection");
        }

        if records.is_empty() {
            info!(collection = name, "no records to load");
            return Ok(report);
        }

        let records = records.values().collect::<Vec<_>>();
        for (batch, chunk) in records.chunks(self.batch_size).enumerate() {
            let docs = chunk
                .iter()
                .map(|record| {
                    serde_json::to_value(record)
                        .map(|doc| (record.id().to_string(), doc))
                        .map_err(|source| LoadError::Serialize {
                            collection: name,
                            id: record.id().to_string(),
                            source,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let changed = self
                .store
                .upsert_batch(collection, docs)
                .await
                .map_err(|source| LoadError::Batch {
                    collection: name,
                    batch,
                    committed: batch,
                    source,
                })?;
            report.changed += changed;
            report.batches += 1;
            debug!(collection = name, batch, size = chunk.len(), changed, "committed batch");
        }

        info!(
            collection = name,
            submitted = report.submitted,
            changed = report.changed,
            batches = report.batches,
            "loaded collection"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cagestats_core::{Collection, Event, UpcomingEvent, UpcomingFight};
    use cagestats_storage::{FindQuery, MemoryDocumentStore};
    use chrono::NaiveDate;
    use serde_json::{json, Value as JsonValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(id: &str, day: u32) -> Event {
        Event {
            id: id.into(),
            name: format!("Event {id}"),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            location: "Las Vegas, Nevada, USA".into(),
        }
    }

    #[tokio::test]
    async fn empty_load_still_clears_upcoming_collections() {
        let store = Arc::new(MemoryDocumentStore::new());
        for collection in [Collection::UpcomingEvents, Collection::UpcomingFights] {
            store
                .upsert_batch(collection, vec![("stale".into(), json!({"id": "stale"}))])
                .await
                .unwrap();
        }

        let loader = BatchLoader::new(store.clone(), 1000);
        let events = loader.load(&RecordMap::<UpcomingEvent>::new()).await.unwrap();
        let fights = loader.load(&RecordMap::<UpcomingFight>::new()).await.unwrap();

        assert_eq!((events.cleared, events.batches), (1, 0));
        assert_eq!((fights.cleared, fights.batches), (1, 0));
        assert_eq!(store.count(Collection::UpcomingEvents).await.unwrap(), 0);
        assert_eq!(store.count(Collection::UpcomingFights).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cumulative_collections_are_never_cleared() {
        let store = Arc::new(MemoryDocumentStore::new());
        let loader = BatchLoader::new(store.clone(), 1000);
        loader
            .load(&[event("e1", 1)].into_iter().collect::<RecordMap<_>>())
            .await
            .unwrap();
        let report = loader
            .load(&[event("e2", 2)].into_iter().collect::<RecordMap<_>>())
            .await
            .unwrap();

        assert_eq!(report.cleared, 0);
        assert_eq!(store.count(Collection::Events).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn batches_are_bounded_and_reloads_change_nothing() {
        let store = Arc::new(MemoryDocumentStore::new());
        let loader = BatchLoader::new(store.clone(), 2);
        let events = (1..=5)
            .map(|d| event(&format!("e{d}"), d))
            .collect::<RecordMap<_>>();

        let first = loader.load(&events).await.unwrap();
        assert_eq!((first.submitted, first.batches, first.changed), (5, 3, 5));

        let second = loader.load(&events).await.unwrap();
        assert_eq!(second.changed, 0);
        let stored = store
            .find(Collection::Events, &FindQuery::new(0))
            .await
            .unwrap();
        assert_eq!(stored.len(), 5);
    }

    /// Accepts the first `ok_batches` upserts, then fails.
    struct FlakyStore {
        inner: MemoryDocumentStore,
        ok_batches: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn upsert_batch(
            &self,
            collection: Collection,
            docs: Vec<(String, JsonValue)>,
        ) -> Result<u64, StoreError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_batches {
                return Err(StoreError::Backend("connection reset".into()));
            }
            self.inner.upsert_batch(collection, docs).await
        }

        async fn clear(&self, collection: Collection) -> Result<u64, StoreError> {
            self.inner.clear(collection).await
        }

        async fn get(
            &self,
            collection: Collection,
            id: &str,
        ) -> Result<Option<JsonValue>, StoreError> {
            self.inner.get(collection, id).await
        }

        async fn get_many(
            &self,
            collection: Collection,
            ids: &[String],
        ) -> Result<Vec<JsonValue>, StoreError> {
            self.inner.get_many(collection, ids).await
        }

        async fn find(
            &self,
            collection: Collection,
            query: &FindQuery,
        ) -> Result<Vec<JsonValue>, StoreError> {
            self.inner.find(collection, query).await
        }

        async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
            self.inner.count(collection).await
        }
    }

    #[tokio::test]
    async fn failed_batch_stops_the_load_without_rollback() {
        let store = Arc::new(FlakyStore {
            inner: MemoryDocumentStore::new(),
            ok_batches: 1,
            calls: AtomicUsize::new(0),
        });
        let loader = BatchLoader::new(store.clone(), 2);
        let events = (1..=5)
            .map(|d| event(&format!("e{d}"), d))
            .collect::<RecordMap<_>>();

        let err = loader.load(&events).await.unwrap_err();
        assert!(matches!(
            err,
            LoadError::Batch {
                collection: "events",
                batch: 1,
                ..
            }
        ));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.inner.count(Collection::Events).await.unwrap(), 2);
    }
}
