use async_trait::async_trait;
use cagestats_core::{Collection, Document, Event};
use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("document (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store rejected the operation: {0}")]
    Backend(String),
}

/// A predicate over a document field.
///
/// Paths are dotted field names; arrays along the path are unwrapped, so
/// `participants.fighter_id` matches when any participant matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equals { path: &'static str, value: String },
    /// Case-insensitive substring match on any of the paths.
    Contains {
        paths: Vec<&'static str>,
        needle: String,
    },
    AtLeast { path: &'static str, value: f64 },
    OnOrAfter { path: &'static str, date: NaiveDate },
    OnOrBefore { path: &'static str, date: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    IdAscending,
    /// Newest `date` first, ties broken by ascending id.
    DateDescending,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindQuery {
    pub filters: Vec<Filter>,
    /// Only ids strictly greater than this cursor.
    pub after: Option<String>,
    pub limit: usize,
    pub order: SortOrder,
}

impl FindQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn after(mut self, after: Option<String>) -> Self {
        self.after = after.filter(|a| !a.is_empty());
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}

pub(crate) fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Id-keyed JSON document collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert-or-replace each `(id, doc)`. Returns how many stored documents
    /// were created or actually changed.
    async fn upsert_batch(
        &self,
        collection: Collection,
        docs: Vec<(String, JsonValue)>,
    ) -> Result<u64, StoreError>;

    /// Remove every document; returns the number removed.
    async fn clear(&self, collection: Collection) -> Result<u64, StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<JsonValue>, StoreError>;

    async fn get_many(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> Result<Vec<JsonValue>, StoreError>;

    async fn find(&self, collection: Collection, query: &FindQuery)
        -> Result<Vec<JsonValue>, StoreError>;

    async fn count(&self, collection: Collection) -> Result<u64, StoreError>;
}

pub async fn find_records<T: Document>(
    store: &dyn DocumentStore,
    query: &FindQuery,
) -> Result<Vec<T>, StoreError> {
    store
        .find(T::COLLECTION, query)
        .await?
        .into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
        .collect()
}

pub async fn get_record<T: Document>(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(T::COLLECTION, id).await? {
        Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
        None => Ok(None),
    }
}

pub async fn get_records<T: Document>(
    store: &dyn DocumentStore,
    ids: &[String],
) -> Result<Vec<T>, StoreError> {
    store
        .get_many(T::COLLECTION, ids)
        .await?
        .into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
        .collect()
}

/// The stored event with the greatest date, if any.
pub async fn latest_event(store: &dyn DocumentStore) -> Result<Option<Event>, StoreError> {
    let query = FindQuery::new(1).order(SortOrder::DateDescending);
    Ok(find_records::<Event>(store, &query).await?.into_iter().next())
}
