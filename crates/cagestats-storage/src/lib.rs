//! Page fetching + document storage for cagestats.

mod fetch;
mod memory;
mod postgres;
mod store;

pub use fetch::{FetchError, HttpClientConfig, HttpFetcher, PageSource, DEFAULT_USER_AGENT};
pub use memory::MemoryDocumentStore;
pub use postgres::{PgDocumentStore, DEFAULT_DATABASE_URL};
pub use store::{
    find_records, get_record, get_records, latest_event, DocumentStore, Filter, FindQuery,
    SortOrder, StoreError,
};

pub const CRATE_NAME: &str = "cagestats-storage";
