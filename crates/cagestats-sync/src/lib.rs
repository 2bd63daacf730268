//! Scrape-and-load pipeline: crawls the stats site, upserts what it finds,
//! then links upcoming matchups to stored fighter profiles.

mod config;
mod crawl;
mod enrich;
mod load;
mod pipeline;

pub use config::{RunMode, SyncConfig, DEFAULT_BATCH_SIZE};
pub use crawl::{CrawlError, CrawlState, Crawler};
pub use enrich::{enrich_upcoming_fights, EnrichmentReport};
pub use load::{BatchLoader, LoadError, LoadReport};
pub use pipeline::{run_sync_from_env, RecordCounts, SyncPipeline, SyncRunSummary};

pub const CRATE_NAME: &str = "cagestats-sync";
