use std::sync::Arc;

use anyhow::{Context, Result};
use cagestats_storage::{latest_event, DocumentStore, HttpFetcher, PageSource, PgDocumentStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::{RunMode, SyncConfig};
use crate::crawl::{CrawlState, Crawler};
use crate::enrich::{enrich_upcoming_fights, EnrichmentReport};
use crate::load::{BatchLoader, LoadReport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub fighters: usize,
    pub fights: usize,
    pub events: usize,
    pub upcoming_events: usize,
    pub upcoming_fights: usize,
}

impl RecordCounts {
    fn of(state: &CrawlState) -> Self {
        Self {
            fighters: state.fighters.len(),
            fights: state.fights.len(),
            events: state.events.len(),
            upcoming_events: state.upcoming_events.len(),
            upcoming_fights: state.upcoming_fights.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_fetched: usize,
    /// Completed events newer than the stored anchor; update runs only.
    pub new_events: usize,
    pub counts: RecordCounts,
    pub loads: Vec<LoadReport>,
    pub enrichment: EnrichmentReport,
}

impl SyncRunSummary {
    pub fn load_for(&self, collection: &str) -> Option<&LoadReport> {
        self.loads.iter().find(|l| l.collection == collection)
    }
}

/// Crawl, then load, then enrich. Nothing is written unless the crawl
/// completes.
pub struct SyncPipeline {
    config: SyncConfig,
    source: Arc<dyn PageSource>,
    store: Arc<dyn DocumentStore>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig, source: Arc<dyn PageSource>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    /// Live pipeline: HTTP fetcher plus a migrated Postgres store.
    pub async fn from_config(config: SyncConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.http_client_config())?;
        let store = PgDocumentStore::connect(&config.database_url)
            .await
            .context("connecting to postgres")?;
        store.migrate().await.context("running migrations")?;
        Ok(Self::new(config, Arc::new(fetcher), Arc::new(store)))
    }

    pub async fn run(&self, mode: RunMode) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id, %mode);
        self.run_inner(run_id, mode).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, mode: RunMode) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let mut crawler = Crawler::new(self.source.clone(), &self.config.base_url)?;
        let mut state = CrawlState::default();
        let mut new_events = 0;

        match mode {
            RunMode::Full => {
                crawler
                    .crawl_fighters(&mut state)
                    .await
                    .context("crawling fighters")?;
            }
            RunMode::Update => {
                let latest = latest_event(self.store.as_ref())
                    .await
                    .context("looking up latest stored event")?;
                new_events = crawler
                    .crawl_update(&mut state, latest.as_ref().map(|e| e.id.as_str()))
                    .await
                    .context("crawling new events")?;
            }
            RunMode::Upcoming => {}
        }
        crawler
            .crawl_upcoming(&mut state)
            .await
            .context("crawling upcoming events")?;

        let counts = RecordCounts::of(&state);
        info!(
            pages = state.pages_fetched,
            fighters = counts.fighters,
            fights = counts.fights,
            events = counts.events,
            upcoming_events = counts.upcoming_events,
            upcoming_fights = counts.upcoming_fights,
            "crawl finished"
        );

        let loader = BatchLoader::new(self.store.clone(), self.config.batch_size);
        let mut loads = vec![
            loader.load(&state.fighters).await?,
            loader.load(&state.events).await?,
            loader.load(&state.fights).await?,
            loader.load(&state.upcoming_events).await?,
        ];

        // Profiles must be stored before matchups can reference them.
        let enrichment = enrich_upcoming_fights(self.store.as_ref(), &mut state.upcoming_fights)
            .await
            .context("enriching upcoming fights")?;
        loads.push(loader.load(&state.upcoming_fights).await?);

        let finished_at = Utc::now();
        info!(
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "sync run finished"
        );
        Ok(SyncRunSummary {
            run_id,
            mode,
            started_at,
            finished_at,
            pages_fetched: state.pages_fetched,
            new_events,
            counts,
            loads,
            enrichment,
        })
    }
}

pub async fn run_sync_from_env(mode: RunMode) -> Result<SyncRunSummary> {
    let pipeline = SyncPipeline::from_config(SyncConfig::from_env()).await?;
    pipeline.run(mode).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cagestats_core::{Collection, Event, Fighter, FighterSnapshot, UpcomingFight};
    use cagestats_storage::{get_record, FetchError, MemoryDocumentStore};
    use chrono::NaiveDate;

    const BASE: &str = "http://ufcstats.com";

    /// Serves fixture files by exact URL and records every request.
    struct FixtureSite {
        pages: HashMap<String, &'static str>,
        requests: Mutex<Vec<(String, String)>>,
    }

    impl FixtureSite {
        fn new(pages: &[(&str, &'static str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(path, file)| (format!("{BASE}{path}"), *file))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn standard() -> Self {
            Self::new(&[
                ("/statistics/fighters?char=a&page=all", "fighters_a.html"),
                ("/fighter-details/abc123", "fighter_abc123.html"),
                ("/fighter-details/def456", "fighter_def456.html"),
                ("/fight-details/fgt001", "fight_fgt001.html"),
                ("/fight-details/upc777", "fight_upc777.html"),
                ("/event-details/evt100", "event_evt100.html"),
                ("/event-details/evt200", "event_evt200.html"),
                ("/statistics/events/completed?page=all", "events_completed.html"),
                ("/statistics/events/upcoming?page=all", "events_upcoming.html"),
                ("/event-details/upe001", "upcoming_event_upe001.html"),
            ])
        }

        fn requested(&self) -> Vec<(String, String)> {
            self.requests.lock().unwrap().clone()
        }

        fn times_requested(&self, path: &str) -> usize {
            let url = format!("{BASE}{path}");
            self.requested().iter().filter(|(u, _)| *u == url).count()
        }

        fn referer_of(&self, path: &str) -> Option<String> {
            let url = format!("{BASE}{path}");
            self.requested()
                .into_iter()
                .find(|(u, _)| *u == url)
                .map(|(_, referer)| referer)
        }
    }

    #[async_trait]
    impl PageSource for FixtureSite {
        async fn fetch_page(&self, url: &str, referer: &str) -> Result<String, FetchError> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), referer.to_string()));
            let file = match self.pages.get(url) {
                Some(file) => *file,
                None if url.contains("/statistics/fighters?char=") => "fighters_empty.html",
                None => {
                    return Err(FetchError::HttpStatus {
                        status: 404,
                        url: url.to_string(),
                    })
                }
            };
            let path = Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("../../fixtures/ufcstats")
                .join(file);
            Ok(std::fs::read_to_string(path).unwrap())
        }
    }

    fn pipeline(site: Arc<FixtureSite>, store: Arc<MemoryDocumentStore>) -> SyncPipeline {
        SyncPipeline::new(SyncConfig::default(), site, store)
    }

    async fn seed_event(store: &MemoryDocumentStore, id: &str, date: NaiveDate) {
        let event = Event {
            id: id.into(),
            name: format!("Stored {id}"),
            date,
            location: "Las Vegas, Nevada, USA".into(),
        };
        store
            .upsert_batch(
                Collection::Events,
                vec![(id.into(), serde_json::to_value(&event).unwrap())],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn full_run_stores_the_single_indexed_fighter_and_their_history() {
        let site = Arc::new(FixtureSite::standard());
        let store = Arc::new(MemoryDocumentStore::new());
        let summary = pipeline(site.clone(), store.clone())
            .run(RunMode::Full)
            .await
            .unwrap();

        assert_eq!(
            summary.counts,
            RecordCounts {
                fighters: 1,
                fights: 1,
                events: 1,
                upcoming_events: 1,
                upcoming_fights: 2,
            }
        );

        let fighter = get_record::<Fighter>(store.as_ref(), "abc123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fighter.name, "Jane Doe");
        assert_eq!(fighter.stance.as_deref(), Some("Orthodox"));
        assert_eq!(fighter.career_stats.slpm, 4.5);
        assert_eq!(store.count(Collection::Fighters).await.unwrap(), 1);
        assert_eq!(store.count(Collection::Fights).await.unwrap(), 1);
        assert!(store.get(Collection::Fights, "fgt001").await.unwrap().is_some());
        assert!(store.get(Collection::Events, "evt100").await.unwrap().is_some());

        // All 26 index letters are visited; empty letters yield nothing.
        let index_pages = site
            .requested()
            .iter()
            .filter(|(u, _)| u.contains("/statistics/fighters?char="))
            .count();
        assert_eq!(index_pages, 26);
        assert_eq!(summary.pages_fetched, site.requested().len());
    }

    #[tokio::test]
    async fn full_run_sends_the_linking_page_as_referer() {
        let site = Arc::new(FixtureSite::standard());
        let store = Arc::new(MemoryDocumentStore::new());
        pipeline(site.clone(), store).run(RunMode::Full).await.unwrap();

        assert_eq!(
            site.referer_of("/statistics/fighters?char=a&page=all").as_deref(),
            Some("http://ufcstats.com/statistics/fighters")
        );
        assert_eq!(
            site.referer_of("/fighter-details/abc123").as_deref(),
            Some("http://ufcstats.com/statistics/fighters?char=a&page=all")
        );
        assert_eq!(
            site.referer_of("/fight-details/fgt001").as_deref(),
            Some("http://ufcstats.com/fighter-details/abc123")
        );
        assert_eq!(
            site.referer_of("/event-details/evt100").as_deref(),
            Some("http://ufcstats.com/fight-details/fgt001")
        );
    }

    #[tokio::test]
    async fn matchups_get_stored_profiles_and_keep_stubs_otherwise() {
        let site = Arc::new(FixtureSite::standard());
        let store = Arc::new(MemoryDocumentStore::new());
        let summary = pipeline(site, store.clone()).run(RunMode::Full).await.unwrap();

        assert_eq!(
            summary.enrichment,
            EnrichmentReport {
                referenced: 4,
                resolved: 1,
                stubs_kept: 3,
            }
        );
        let upc778 = get_record::<UpcomingFight>(store.as_ref(), "upc778")
            .await
            .unwrap()
            .unwrap();
        assert!(upc778.participants[0].is_profile());
        assert_eq!(upc778.participants[0].name(), "Jane Doe");
        assert_eq!(upc778.participants[1], FighterSnapshot::stub("lpk555", "Lina Park"));
    }

    #[tokio::test]
    async fn rerun_changes_no_cumulative_documents() {
        let site = Arc::new(FixtureSite::standard());
        let store = Arc::new(MemoryDocumentStore::new());
        let pipeline = pipeline(site, store.clone());
        pipeline.run(RunMode::Full).await.unwrap();
        let second = pipeline.run(RunMode::Full).await.unwrap();

        for collection in [Collection::Fighters, Collection::Events, Collection::Fights] {
            let report = second.load_for(collection.name()).unwrap();
            assert_eq!(report.changed, 0, "{}", collection.name());
        }
        // Upcoming collections are rebuilt from scratch on every run.
        let upcoming = second.load_for(Collection::UpcomingFights.name()).unwrap();
        assert_eq!((upcoming.cleared, upcoming.changed), (2, 2));
        assert_eq!(store.count(Collection::UpcomingFights).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upcoming_mode_touches_no_fighters_or_fights() {
        let site = Arc::new(FixtureSite::standard());
        let store = Arc::new(MemoryDocumentStore::new());
        let summary = pipeline(site.clone(), store.clone())
            .run(RunMode::Upcoming)
            .await
            .unwrap();

        assert!(site
            .requested()
            .iter()
            .all(|(u, _)| !u.contains("/fighter-details/") && !u.contains("/fight-details/")));
        assert_eq!((summary.counts.fighters, summary.counts.fights), (0, 0));
        assert_eq!(summary.new_events, 0);
        assert_eq!(store.count(Collection::Fighters).await.unwrap(), 0);
        assert_eq!(store.count(Collection::Fights).await.unwrap(), 0);
        assert_eq!(store.count(Collection::UpcomingEvents).await.unwrap(), 1);
        assert_eq!(store.count(Collection::UpcomingFights).await.unwrap(), 2);
        assert_eq!(summary.enrichment.resolved, 0);
    }

    #[tokio::test]
    async fn update_is_a_noop_when_latest_event_is_current() {
        let site = Arc::new(FixtureSite::standard());
        let store = Arc::new(MemoryDocumentStore::new());
        seed_event(&store, "evt200", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()).await;

        let summary = pipeline(site.clone(), store.clone())
            .run(RunMode::Update)
            .await
            .unwrap();

        assert_eq!(summary.new_events, 0);
        assert_eq!(summary.counts.fighters, 0);
        assert!(site
            .requested()
            .iter()
            .all(|(u, _)| !u.contains("/event-details/evt") && !u.contains("/fighter-details/")));
        assert_eq!(store.count(Collection::Events).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_rescrapes_both_corners_of_newer_events() {
        let site = Arc::new(FixtureSite::standard());
        let store = Arc::new(MemoryDocumentStore::new());
        seed_event(&store, "evt100", NaiveDate::from_ymd_opt(2024, 4, 13).unwrap()).await;

        let summary = pipeline(site.clone(), store.clone())
            .run(RunMode::Update)
            .await
            .unwrap();

        assert_eq!(summary.new_events, 1);
        assert_eq!(summary.counts.fighters, 2);
        assert_eq!(site.times_requested("/event-details/evt200"), 1);
        assert_eq!(site.times_requested("/fighter-details/abc123"), 1);
        assert_eq!(site.times_requested("/fighter-details/def456"), 1);
        // Shared bout fetched once; the matchup link is recognised and dropped.
        assert_eq!(site.times_requested("/fight-details/fgt001"), 1);
        assert_eq!(site.times_requested("/fight-details/upc777"), 1);
        assert_eq!(
            site.referer_of("/fighter-details/abc123").as_deref(),
            Some("http://ufcstats.com/event-details/evt200")
        );

        let event = get_record::<Event>(store.as_ref(), "evt200")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.name, "UFC 305: Doe vs. Roe 2");
        assert!(store.get(Collection::Fights, "upc777").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_without_stored_events_only_refreshes_upcoming() {
        let site = Arc::new(FixtureSite::standard());
        let store = Arc::new(MemoryDocumentStore::new());
        let summary = pipeline(site.clone(), store).run(RunMode::Update).await.unwrap();

        assert_eq!(summary.new_events, 0);
        assert_eq!(site.times_requested("/statistics/events/completed?page=all"), 0);
        assert_eq!(summary.counts.upcoming_events, 1);
    }

    #[tokio::test]
    async fn transport_error_aborts_before_anything_is_written() {
        let site = Arc::new(FixtureSite::new(&[
            ("/statistics/fighters?char=a&page=all", "fighters_a.html"),
            ("/fighter-details/abc123", "fighter_abc123.html"),
        ]));
        let store = Arc::new(MemoryDocumentStore::new());
        let err = pipeline(site, store.clone()).run(RunMode::Full).await.unwrap_err();

        assert!(format!("{err:#}").contains("fight-details/fgt001"));
        assert_eq!(store.count(Collection::Fighters).await.unwrap(), 0);
        assert_eq!(store.count(Collection::Fights).await.unwrap(), 0);
    }
}
