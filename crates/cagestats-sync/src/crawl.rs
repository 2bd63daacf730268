use std::collections::HashSet;
use std::sync::Arc;

use cagestats_core::{Event, Fight, Fighter, RecordMap, UpcomingEvent, UpcomingFight};
use cagestats_extract::{
    natural_id, parse_completed_events_index, parse_event_detail, parse_event_fight_card,
    parse_fight_detail, parse_fighter_index, parse_fighter_profile, parse_upcoming_event,
    parse_upcoming_events_index, ExtractError, FightPage, FighterLink,
};
use cagestats_storage::{FetchError, PageSource};
use scraper::Html;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid url {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("extracting {url} failed: {source}")]
    Extract {
        url: String,
        #[source]
        source: ExtractError,
    },
}

/// Records discovered during one run, keyed by natural id.
///
/// A later discovery of an id replaces the earlier record.
#[derive(Debug, Default)]
pub struct CrawlState {
    pub fighters: RecordMap<Fighter>,
    pub fights: RecordMap<Fight>,
    pub events: RecordMap<Event>,
    pub upcoming_events: RecordMap<UpcomingEvent>,
    pub upcoming_fights: RecordMap<UpcomingFight>,
    pub pages_fetched: usize,
}

/// Sequential traversal of the site's page hierarchy.
pub struct Crawler {
    source: Arc<dyn PageSource>,
    base: Url,
    /// Fight pages that turned out to be upcoming matchups.
    matchups_seen: HashSet<String>,
    /// Fighter profiles already visited by this crawler.
    profiles_seen: HashSet<String>,
}

impl Crawler {
    pub fn new(source: Arc<dyn PageSource>, base_url: &str) -> Result<Self, CrawlError> {
        let base = Url::parse(base_url).map_err(|source| CrawlError::Url {
            url: base_url.to_string(),
            source,
        })?;
        Ok(Self {
            source,
            base,
            matchups_seen: HashSet::new(),
            profiles_seen: HashSet::new(),
        })
    }

    fn resolve(&self, link: &str) -> Result<String, CrawlError> {
        self.base
            .join(link)
            .map(String::from)
            .map_err(|source| CrawlError::Url {
                url: link.to_string(),
                source,
            })
    }

    async fn fetch(
        &self,
        state: &mut CrawlState,
        url: &str,
        referer: &str,
    ) -> Result<String, CrawlError> {
        let body = self
            .source
            .fetch_page(url, referer)
            .await
            .map_err(|source| CrawlError::Fetch {
                url: url.to_string(),
                source,
            })?;
        state.pages_fetched += 1;
        Ok(body)
    }

    /// Fetches `url` and runs `extract` over the parsed document.
    async fn fetch_with<T>(
        &self,
        state: &mut CrawlState,
        url: &str,
        referer: &str,
        extract: impl FnOnce(&Html) -> Result<T, ExtractError>,
    ) -> Result<T, CrawlError> {
        let body = self.fetch(state, url, referer).await?;
        extract_from(url, &body, extract)
    }

    /// Full refresh: every fighter under every index letter, their fight
    /// histories, and each fight's event.
    pub async fn crawl_fighters(&mut self, state: &mut CrawlState) -> Result<(), CrawlError> {
        let referer = self.resolve("/statistics/fighters")?;
        for letter in 'a'..='z' {
            let index_url = self.resolve(&format!("/statistics/fighters?char={letter}&page=all"))?;
            let links = self
                .fetch_with(state, &index_url, &referer, parse_fighter_index)
                .await?;
            info!(%letter, fighters = links.len(), "scraping fighter index");
            for link in &links {
                self.visit_fighter(state, link, &index_url).await?;
            }
        }
        Ok(())
    }

    /// Incremental update: scans the completed-events list newest first until
    /// `latest_event_id`, re-scraping both corners of every bout on each newer
    /// event. Without an anchor there is nothing to do.
    pub async fn crawl_update(
        &mut self,
        state: &mut CrawlState,
        latest_event_id: Option<&str>,
    ) -> Result<usize, CrawlError> {
        let Some(latest) = latest_event_id else {
            info!("no stored events; skipping incremental update");
            return Ok(0);
        };

        let referer = self.resolve("/statistics/events/completed")?;
        let index_url = self.resolve("/statistics/events/completed?page=all")?;
        let listed = self
            .fetch_with(state, &index_url, &referer, parse_completed_events_index)
            .await?;
        let new_events = listed
            .into_iter()
            .take_while(|e| e.id != latest)
            .collect::<Vec<_>>();
        info!(latest, new_events = new_events.len(), "scanned completed events");

        for link in &new_events {
            let event_url = self.resolve(&link.url)?;
            let (event, card) = self
                .fetch_with(state, &event_url, &index_url, |doc| {
                    Ok((parse_event_detail(doc, &link.id)?, parse_event_fight_card(doc)?))
                })
                .await?;
            debug!(event_id = %event.id, bouts = card.len(), "new event");
            state.events.insert(event);

            for bout in &card {
                for corner in &bout.corners {
                    self.visit_fighter(state, corner, &event_url).await?;
                }
            }
        }
        Ok(new_events.len())
    }

    /// Upcoming snapshot: every listed upcoming event and its matchup stubs.
    pub async fn crawl_upcoming(&mut self, state: &mut CrawlState) -> Result<(), CrawlError> {
        let referer = self.resolve("/statistics/events/upcoming")?;
        let index_url = self.resolve("/statistics/events/upcoming?page=all")?;
        let links = self
            .fetch_with(state, &index_url, &referer, parse_upcoming_events_index)
            .await?;
        info!(events = links.len(), "scraping upcoming events");

        for link in &links {
            let event_url = self.resolve(&link.url)?;
            let card = self
                .fetch_with(state, &event_url, &index_url, |doc| {
                    parse_upcoming_event(doc, &link.id)
                })
                .await?;
            state.upcoming_events.insert(card.event);
            for fight in card.fights {
                state.upcoming_fights.insert(fight);
            }
        }
        Ok(())
    }

    /// Profiles are fetched at most once per crawler.
    async fn visit_fighter(
        &mut self,
        state: &mut CrawlState,
        link: &FighterLink,
        referer: &str,
    ) -> Result<(), CrawlError> {
        if !self.profiles_seen.insert(link.id.clone()) {
            debug!(fighter_id = %link.id, "profile already visited");
            return Ok(());
        }
        let url = self.resolve(&link.url)?;
        let profile = self
            .fetch_with(state, &url, referer, |doc| {
                parse_fighter_profile(doc, &link.id, &link.name)
            })
            .await?;
        for fight_link in &profile.fight_links {
            self.visit_fight(state, fight_link, &url).await?;
        }
        state.fighters.insert(profile.fighter);
        Ok(())
    }

    async fn visit_fight(
        &mut self,
        state: &mut CrawlState,
        link: &str,
        referer: &str,
    ) -> Result<(), CrawlError> {
        let url = self.resolve(link)?;
        let id = natural_id(&url).map_err(|source| CrawlError::Extract {
            url: url.clone(),
            source,
        })?;
        if state.fights.contains(&id) || self.matchups_seen.contains(&id) {
            return Ok(());
        }

        let page = self
            .fetch_with(state, &url, referer, |doc| parse_fight_detail(doc, &id))
            .await?;
        match page {
            FightPage::Upcoming => {
                self.matchups_seen.insert(id);
            }
            FightPage::Completed { fight, event_link } => {
                if !state.events.contains(&fight.event_id) {
                    self.visit_event(state, &event_link, &url).await?;
                }
                state.fights.insert(fight);
            }
        }
        Ok(())
    }

    async fn visit_event(
        &mut self,
        state: &mut CrawlState,
        link: &str,
        referer: &str,
    ) -> Result<(), CrawlError> {
        let url = self.resolve(link)?;
        let id = natural_id(&url).map_err(|source| CrawlError::Extract {
            url: url.clone(),
            source,
        })?;
        let event = self
            .fetch_with(state, &url, referer, |doc| parse_event_detail(doc, &id))
            .await?;
        state.events.insert(event);
        Ok(())
    }
}

fn extract_from<T>(
    url: &str,
    body: &str,
    extract: impl FnOnce(&Html) -> Result<T, ExtractError>,
) -> Result<T, CrawlError> {
    let doc = Html::parse_document(body);
    extract(&doc).map_err(|source| CrawlError::Extract {
        url: url.to_string(),
        source,
    })
}
