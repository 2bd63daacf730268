use cagestats_core::{Event, FighterSnapshot, UpcomingEvent, UpcomingFight};
use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::{
    cells, collapse_whitespace, first, href, labelled, natural_id, require, select_all, text_of,
    ExtractError, FighterLink,
};

const EVENT_DATE_FORMAT: &str = "%B %d, %Y";

/// An event row on the completed or upcoming events index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLink {
    pub id: String,
    pub url: String,
}

/// One row of an event's fight card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardBout {
    pub corners: [FighterLink; 2],
    /// `data-link` of the matchup button, only present on upcoming cards.
    pub matchup_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingCard {
    pub event: UpcomingEvent,
    /// Matchups holding id + name stubs only.
    pub fights: Vec<UpcomingFight>,
}

struct EventHeader {
    name: String,
    date: NaiveDate,
    location: String,
}

fn parse_event_header(page: ElementRef<'_>) -> Result<EventHeader, ExtractError> {
    let name = collapse_whitespace(&text_of(require(page, ".b-content__title")?));
    let list = require(page, ".b-fight-details div ul")?;
    let items = select_all(list, ".b-list__box-list-item")?;

    let date_text = labelled(&items, 0, "Date:");
    let date = NaiveDate::parse_from_str(&date_text, EVENT_DATE_FORMAT).map_err(|_| {
        ExtractError::MalformedDate {
            field: "event date",
            value: date_text.clone(),
        }
    })?;

    Ok(EventHeader {
        name,
        date,
        location: labelled(&items, 1, "Location:"),
    })
}

pub fn parse_event_detail(doc: &Html, id: &str) -> Result<Event, ExtractError> {
    let page = require(doc.root_element(), ".l-page__container")?;
    let header = parse_event_header(page)?;
    debug!(event_id = id, date = %header.date, "extracted event");
    Ok(Event {
        id: id.to_string(),
        name: header.name,
        date: header.date,
        location: header.location,
    })
}

fn parse_events_index(doc: &Html, skip: usize) -> Result<Vec<EventLink>, ExtractError> {
    let inner = require(doc.root_element(), ".b-statistics__sub-inner")?;
    let rows = select_all(inner, "table.b-statistics__table-events tbody tr")?;
    let mut out = Vec::new();
    for row in rows.into_iter().skip(skip) {
        let url = cells(row)
            .first()
            .map(|td| first(*td, "a"))
            .transpose()?
            .flatten()
            .and_then(href)
            .ok_or(ExtractError::MissingElement("table.b-statistics__table-events td a"))?;
        out.push(EventLink {
            id: natural_id(&url)?,
            url,
        });
    }
    Ok(out)
}

/// Completed events, newest first.
///
/// The first two rows are the spacer and the pinned next event.
pub fn parse_completed_events_index(doc: &Html) -> Result<Vec<EventLink>, ExtractError> {
    parse_events_index(doc, 2)
}

pub fn parse_upcoming_events_index(doc: &Html) -> Result<Vec<EventLink>, ExtractError> {
    parse_events_index(doc, 1)
}

fn corner(p: Option<&ElementRef<'_>>) -> Result<FighterLink, ExtractError> {
    let p = p.ok_or(ExtractError::MissingElement(".b-fight-details__table td p"))?;
    let url = first(*p, "a")?
        .and_then(href)
        .ok_or(ExtractError::MissingElement(".b-fight-details__table td p a"))?;
    Ok(FighterLink {
        id: natural_id(&url)?,
        name: text_of(*p),
        url,
    })
}

/// Fight card rows of an event page, completed or upcoming.
pub fn parse_event_fight_card(doc: &Html) -> Result<Vec<CardBout>, ExtractError> {
    let page = require(doc.root_element(), ".l-page__container")?;
    let rows = select_all(page, ".b-fight-details__table tbody tr")?;
    if rows.is_empty() {
        return Err(ExtractError::MissingElement(".b-fight-details__table tbody tr"));
    }

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let tds = cells(row);
        let fighters = tds
            .get(1)
            .map(|td| select_all(*td, "p"))
            .transpose()?
            .unwrap_or_default();
        let matchup_link = tds
            .get(4)
            .map(|td| first(*td, "a"))
            .transpose()?
            .flatten()
            .and_then(|a| a.value().attr("data-link").map(str::to_string));
        out.push(CardBout {
            corners: [corner(fighters.first())?, corner(fighters.get(1))?],
            matchup_link,
        });
    }
    Ok(out)
}

/// Parses an upcoming event page into the event and its matchup stubs.
pub fn parse_upcoming_event(doc: &Html, id: &str) -> Result<UpcomingCard, ExtractError> {
    let page = require(doc.root_element(), ".l-page__container")?;
    let header = parse_event_header(page)?;

    let mut fights = Vec::new();
    for bout in parse_event_fight_card(doc)? {
        let link = bout
            .matchup_link
            .ok_or(ExtractError::MissingElement(".b-fight-details__table td a[data-link]"))?;
        let [red, blue] = bout.corners;
        fights.push(UpcomingFight {
            id: natural_id(&link)?,
            upcoming_event_id: id.to_string(),
            participants: [
                FighterSnapshot::stub(red.id, red.name),
                FighterSnapshot::stub(blue.id, blue.name),
            ],
        });
    }
    debug!(event_id = id, fights = fights.len(), "extracted upcoming event");

    Ok(UpcomingCard {
        event: UpcomingEvent {
            id: id.to_string(),
            name: header.name,
            date: header.date,
            location: header.location,
        },
        fights,
    })
}
