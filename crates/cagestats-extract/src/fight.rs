use cagestats_core::{Fight, FightStats};
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::{
    cells, collapse_whitespace, first, href, labelled, natural_id, parse_count, parse_tally,
    require, selector, select_all, strip_label, text_of, ExtractError,
};

/// Result of reading a fight detail page.
#[derive(Debug, Clone, PartialEq)]
pub enum FightPage {
    /// The bout has not happened yet; the page only shows a matchup.
    Upcoming,
    Completed { fight: Fight, event_link: String },
}

/// The first `<p>` of a stats cell belongs to the first participant, the
/// second to the other.
fn cell_pair(td: ElementRef<'_>) -> Result<[String; 2], ExtractError> {
    let ps = select_all(td, "p")?;
    let at = |i: usize| ps.get(i).map(|p| text_of(*p)).unwrap_or_default();
    Ok([at(0), at(1)])
}

fn apply_totals_column(
    column: usize,
    texts: [String; 2],
    stats: &mut [FightStats; 2],
) -> Result<(), ExtractError> {
    for (stat, text) in stats.iter_mut().zip(texts) {
        match column {
            1 => stat.kd = parse_count("kd", &text)?,
            2 => stat.sig_str = parse_tally("sig_str", &text)?,
            3 => stat.sig_str_pct = text,
            4 => stat.total_str = parse_tally("total_str", &text)?,
            5 => stat.td = parse_tally("td", &text)?,
            6 => stat.td_pct = text,
            7 => stat.sub_att = parse_count("sub_att", &text)?,
            8 => stat.rev = parse_count("rev", &text)?,
            9 => stat.ctrl = text,
            _ => {}
        }
    }
    Ok(())
}

fn apply_strikes_column(
    column: usize,
    texts: [String; 2],
    stats: &mut [FightStats; 2],
) -> Result<(), ExtractError> {
    for (stat, text) in stats.iter_mut().zip(texts) {
        match column {
            3 => stat.head = parse_tally("head", &text)?,
            4 => stat.body = parse_tally("body", &text)?,
            5 => stat.leg = parse_tally("leg", &text)?,
            6 => stat.distance = parse_tally("distance", &text)?,
            7 => stat.clinch = parse_tally("clinch", &text)?,
            8 => stat.ground = parse_tally("ground", &text)?,
            _ => {}
        }
    }
    Ok(())
}

fn participant(person: ElementRef<'_>) -> Result<FightStats, ExtractError> {
    let link = require(person, "a")?;
    let url = href(link).ok_or(ExtractError::MissingElement(".b-fight-details__person a[href]"))?;
    Ok(FightStats {
        fighter_id: natural_id(&url)?,
        fighter_name: text_of(link),
        outcome: first(person, "i")?.map(text_of).unwrap_or_default(),
        ..FightStats::default()
    })
}

/// Parses a fight detail page into a completed fight plus its event link.
///
/// `fight_id` is the natural id of the link that led here.
pub fn parse_fight_detail(doc: &Html, fight_id: &str) -> Result<FightPage, ExtractError> {
    let page = require(doc.root_element(), ".l-page__container")?;
    let details = require(page, "div.b-fight-details")?;
    let sections = select_all(details, ".b-fight-details__section")?;

    let a = selector("a")?;
    let section_title = sections
        .iter()
        .flat_map(|s| s.select(&a))
        .next()
        .map(text_of);
    if section_title.as_deref() == Some("Matchup") {
        debug!(fight_id, "fight page is an upcoming matchup");
        return Ok(FightPage::Upcoming);
    }

    let event_link = href(require(page, "h2.b-content__title a")?)
        .ok_or(ExtractError::MissingElement("h2.b-content__title a[href]"))?;

    let persons = select_all(details, ".b-fight-details__person")?;
    let (Some(p1), Some(p2)) = (persons.first(), persons.get(1)) else {
        return Err(ExtractError::Participants(fight_id.to_string()));
    };
    let mut participants = [participant(*p1)?, participant(*p2)?];
    if participants[0].fighter_id == participants[1].fighter_id {
        return Err(ExtractError::Participants(fight_id.to_string()));
    }

    let fight_detail = first(details, ".b-fight-details__fight-head")?
        .map(|el| collapse_whitespace(&text_of(el)))
        .unwrap_or_default();

    let text_rows = select_all(details, ".b-fight-details__text")?;
    let summary = text_rows
        .first()
        .copied()
        .ok_or(ExtractError::MissingElement(".b-fight-details__text"))?;
    let method = first(summary, "i[style]")?
        .map(text_of)
        .unwrap_or_default();
    let items = select_all(summary, ".b-fight-details__text-item")?;
    let round = parse_count("round", &labelled(&items, 0, "Round:"))?;

    // Finishes carry a single "Details:" line; decisions list scorecards.
    let method_detail = match text_rows.get(1) {
        None => String::new(),
        Some(row) => {
            let cards = select_all(*row, ".b-fight-details__text-item")?;
            let raw = if cards.is_empty() {
                strip_label(&text_of(*row), "Details:")
            } else {
                cards.iter().map(|c| text_of(*c)).collect::<Vec<_>>().join(" ")
            };
            collapse_whitespace(&raw)
        }
    };

    if let Some(totals) = sections.get(1) {
        let rows = select_all(*totals, "table[style] tbody tr")?;
        if rows.is_empty() {
            return Err(ExtractError::MissingElement("table[style] tbody tr"));
        }
        for row in rows {
            for (column, td) in cells(row).into_iter().enumerate() {
                apply_totals_column(column, cell_pair(td)?, &mut participants)?;
            }
        }
    }

    let thead = selector("thead")?;
    let strikes_table = select_all(details, "table[style]")?
        .into_iter()
        .find(|table| {
            table
                .select(&thead)
                .next()
                .is_some_and(|head| text_of(head).contains("Head"))
        });
    if let Some(table) = strikes_table {
        for row in select_all(table, "tbody tr")? {
            for (column, td) in cells(row).into_iter().enumerate() {
                apply_strikes_column(column, cell_pair(td)?, &mut participants)?;
            }
        }
    }

    let fight = Fight {
        id: fight_id.to_string(),
        event_id: natural_id(&event_link)?,
        fight_detail,
        method,
        method_detail,
        round,
        end_time: labelled(&items, 1, "Time:"),
        time_format: labelled(&items, 2, "Time format:"),
        referee: labelled(&items, 3, "Referee:"),
        participants,
    };
    debug!(fight_id, event_id = %fight.event_id, "extracted fight");
    Ok(FightPage::Completed { fight, event_link })
}
