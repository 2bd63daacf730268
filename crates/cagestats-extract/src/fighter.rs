use cagestats_core::{CareerStats, Fighter};
use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use tracing::{debug, warn};

use crate::{
    cells, first, href, natural_id, parse_rate, require, select_all, strip_label, text_of,
    text_or_none, unlabelled_text, ExtractError,
};

const DOB_FORMAT: &str = "%b %d, %Y";

/// A fighter row on an alphabetical index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FighterLink {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FighterProfile {
    pub fighter: Fighter,
    /// Fight detail links from the history table, in page order.
    pub fight_links: Vec<String>,
}

pub fn parse_fighter_index(doc: &Html) -> Result<Vec<FighterLink>, ExtractError> {
    let rows = select_all(doc.root_element(), ".b-statistics__table tbody tr")?;
    let mut out = Vec::with_capacity(rows.len().saturating_sub(1));
    // Row 0 is the empty spacer under the header.
    for row in rows.into_iter().skip(1) {
        let tds = cells(row);
        let first_name = tds.first().copied().ok_or(ExtractError::MissingElement("td"))?;
        let last_name = tds.get(1).map(|td| text_of(*td)).unwrap_or_default();
        let url = first(first_name, "a")?
            .and_then(href)
            .ok_or(ExtractError::MissingElement(".b-statistics__table td a"))?;
        let name = format!("{} {}", text_of(first_name), last_name)
            .trim()
            .to_string();
        out.push(FighterLink {
            id: natural_id(&url)?,
            name,
            url,
        });
    }
    Ok(out)
}

/// Direct `<li>` children of a list.
fn list_items(list: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    list.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "li")
        .collect()
}

fn item_text(items: &[ElementRef<'_>], index: usize) -> String {
    items.get(index).map(|li| unlabelled_text(*li)).unwrap_or_default()
}

fn sentinel_or(value: String) -> Option<String> {
    text_or_none(value).filter(|v| v != "--")
}

/// Parses a profile page. `id` and `name` come from the link that led here.
pub fn parse_fighter_profile(
    doc: &Html,
    id: &str,
    name: &str,
) -> Result<FighterProfile, ExtractError> {
    let page = require(doc.root_element(), ".l-page__container")?;
    let details = require(page, ".b-fight-details")?;

    let current_record = first(page, ".b-content__title-record")?
        .map(|el| strip_label(&text_of(el), "Record:"))
        .unwrap_or_default();
    let nickname = first(page, "p.b-content__Nickname")?.and_then(|el| text_or_none(text_of(el)));

    let physical = list_items(require(details, "div .b-list__box-list")?);
    let dob_text = item_text(&physical, 4);
    let dob = match dob_text.as_str() {
        "" | "--" => {
            warn!(fighter_id = id, "date of birth not listed");
            None
        }
        text => Some(NaiveDate::parse_from_str(text, DOB_FORMAT).map_err(|_| {
            ExtractError::MalformedDate {
                field: "dob",
                value: text.to_string(),
            }
        })?),
    };

    let left_box = require(details, "div .b-list__info-box-left")?;
    let left = list_items(require(left_box, "ul.b-list__box-list")?);
    let right_box = require(details, "div .b-list__info-box-right")?;
    let right = list_items(require(right_box, "ul.b-list__box-list")?);

    // The right box opens with an empty spacer item.
    let career_stats = CareerStats {
        slpm: parse_rate("slpm", &item_text(&left, 0))?,
        str_acc: item_text(&left, 1),
        sapm: parse_rate("sapm", &item_text(&left, 2))?,
        str_def: item_text(&left, 3),
        td_avg: parse_rate("td_avg", &item_text(&right, 1))?,
        td_acc: item_text(&right, 2),
        td_def: item_text(&right, 3),
        sub_avg: parse_rate("sub_avg", &item_text(&right, 4))?,
    };

    let history = select_all(details, ".b-fight-details__table tbody tr")?;
    if history.is_empty() {
        return Err(ExtractError::MissingElement(".b-fight-details__table tbody tr"));
    }
    let mut fight_links = Vec::with_capacity(history.len() - 1);
    for row in history.into_iter().skip(1) {
        let link = cells(row)
            .first()
            .map(|td| first(*td, "a"))
            .transpose()?
            .flatten()
            .and_then(href)
            .ok_or(ExtractError::MissingElement(".b-fight-details__table td a"))?;
        fight_links.push(link);
    }

    let fighter = Fighter {
        id: id.to_string(),
        name: name.to_string(),
        nickname,
        current_record,
        height: item_text(&physical, 0),
        weight_lb: item_text(&physical, 1),
        reach_in: item_text(&physical, 2),
        stance: sentinel_or(item_text(&physical, 3)),
        dob,
        career_stats,
    };
    debug!(
        fighter_id = %fighter.id,
        fights = fight_links.len(),
        "extracted fighter profile"
    );
    Ok(FighterProfile {
        fighter,
        fight_links,
    })
}
