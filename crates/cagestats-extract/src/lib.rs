//! Page extractors for ufcstats.com: one pure function per page role,
//! each taking a parsed `scraper::Html` document.
//!
//! Extractors never fetch. They return typed records plus the links the
//! crawler should follow next, or an [`ExtractError`] when a required
//! element or value is missing or malformed.

use cagestats_core::Tally;
use scraper::{ElementRef, Selector};
use thiserror::Error;
use url::Url;

mod event;
mod fight;
mod fighter;

pub use event::{
    parse_completed_events_index, parse_event_detail, parse_event_fight_card,
    parse_upcoming_event, parse_upcoming_events_index, CardBout, EventLink, UpcomingCard,
};
pub use fight::{parse_fight_detail, FightPage};
pub use fighter::{parse_fighter_index, parse_fighter_profile, FighterLink, FighterProfile};

pub const CRATE_NAME: &str = "cagestats-extract";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector {
        selector: &'static str,
        message: String,
    },
    #[error("missing element `{0}`")]
    MissingElement(&'static str),
    #[error("malformed number in {field}: {value:?}")]
    MalformedNumber { field: &'static str, value: String },
    #[error("malformed \"L of A\" pair in {field}: {value:?}")]
    MalformedPair { field: &'static str, value: String },
    #[error("malformed date in {field}: {value:?}")]
    MalformedDate { field: &'static str, value: String },
    #[error("malformed link {0:?}")]
    MalformedLink(String),
    #[error("fight {0} does not list two distinct participants")]
    Participants(String),
}

pub(crate) fn selector(css: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css,
        message: e.to_string(),
    })
}

pub(crate) fn first<'a>(
    scope: ElementRef<'a>,
    css: &'static str,
) -> Result<Option<ElementRef<'a>>, ExtractError> {
    let sel = selector(css)?;
    Ok(scope.select(&sel).next())
}

pub(crate) fn require<'a>(
    scope: ElementRef<'a>,
    css: &'static str,
) -> Result<ElementRef<'a>, ExtractError> {
    first(scope, css)?.ok_or(ExtractError::MissingElement(css))
}

pub(crate) fn select_all<'a>(
    scope: ElementRef<'a>,
    css: &'static str,
) -> Result<Vec<ElementRef<'a>>, ExtractError> {
    let sel = selector(css)?;
    Ok(scope.select(&sel).collect())
}

/// Direct `<td>` children of a table row.
pub(crate) fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "td")
        .collect()
}

pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

pub(crate) fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Element text with every nested `<i>` label dropped.
pub(crate) fn unlabelled_text(el: ElementRef<'_>) -> String {
    fn walk(el: ElementRef<'_>, out: &mut String) {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                out.push_str(text);
            } else if let Some(child_el) = ElementRef::wrap(child) {
                if child_el.value().name() != "i" {
                    walk(child_el, out);
                }
            }
        }
    }
    let mut out = String::new();
    walk(el, &mut out);
    out.trim().to_string()
}

pub(crate) fn strip_label(text: &str, label: &str) -> String {
    let text = text.trim();
    text.strip_prefix(label).unwrap_or(text).trim().to_string()
}

/// Text of the `index`-th element with its leading label removed, or `""`.
pub(crate) fn labelled(items: &[ElementRef<'_>], index: usize, label: &str) -> String {
    items
        .get(index)
        .map(|el| strip_label(&text_of(*el), label))
        .unwrap_or_default()
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn href(el: ElementRef<'_>) -> Option<String> {
    el.value()
        .attr("href")
        .and_then(|s| text_or_none(s.to_string()))
}

/// Natural identifier of a site entity: the last path segment of its URL.
///
/// Relative links are accepted.
pub fn natural_id(link: &str) -> Result<String, ExtractError> {
    let malformed = || ExtractError::MalformedLink(link.to_string());
    let parsed = match Url::parse(link) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://localhost/")
            .and_then(|base| base.join(link))
            .map_err(|_| malformed())?,
        Err(_) => return Err(malformed()),
    };
    parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_string)
        .ok_or_else(malformed)
}

pub(crate) fn parse_count(field: &'static str, text: &str) -> Result<u32, ExtractError> {
    text.trim()
        .parse::<u32>()
        .map_err(|_| ExtractError::MalformedNumber {
            field,
            value: text.to_string(),
        })
}

pub(crate) fn parse_rate(field: &'static str, text: &str) -> Result<f32, ExtractError> {
    text.trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ExtractError::MalformedNumber {
            field,
            value: text.to_string(),
        })
}

/// Parses an `"L of A"` cell such as `"12 of 34"`.
pub fn parse_tally(field: &'static str, text: &str) -> Result<Tally, ExtractError> {
    let malformed = || ExtractError::MalformedPair {
        field,
        value: text.to_string(),
    };
    let (landed, attempted) = text.split_once("of").ok_or_else(malformed)?;
    let landed = landed.trim().parse::<u32>().map_err(|_| malformed())?;
    let attempted = attempted.trim().parse::<u32>().map_err(|_| malformed())?;
    Ok(Tally::new(landed, attempted))
}


#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn tally_splits_on_of() {
        assert_eq!(parse_tally("sig_str", "12 of 34").unwrap(), Tally::new(12, 34));
        assert_eq!(parse_tally("td", " 0 of 0 ").unwrap(), Tally::new(0, 0));
        assert!(matches!(
            parse_tally("td", "12 / 34"),
            Err(ExtractError::MalformedPair { field: "td", .. })
        ));
        assert!(parse_tally("td", "-- of 3").is_err());
    }

    #[test]
    fn rates_must_be_finite_numbers() {
        assert_eq!(parse_rate("slpm", " 4.50 ").unwrap(), 4.5);
        for bad in ["NaN", "inf", "-infinity", "--", ""] {
            assert!(
                matches!(
                    parse_rate("slpm", bad),
                    Err(ExtractError::MalformedNumber { field: "slpm", .. })
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn natural_ids_come_from_the_last_path_segment() {
        assert_eq!(
            natural_id("http://ufcstats.com/fighter-details/abc123").unwrap(),
            "abc123"
        );
        assert_eq!(natural_id("http://ufcstats.com/event-details/evt1/").unwrap(), "evt1");
        assert_eq!(natural_id("/fighter-abc123").unwrap(), "fighter-abc123");
        assert!(natural_id("http://ufcstats.com/").is_err());
    }

    #[test]
    fn whitespace_and_labels() {
        assert_eq!(
            collapse_whitespace("  Punches to Head\n      From Mount "),
            "Punches to Head From Mount"
        );
        assert_eq!(strip_label("  Referee:  Herb Dean ", "Referee:"), "Herb Dean");
        assert_eq!(strip_label("Herb Dean", "Referee:"), "Herb Dean");
    }

    #[test]
    fn labels_are_dropped_from_list_items() {
        let doc = Html::parse_fragment(
            r#"<ul><li class="x"><i class="t">Height:</i> 5' 6" </li></ul>"#,
        );
        let li = doc
            .select(&Selector::parse("li.x").unwrap())
            .next()
            .unwrap();
        assert_eq!(unlabelled_text(li), "5' 6\"");
    }
}
