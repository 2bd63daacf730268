//! Core record model for cagestats: fighters, fights, events and the
//! forward-looking upcoming snapshot.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub const CRATE_NAME: &str = "cagestats-core";

/// Named document collections in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "fighters")]
    Fighters,
    #[serde(rename = "fights")]
    Fights,
    #[serde(rename = "events")]
    Events,
    #[serde(rename = "upcomingEvents")]
    UpcomingEvents,
    #[serde(rename = "upcomingFights")]
    UpcomingFights,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Fighters,
        Collection::Fights,
        Collection::Events,
        Collection::UpcomingEvents,
        Collection::UpcomingFights,
    ];

    /// Public collection name, as used by the read API.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Fighters => "fighters",
            Collection::Fights => "fights",
            Collection::Events => "events",
            Collection::UpcomingEvents => "upcomingEvents",
            Collection::UpcomingFights => "upcomingFights",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Collection::Fighters => "fighters",
            Collection::Fights => "fights",
            Collection::Events => "events",
            Collection::UpcomingEvents => "upcoming_events",
            Collection::UpcomingFights => "upcoming_fights",
        }
    }

    /// Volatile collections are dropped and fully reloaded on every run.
    pub fn is_volatile(&self) -> bool {
        matches!(self, Collection::UpcomingEvents | Collection::UpcomingFights)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// A record persisted under a natural identifier.
///
/// The loader only needs identifier access; values are always replaced whole.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}

macro_rules! impl_document {
    ($ty:ty, $collection:expr) => {
        impl Document for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fighter {
    pub id: String,
    pub name: String,
    pub nickname: Option<String>,
    pub current_record: String,
    pub height: String,
    pub weight_lb: String,
    pub reach_in: String,
    pub stance: Option<String>,
    pub dob: Option<NaiveDate>,
    pub career_stats: CareerStats,
}

/// Career averages from the fighter profile.
///
/// Rates are parsed numbers; percentages stay as the site renders them
/// because undefined values show up as `--`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CareerStats {
    /// Significant strikes landed per minute.
    pub slpm: f32,
    pub str_acc: String,
    /// Significant strikes absorbed per minute.
    pub sapm: f32,
    pub str_def: String,
    /// Takedowns landed per 15 minutes.
    pub td_avg: f32,
    pub td_acc: String,
    pub td_def: String,
    /// Submission attempts per 15 minutes.
    pub sub_avg: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub date: NaiveDate,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fight {
    pub id: String,
    pub event_id: String,
    /// Weight class line, often carrying title-fight status.
    pub fight_detail: String,
    pub method: String,
    pub method_detail: String,
    pub round: u32,
    pub end_time: String,
    pub time_format: String,
    pub referee: String,
    pub participants: [FightStats; 2],
}

/// An `"L of A"` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tally {
    pub landed: u32,
    pub attempted: u32,
}

impl Tally {
    pub fn new(landed: u32, attempted: u32) -> Self {
        Self { landed, attempted }
    }
}

/// One participant's line in a completed fight.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FightStats {
    pub fighter_id: String,
    /// Name as printed on the fight page at scrape time.
    pub fighter_name: String,
    pub outcome: String,
    pub kd: u32,
    pub sig_str: Tally,
    pub sig_str_pct: String,
    pub total_str: Tally,
    pub td: Tally,
    pub td_pct: String,
    pub sub_att: u32,
    pub rev: u32,
    pub ctrl: String,
    pub head: Tally,
    pub body: Tally,
    pub leg: Tally,
    pub distance: Tally,
    pub clinch: Tally,
    pub ground: Tally,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingEvent {
    pub id: String,
    pub name: String,
    pub date: NaiveDate,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingFight {
    pub id: String,
    pub upcoming_event_id: String,
    pub participants: [FighterSnapshot; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FighterStub {
    pub id: String,
    pub name: String,
}

/// A matchup corner: the full stored profile when known, otherwise the
/// id + name scraped from the event card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FighterSnapshot {
    Profile(Box<Fighter>),
    Stub(FighterStub),
}

impl FighterSnapshot {
    pub fn stub(id: impl Into<String>, name: impl Into<String>) -> Self {
        FighterSnapshot::Stub(FighterStub {
            id: id.into(),
            name: name.into(),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            FighterSnapshot::Profile(f) => &f.id,
            FighterSnapshot::Stub(s) => &s.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FighterSnapshot::Profile(f) => &f.name,
            FighterSnapshot::Stub(s) => &s.name,
        }
    }

    pub fn is_profile(&self) -> bool {
        matches!(self, FighterSnapshot::Profile(_))
    }
}

impl_document!(Fighter, Collection::Fighters);
impl_document!(Fight, Collection::Fights);
impl_document!(Event, Collection::Events);
impl_document!(UpcomingEvent, Collection::UpcomingEvents);
impl_document!(UpcomingFight, Collection::UpcomingFights);

/// Id-keyed records discovered during a run, in discovery order.
///
/// Inserting an id that is already present replaces the earlier record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMap<T> {
    records: IndexMap<String, T>,
}

impl<T> Default for RecordMap<T> {
    fn default() -> Self {
        Self {
            records: IndexMap::new(),
        }
    }
}

impl<T: Document> RecordMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the replaced record when the id was already present.
    pub fn insert(&mut self, record: T) -> Option<T> {
        self.records.insert(record.id().to_string(), record)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.records.values_mut()
    }
}

impl<T: Document> FromIterator<T> for RecordMap<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut map = RecordMap::new();
        for record in iter {
            map.insert(record);
        }
        map
    }
}
