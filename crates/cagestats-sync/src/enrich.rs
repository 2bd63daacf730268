use std::collections::{BTreeSet, HashMap};

use cagestats_core::{Fighter, FighterSnapshot, RecordMap, UpcomingFight};
use cagestats_storage::{get_records, DocumentStore, StoreError};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    /// Distinct fighter ids referenced by the matchups.
    pub referenced: usize,
    /// Corners now holding a full stored profile.
    pub resolved: usize,
    /// Corners left as id + name stubs.
    pub stubs_kept: usize,
}

/// Swaps every matchup corner for the stored fighter profile with the same
/// id. Corners whose fighter is not stored keep their stub. Running it again
/// over the same store yields the same matchups.
pub async fn enrich_upcoming_fights(
    store: &dyn DocumentStore,
    fights: &mut RecordMap<UpcomingFight>,
) -> Result<EnrichmentReport, StoreError> {
    let ids = fights
        .values()
        .flat_map(|f| f.participants.iter())
        .map(FighterSnapshot::id)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>();
    if ids.is_empty() {
        return Ok(EnrichmentReport::default());
    }

    let ids = ids.into_iter().collect::<Vec<_>>();
    let stored = get_records::<Fighter>(store, &ids)
        .await?
        .into_iter()
        .map(|f| (f.id.clone(), f))
        .collect::<HashMap<_, _>>();

    let mut report = EnrichmentReport {
        referenced: ids.len(),
        ..Default::default()
    };
    for fight in fights.values_mut() {
        for corner in fight.participants.iter_mut() {
            match stored.get(corner.id()) {
                Some(fighter) => {
                    *corner = FighterSnapshot::Profile(Box::new(fighter.clone()));
                    report.resolved += 1;
                }
                None => report.stubs_kept += 1,
            }
        }
    }
    info!(
        referenced = report.referenced,
        resolved = report.resolved,
        stubs_kept = report.stubs_kept,
        "enriched upcoming matchups"
    );
    Ok(report)
}
