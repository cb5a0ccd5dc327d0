//! Care sites: one per distinct transfer care unit.

use omop_ingest::frame::column_opt_string;
use omop_model::{CareSite, Result};
use omop_vocab::VocabularyStore;

use crate::mappers::row_provenance;
use crate::state::EtlState;

/// Custom vocabulary mapping care unit names to place-of-service
/// concepts.
pub const CARE_UNIT_VOCABULARY: &str = "mimiciv_cs_place_of_service";

pub fn migrate(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let transfers = state.arena.get("care_site", "transfers")?.clone();

    let mut seen: Vec<String> = Vec::new();
    let mut rows = Vec::new();
    for idx in 0..transfers.height() {
        let Some(careunit) = column_opt_string(&transfers, "careunit", idx) else {
            continue;
        };
        if seen.contains(&careunit) {
            continue;
        }
        seen.push(careunit.clone());

        let resolution = store.resolve(CARE_UNIT_VOCABULARY, &careunit);
        let care_site_id = state.keys.next_id("care_site");
        state.care_site_keys.insert(careunit.clone(), care_site_id);
        rows.push(CareSite {
            care_site_id,
            care_site_name: Some(careunit.clone()),
            place_of_service_concept_id: resolution.target_concept_id,
            location_id: state.cdm.locations.first().map(|l| l.location_id),
            care_site_source_value: Some(careunit.clone()),
            place_of_service_source_value: Some(careunit),
            provenance: row_provenance(&transfers, "transfers", idx, "care_site.transfers"),
        });
    }

    let emitted = rows.len();
    state.cdm.care_sites = rows;
    state.record_audit("care_site", seen.len(), emitted);
    Ok(())
}
