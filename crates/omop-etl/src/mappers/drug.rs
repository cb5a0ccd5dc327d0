//! Drug exposures from prescriptions, plus the ingredient-level
//! drug eras and dose eras derived from the routed exposures.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use omop_ingest::frame::{column_datetime, column_i64, column_opt_string, parse_f64};
use omop_model::{
    DoseEra, DrugDetail, DrugEra, MappedFact, Provenance, Result, TargetDomain,
};
use omop_vocab::VocabularyStore;

use crate::concepts::TYPE_EHR;
use crate::mappers::row_provenance;
use crate::state::EtlState;

pub const NDC_VOCABULARIES: [&str; 2] = ["mimiciv_drug_ndc", "NDC"];
pub const GSN_VOCABULARY: &str = "mimiciv_drug_gsn";
pub const NAME_VOCABULARY: &str = "mimiciv_drug_name";
pub const ROUTE_VOCABULARY: &str = "mimiciv_drug_route";

const ERA_GAP_DAYS: i64 = 30;

/// Resolve one prescription through the NDC -> GSN -> drug-name
/// coalesce chain, keeping the first code that lands a source concept.
fn resolve_prescription(
    store: &VocabularyStore,
    ndc: Option<&str>,
    gsn: Option<&str>,
    drug: Option<&str>,
) -> (Option<String>, Option<String>, omop_vocab::Resolution) {
    if let Some(ndc) = ndc.map(str::trim).filter(|c| !c.is_empty() && *c != "0") {
        let resolution = store.resolve_in(&NDC_VOCABULARIES, ndc);
        if resolution.source_concept_id != 0 {
            return (
                Some(ndc.to_string()),
                Some(NDC_VOCABULARIES[0].to_string()),
                resolution,
            );
        }
    }
    // gsn can hold a space-separated list; any member may match.
    if let Some(gsn) = gsn {
        for code in gsn.split_whitespace() {
            let resolution = store.resolve(GSN_VOCABULARY, code);
            if resolution.source_concept_id != 0 {
                return (
                    Some(code.to_string()),
                    Some(GSN_VOCABULARY.to_string()),
                    resolution,
                );
            }
        }
    }
    if let Some(drug) = drug.map(str::trim).filter(|d| !d.is_empty()) {
        let resolution = store.resolve(NAME_VOCABULARY, drug);
        return (
            Some(drug.to_string()),
            Some(NAME_VOCABULARY.to_string()),
            resolution,
        );
    }
    (None, None, omop_vocab::Resolution::default())
}

pub fn migrate_lookup(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let Some(prescriptions) = state.arena.maybe("prescriptions").cloned() else {
        return Ok(());
    };
    let input = prescriptions.height();
    let mut emitted = 0usize;
    for idx in 0..input {
        let Some(subject_id) = column_i64(&prescriptions, "subject_id", idx) else {
            continue;
        };
        let hadm_id = column_i64(&prescriptions, "hadm_id", idx);
        let Some(starttime) = column_datetime(&prescriptions, "starttime", idx) else {
            continue;
        };

        let ndc = column_opt_string(&prescriptions, "ndc", idx);
        let gsn = column_opt_string(&prescriptions, "gsn", idx);
        let drug_name = column_opt_string(&prescriptions, "drug", idx);
        let (source_code, source_vocabulary, resolution) = resolve_prescription(
            store,
            ndc.as_deref(),
            gsn.as_deref(),
            drug_name.as_deref(),
        );

        let route = column_opt_string(&prescriptions, "route", idx);
        let route_concept_id = route
            .as_deref()
            .map(|r| store.resolve(ROUTE_VOCABULARY, r.trim()).target_concept_id);

        let mut fact = MappedFact::new(
            subject_id,
            hadm_id,
            starttime,
            TYPE_EHR,
            TargetDomain::from_domain_id(
                resolution.target_domain_id.as_deref(),
                TargetDomain::Drug,
            ),
            row_provenance(&prescriptions, "prescriptions", idx, "drug.prescriptions"),
        );
        fact.source_code = source_code;
        fact.source_vocabulary_id = source_vocabulary;
        fact.source_concept_id = resolution.source_concept_id;
        fact.target_concept_id = resolution.target_concept_id;
        fact.quantity =
            column_opt_string(&prescriptions, "dose_val_rx", idx).and_then(|v| parse_f64(&v));
        fact.drug = Some(DrugDetail {
            end_datetime: column_datetime(&prescriptions, "stoptime", idx),
            stop_reason: None,
            refills: None,
            days_supply: None,
            sig: column_opt_string(&prescriptions, "prod_strength", idx),
            route_concept_id,
            route_source_value: route,
            dose_unit_source_value: column_opt_string(&prescriptions, "dose_unit_rx", idx),
        });
        state.facts.push(fact);
        emitted += 1;
    }
    state.record_audit("drug.prescriptions", input, emitted);
    Ok(())
}

/// Collapse sorted date intervals, merging neighbours whose gap is at
/// most `ERA_GAP`. Returns (start, end, count, gap_days) per era.
fn collapse_eras(mut spans: Vec<(NaiveDate, NaiveDate)>) -> Vec<(NaiveDate, NaiveDate, i64, i64)> {
    spans.sort_unstable();
    let mut eras: Vec<(NaiveDate, NaiveDate, i64, i64)> = Vec::new();
    for (start, end) in spans {
        match eras.last_mut() {
            Some(era) if start <= era.1 + Duration::days(ERA_GAP_DAYS) => {
                let gap = (start - era.1).num_days().max(0);
                era.1 = era.1.max(end);
                era.2 += 1;
                era.3 += gap;
            }
            _ => eras.push((start, end, 1, 0)),
        }
    }
    eras
}

/// Drug eras aggregate exposures at the RxNorm ingredient level; an
/// exposure with no known ingredient ancestry is skipped.
pub fn migrate_drug_era(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let mut spans: BTreeMap<(i64, i64), Vec<(NaiveDate, NaiveDate)>> = BTreeMap::new();
    for row in &state.cdm.drug_exposures {
        if row.drug_concept_id == 0 {
            continue;
        }
        for ingredient in store.ingredients_of(row.drug_concept_id) {
            spans
                .entry((row.person_id, ingredient))
                .or_default()
                .push((row.drug_exposure_start_date, row.drug_exposure_end_date));
        }
    }

    let input = spans.len();
    let mut rows = Vec::new();
    for ((person_id, drug_concept_id), person_spans) in spans {
        for (start, end, count, gap_days) in collapse_eras(person_spans) {
            rows.push(DrugEra {
                drug_era_id: state.keys.next_id("drug_era"),
                person_id,
                drug_concept_id,
                drug_era_start_date: start,
                drug_era_end_date: end,
                drug_exposure_count: count,
                gap_days,
                provenance: Provenance::new(
                    "drug_era",
                    "drug_exposure",
                    None,
                    format!("drug_era:{person_id}|{drug_concept_id}"),
                ),
            });
        }
    }

    let emitted = rows.len();
    state.cdm.drug_eras = rows;
    state.record_audit("drug_era", input, emitted);
    Ok(())
}

/// Dose eras merge contiguous exposures of the same drug at the same
/// recorded dose; exposures without a numeric dose contribute nothing.
pub fn migrate_dose_era(state: &mut EtlState) -> Result<()> {
    let mut spans: BTreeMap<(i64, i64, String), Vec<(NaiveDate, NaiveDate)>> = BTreeMap::new();
    for row in &state.cdm.drug_exposures {
        if row.drug_concept_id == 0 {
            continue;
        }
        let Some(dose) = row.quantity else {
            continue;
        };
        spans
            .entry((row.person_id, row.drug_concept_id, format!("{dose}")))
            .or_default()
            .push((row.drug_exposure_start_date, row.drug_exposure_end_date));
    }

    let input = spans.len();
    let mut rows = Vec::new();
    for ((person_id, drug_concept_id, dose), person_spans) in spans {
        let dose_value: f64 = dose.parse().unwrap_or_default();
        for (start, end, _, _) in collapse_eras(person_spans) {
            rows.push(DoseEra {
                dose_era_id: state.keys.next_id("dose_era"),
                person_id,
                drug_concept_id,
                unit_concept_id: 0,
                dose_value,
                dose_era_start_date: start,
                dose_era_end_date: end,
                provenance: Provenance::new(
                    "dose_era",
                    "drug_exposure",
                    None,
                    format!("dose_era:{person_id}|{drug_concept_id}"),
                ),
            });
        }
    }

    let emitted = rows.len();
    state.cdm.dose_eras = rows;
    state.record_audit("dose_era", input, emitted);
    Ok(())
}
