//! Observations: DRG billing codes and ward service assignments,
//! plus the per-person observation period envelope.

use std::collections::HashMap;

use chrono::NaiveDate;
use omop_ingest::frame::{column_datetime, column_i64, column_opt_string};
use omop_model::{MappedFact, ObservationPeriod, Provenance, Result, TargetDomain};
use omop_vocab::VocabularyStore;

use crate::concepts::{TYPE_EHR, TYPE_EHR_BILLING};
use crate::mappers::row_provenance;
use crate::state::EtlState;

pub const DRG_VOCABULARY: &str = "mimiciv_obs_drgcodes";
pub const SERVICE_VOCABULARY: &str = "mimiciv_obs_service";

pub fn migrate_lookup(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    migrate_drgcodes(state, store)?;
    migrate_services(state, store)?;
    Ok(())
}

/// DRG rows are dated by their admission's discharge, like the other
/// billing-derived facts.
fn migrate_drgcodes(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let Some(drgcodes) = state.arena.maybe("drgcodes").cloned() else {
        return Ok(());
    };
    let input = drgcodes.height();
    let mut emitted = 0usize;
    for idx in 0..input {
        let Some(subject_id) = column_i64(&drgcodes, "subject_id", idx) else {
            continue;
        };
        let Some(hadm_id) = column_i64(&drgcodes, "hadm_id", idx) else {
            continue;
        };
        let Some(code) = column_opt_string(&drgcodes, "drg_code", idx) else {
            continue;
        };
        let Some(span) = state
            .admissions
            .spans(subject_id)
            .iter()
            .find(|s| s.hadm_id == hadm_id)
        else {
            continue;
        };

        let resolution = store.resolve(DRG_VOCABULARY, code.trim());
        let target_domain = TargetDomain::from_domain_id(
            resolution.target_domain_id.as_deref(),
            TargetDomain::Observation,
        );
        let mut fact = MappedFact::new(
            subject_id,
            Some(hadm_id),
            span.dischtime,
            TYPE_EHR_BILLING,
            target_domain,
            row_provenance(&drgcodes, "drgcodes", idx, "obs.drgcodes"),
        );
        fact.source_code = Some(code.trim().to_string());
        fact.source_vocabulary_id = Some(DRG_VOCABULARY.to_string());
        fact.source_concept_id = resolution.source_concept_id;
        fact.target_concept_id = resolution.target_concept_id;
        fact.value.value_as_string = column_opt_string(&drgcodes, "description", idx);
        state.facts.push(fact);
        emitted += 1;
    }
    state.record_audit("observation.drgcodes", input, emitted);
    Ok(())
}

fn migrate_services(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let Some(services) = state.arena.maybe("services").cloned() else {
        return Ok(());
    };
    let input = services.height();
    let mut emitted = 0usize;
    for idx in 0..input {
        let Some(subject_id) = column_i64(&services, "subject_id", idx) else {
            continue;
        };
        let hadm_id = column_i64(&services, "hadm_id", idx);
        let Some(at) = column_datetime(&services, "transfertime", idx) else {
            continue;
        };
        let Some(service) = column_opt_string(&services, "curr_service", idx) else {
            continue;
        };

        let resolution = store.resolve(SERVICE_VOCABULARY, service.trim());
        let mut fact = MappedFact::new(
            subject_id,
            hadm_id,
            at,
            TYPE_EHR,
            TargetDomain::from_domain_id(
                resolution.target_domain_id.as_deref(),
                TargetDomain::Observation,
            ),
            row_provenance(&services, "services", idx, "obs.services"),
        );
        fact.source_code = Some(service.trim().to_string());
        fact.source_vocabulary_id = Some(SERVICE_VOCABULARY.to_string());
        fact.source_concept_id = resolution.source_concept_id;
        fact.target_concept_id = resolution.target_concept_id;
        fact.value.value_as_string = Some(service.trim().to_string());
        state.facts.push(fact);
        emitted += 1;
    }
    state.record_audit("observation.services", input, emitted);
    Ok(())
}

/// Observation period: the min/max envelope of each person's visits
/// and already-routed facts.
pub fn migrate_period(state: &mut EtlState) -> Result<()> {
    let mut envelopes: HashMap<i64, (NaiveDate, NaiveDate)> = HashMap::new();
    let mut widen = |person_id: i64, start: NaiveDate, end: NaiveDate| {
        envelopes
            .entry(person_id)
            .and_modify(|(lo, hi)| {
                *lo = (*lo).min(start);
                *hi = (*hi).max(end);
            })
            .or_insert((start, end));
    };

    for visit in &state.cdm.visit_occurrences {
        widen(visit.person_id, visit.visit_start_date, visit.visit_end_date);
    }
    for row in &state.cdm.measurements {
        widen(row.person_id, row.measurement_date, row.measurement_date);
    }
    for row in &state.cdm.condition_occurrences {
        widen(row.person_id, row.condition_start_date, row.condition_start_date);
    }
    for row in &state.cdm.procedure_occurrences {
        widen(row.person_id, row.procedure_date, row.procedure_date);
    }
    for row in &state.cdm.observations {
        widen(row.person_id, row.observation_date, row.observation_date);
    }
    for row in &state.cdm.specimens {
        widen(row.person_id, row.specimen_date, row.specimen_date);
    }
    for row in &state.cdm.drug_exposures {
        widen(
            row.person_id,
            row.drug_exposure_start_date,
            row.drug_exposure_end_date,
        );
    }

    let input = envelopes.len();
    let mut person_ids: Vec<i64> = envelopes.keys().copied().collect();
    person_ids.sort_unstable();
    let mut rows = Vec::with_capacity(input);
    for person_id in person_ids {
        let (start, end) = envelopes[&person_id];
        rows.push(ObservationPeriod {
            observation_period_id: state.keys.next_id("observation_period"),
            person_id,
            observation_period_start_date: start,
            observation_period_end_date: end,
            period_type_concept_id: TYPE_EHR,
            provenance: Provenance::new(
                "observation_period",
                "visit_occurrence",
                None,
                format!("observation_period:{person_id}"),
            ),
        });
    }

    let emitted = rows.len();
    state.cdm.observation_periods = rows;
    state.record_audit("observation_period", input, emitted);
    Ok(())
}
