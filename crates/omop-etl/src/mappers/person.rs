//! Person: demographics from the patients table, race/ethnicity from
//! each subject's first admission.

use std::collections::{HashMap, HashSet};

use omop_ingest::frame::{column_datetime, column_i64, column_opt_string, column_string};
use omop_model::{Person, Result};
use omop_vocab::VocabularyStore;
use tracing::info;

use crate::concepts::{GENDER_FEMALE, GENDER_MALE};
use crate::mappers::row_provenance;
use crate::state::EtlState;

struct EthnicityMapping {
    source_concept_id: i64,
    target_concept_id: i64,
    target_vocabulary_id: String,
}

/// Match the raw admission ethnicity against Race/Ethnicity concepts
/// by code (case-insensitive), then follow "Maps to" to a standard
/// target. The target's vocabulary decides whether the value fills
/// the race or the ethnicity slot.
fn lookup_ethnicity(store: &VocabularyStore, raw: &str) -> Option<EthnicityMapping> {
    let wanted = raw.trim().to_uppercase();
    let source = store.concepts().iter().find(|c| {
        (c.domain_id == "Race" || c.domain_id == "Ethnicity")
            && c.concept_code.to_uppercase() == wanted
    })?;
    let target = store.standard_targets(source.concept_id).first().copied();
    Some(EthnicityMapping {
        source_concept_id: source.concept_id,
        target_concept_id: target.map(|t| t.concept_id).unwrap_or(0),
        target_vocabulary_id: target.map(|t| t.vocabulary_id.clone()).unwrap_or_default(),
    })
}

pub fn migrate(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let admissions = state.arena.get("person", "admissions")?;

    // First admission's ethnicity per subject, admit time ascending.
    let mut first_ethnicity: HashMap<i64, (chrono::NaiveDateTime, String)> = HashMap::new();
    for idx in 0..admissions.height() {
        let Some(subject_id) = column_i64(admissions, "subject_id", idx) else {
            continue;
        };
        let Some(admittime) = column_datetime(admissions, "admittime", idx) else {
            continue;
        };
        let ethnicity = column_string(admissions, "ethnicity", idx);
        match first_ethnicity.get(&subject_id) {
            Some((at, _)) if *at <= admittime => {}
            _ => {
                first_ethnicity.insert(subject_id, (admittime, ethnicity));
            }
        }
    }

    let patients = state.arena.get("person", "patients")?.clone();
    let mut rows = Vec::with_capacity(patients.height());
    for idx in 0..patients.height() {
        let Some(subject_id) = column_i64(&patients, "subject_id", idx) else {
            continue;
        };
        let gender = column_string(&patients, "gender", idx);
        let gender_concept_id = match gender.as_str() {
            "F" => GENDER_FEMALE,
            "M" => GENDER_MALE,
            _ => 0,
        };
        let anchor_year = column_i64(&patients, "anchor_year", idx).unwrap_or(0);
        let anchor_age = column_i64(&patients, "anchor_age", idx).unwrap_or(0);
        state.anchors.insert(subject_id, (anchor_year, anchor_age));

        let ethnicity_first = first_ethnicity.get(&subject_id).map(|(_, e)| e.clone());
        let mapping = ethnicity_first
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .and_then(|e| lookup_ethnicity(store, e));
        let is_ethnicity = mapping
            .as_ref()
            .map(|m| m.target_vocabulary_id == "Ethnicity")
            .unwrap_or(false);

        let (race_concept_id, race_source_value, race_source_concept_id) = if is_ethnicity {
            (0, None, 0)
        } else {
            (
                mapping.as_ref().map(|m| m.target_concept_id).unwrap_or(0),
                ethnicity_first.clone(),
                mapping.as_ref().map(|m| m.source_concept_id).unwrap_or(0),
            )
        };
        let (ethnicity_concept_id, ethnicity_source_value, ethnicity_source_concept_id) =
            if is_ethnicity {
                (
                    mapping.as_ref().map(|m| m.target_concept_id).unwrap_or(0),
                    ethnicity_first.clone(),
                    mapping.as_ref().map(|m| m.source_concept_id).unwrap_or(0),
                )
            } else {
                (0, None, 0)
            };

        let person_id = state.keys.next_id("person");
        state.person_keys.insert(subject_id, person_id);
        rows.push(Person {
            person_id,
            gender_concept_id,
            year_of_birth: anchor_year,
            month_of_birth: None,
            day_of_birth: None,
            birth_datetime: None,
            race_concept_id,
            ethnicity_concept_id,
            location_id: state.cdm.locations.first().map(|l| l.location_id),
            provider_id: None,
            care_site_id: None,
            person_source_value: subject_id.to_string(),
            gender_source_value: column_opt_string(&patients, "gender", idx),
            gender_source_concept_id: 0,
            race_source_value,
            race_source_concept_id,
            ethnicity_source_value,
            ethnicity_source_concept_id,
            provenance: row_provenance(&patients, "patients", idx, "person.patients"),
        });
    }

    let input = patients.height();
    let emitted = rows.len();
    state.cdm.persons = rows;
    state.record_audit("person", input, emitted);
    info!(persons = emitted, "mapped persons");
    Ok(())
}

/// Person-final: keep only persons covered by an observation period.
/// Facts for the removed persons were already dropped by the inner
/// finalize joins.
pub fn migrate_final(state: &mut EtlState) -> Result<()> {
    let covered: HashSet<i64> = state
        .cdm
        .observation_periods
        .iter()
        .map(|op| op.person_id)
        .collect();
    let input = state.cdm.persons.len();
    state.cdm.persons.retain(|p| covered.contains(&p.person_id));
    let emitted = state.cdm.persons.len();
    state
        .person_keys
        .retain(|_, person_id| covered.contains(person_id));
    state.record_audit("person.final", input, emitted);
    Ok(())
}
