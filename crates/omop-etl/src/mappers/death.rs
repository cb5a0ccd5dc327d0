//! Death: the earliest in-hospital death time per subject, falling
//! back to the patients table date of death.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use omop_ingest::frame::{column_datetime, column_i64};
use omop_model::{Death, Result};

use crate::concepts::TYPE_EHR;
use crate::mappers::row_provenance;
use crate::state::EtlState;

pub fn migrate(state: &mut EtlState) -> Result<()> {
    let admissions = state.arena.get("death", "admissions")?;
    let mut deathtimes: HashMap<i64, (NaiveDateTime, usize)> = HashMap::new();
    for idx in 0..admissions.height() {
        let Some(subject_id) = column_i64(admissions, "subject_id", idx) else {
            continue;
        };
        let Some(deathtime) = column_datetime(admissions, "deathtime", idx) else {
            continue;
        };
        match deathtimes.get(&subject_id) {
            Some((at, _)) if *at <= deathtime => {}
            _ => {
                deathtimes.insert(subject_id, (deathtime, idx));
            }
        }
    }

    let patients = state.arena.get("death", "patients")?.clone();
    let admissions = state.arena.get("death", "admissions")?.clone();
    let mut input = 0usize;
    let mut rows = Vec::new();
    for idx in 0..patients.height() {
        let Some(subject_id) = column_i64(&patients, "subject_id", idx) else {
            continue;
        };
        let hospital_death = deathtimes.get(&subject_id).copied();
        let dod = column_datetime(&patients, "dod", idx);
        let Some(death_datetime) = hospital_death.map(|(at, _)| at).or(dod) else {
            continue;
        };
        input += 1;
        let Some(person_id) = state.person_id(subject_id) else {
            continue;
        };
        let provenance = match hospital_death {
            Some((_, adm_idx)) => {
                row_provenance(&admissions, "admissions", adm_idx, "death.admissions")
            }
            None => row_provenance(&patients, "patients", idx, "death.patients"),
        };
        rows.push(Death {
            person_id,
            death_date: death_datetime.date(),
            death_datetime: Some(death_datetime),
            death_type_concept_id: TYPE_EHR,
            cause_concept_id: 0,
            cause_source_value: None,
            cause_source_concept_id: 0,
            provenance,
        });
    }

    let emitted = rows.len();
    state.cdm.deaths = rows;
    state.record_audit("death", input, emitted);
    Ok(())
}
