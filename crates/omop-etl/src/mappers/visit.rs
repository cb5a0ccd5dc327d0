//! Visits: hospital admissions (and emergency-department stays)
//! become VisitOccurrence rows; ward transfers become VisitDetail.

use chrono::NaiveDateTime;
use omop_ingest::frame::{column_datetime, column_i64, column_opt_string, column_string};
use omop_model::{Provenance, Result, VisitDetail, VisitOccurrence};

use crate::clean::AdmissionSpan;
use crate::concepts::{TYPE_EHR, VISIT_EMERGENCY, VISIT_INPATIENT};
use crate::mappers::row_provenance;
use crate::state::{EtlState, visit_key, visit_key_by_date};

/// A visit awaiting surrogate keys. Parts 1 and 2 collect these; the
/// VisitOccurrence stage orders and finalizes them.
#[derive(Debug, Clone)]
pub struct VisitCandidate {
    pub subject_id: i64,
    pub hadm_id: Option<i64>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub visit_concept_id: i64,
    pub source_value: String,
    pub admitting_source_value: Option<String>,
    pub discharge_to_source_value: Option<String>,
    pub provenance: Provenance,
}

/// Part 1: one candidate per hospital admission, plus the admission
/// interval index later stages use for hadm inference.
pub fn migrate_part1(state: &mut EtlState) -> Result<()> {
    let admissions = state.arena.get("visit.part1", "admissions")?.clone();
    let mut candidates = Vec::with_capacity(admissions.height());
    for idx in 0..admissions.height() {
        let Some(subject_id) = column_i64(&admissions, "subject_id", idx) else {
            continue;
        };
        let Some(hadm_id) = column_i64(&admissions, "hadm_id", idx) else {
            continue;
        };
        let Some(admittime) = column_datetime(&admissions, "admittime", idx) else {
            continue;
        };
        let Some(dischtime) = column_datetime(&admissions, "dischtime", idx) else {
            continue;
        };
        state.admissions.insert(
            subject_id,
            AdmissionSpan {
                hadm_id,
                admittime,
                dischtime,
            },
        );

        let admission_type = column_string(&admissions, "admission_type", idx);
        let visit_concept_id = if admission_type.to_uppercase().contains("EMER") {
            VISIT_EMERGENCY
        } else {
            VISIT_INPATIENT
        };
        candidates.push(VisitCandidate {
            subject_id,
            hadm_id: Some(hadm_id),
            start: admittime,
            end: dischtime,
            visit_concept_id,
            source_value: hadm_id.to_string(),
            admitting_source_value: column_opt_string(&admissions, "admission_location", idx),
            discharge_to_source_value: column_opt_string(&admissions, "discharge_location", idx),
            provenance: row_provenance(&admissions, "admissions", idx, "visit.admissions"),
        });
    }
    let emitted = candidates.len();
    state.visit_candidates.extend(candidates);
    state.record_audit("visit.part1", admissions.height(), emitted);
    Ok(())
}

/// Part 2: emergency-department registrations that precede an
/// admission become their own short visits.
pub fn migrate_part2(state: &mut EtlState) -> Result<()> {
    let admissions = state.arena.get("visit.part2", "admissions")?.clone();
    let mut candidates = Vec::new();
    for idx in 0..admissions.height() {
        let Some(subject_id) = column_i64(&admissions, "subject_id", idx) else {
            continue;
        };
        let Some(edregtime) = column_datetime(&admissions, "edregtime", idx) else {
            continue;
        };
        let edouttime = column_datetime(&admissions, "edouttime", idx).unwrap_or(edregtime);
        candidates.push(VisitCandidate {
            subject_id,
            hadm_id: None,
            start: edregtime,
            end: edouttime,
            visit_concept_id: VISIT_EMERGENCY,
            source_value: format!("ED|{subject_id}|{edregtime}"),
            admitting_source_value: None,
            discharge_to_source_value: None,
            provenance: row_provenance(&admissions, "admissions", idx, "visit.ed"),
        });
    }
    let emitted = candidates.len();
    state.visit_candidates.extend(candidates);
    state.record_audit("visit.part2", admissions.height(), emitted);
    Ok(())
}

/// Assign surrogate keys in (subject, start) order, chain preceding
/// visits, and register the composite visit keys finalize joins use.
pub fn migrate_visit_occurrence(state: &mut EtlState) -> Result<()> {
    let mut candidates = std::mem::take(&mut state.visit_candidates);
    candidates.sort_by(|a, b| {
        (a.subject_id, a.start, a.hadm_id).cmp(&(b.subject_id, b.start, b.hadm_id))
    });

    let input = candidates.len();
    let mut rows = Vec::with_capacity(input);
    let mut previous: Option<(i64, i64)> = None;
    for candidate in candidates {
        let Some(person_id) = state.person_id(candidate.subject_id) else {
            continue;
        };
        let visit_occurrence_id = state.keys.next_id("visit_occurrence");
        let preceding_visit_occurrence_id = match previous {
            Some((subject, id)) if subject == candidate.subject_id => Some(id),
            _ => None,
        };
        previous = Some((candidate.subject_id, visit_occurrence_id));

        if let Some(key) = visit_key(candidate.subject_id, candidate.hadm_id) {
            state.visit_keys.insert(key, visit_occurrence_id);
            // Date keys cover facts that can only be linked by day
            // (events recorded without an admission id).
            let mut date = candidate.start.date();
            loop {
                state
                    .visit_keys
                    .entry(visit_key_by_date(candidate.subject_id, date))
                    .or_insert(visit_occurrence_id);
                if date >= candidate.end.date() {
                    break;
                }
                match date.succ_opt() {
                    Some(next) => date = next,
                    None => break,
                }
            }
        }

        rows.push(VisitOccurrence {
            visit_occurrence_id,
            person_id,
            visit_concept_id: candidate.visit_concept_id,
            visit_start_date: candidate.start.date(),
            visit_start_datetime: Some(candidate.start),
            visit_end_date: candidate.end.date(),
            visit_end_datetime: Some(candidate.end),
            visit_type_concept_id: TYPE_EHR,
            provider_id: None,
            care_site_id: None,
            visit_source_value: candidate.source_value,
            visit_source_concept_id: 0,
            admitting_source_concept_id: 0,
            admitting_source_value: candidate.admitting_source_value,
            discharge_to_concept_id: 0,
            discharge_to_source_value: candidate.discharge_to_source_value,
            preceding_visit_occurrence_id,
            provenance: candidate.provenance,
        });
    }

    let emitted = rows.len();
    state.cdm.visit_occurrences = rows;
    state.record_audit("visit_occurrence", input, emitted);
    Ok(())
}

/// Ward transfers with a care unit become visit details of their
/// admission's visit.
pub fn migrate_visit_detail(state: &mut EtlState) -> Result<()> {
    let transfers = state.arena.get("visit_detail", "transfers")?.clone();

    struct DetailRow {
        subject_id: i64,
        hadm_id: i64,
        careunit: String,
        intime: NaiveDateTime,
        outtime: NaiveDateTime,
        idx: usize,
    }
    let mut details = Vec::new();
    for idx in 0..transfers.height() {
        let Some(subject_id) = column_i64(&transfers, "subject_id", idx) else {
            continue;
        };
        let Some(hadm_id) = column_i64(&transfers, "hadm_id", idx) else {
            continue;
        };
        let Some(careunit) = column_opt_string(&transfers, "careunit", idx) else {
            continue;
        };
        let Some(intime) = column_datetime(&transfers, "intime", idx) else {
            continue;
        };
        let outtime = column_datetime(&transfers, "outtime", idx).unwrap_or(intime);
        details.push(DetailRow {
            subject_id,
            hadm_id,
            careunit,
            intime,
            outtime,
            idx,
        });
    }
    details.sort_by_key(|d| (d.subject_id, d.hadm_id, d.intime));

    let input = details.len();
    let mut rows = Vec::with_capacity(input);
    let mut previous: Option<(i64, i64)> = None;
    for detail in details {
        let Some(person_id) = state.person_id(detail.subject_id) else {
            continue;
        };
        let key = visit_key(detail.subject_id, Some(detail.hadm_id))
            .and_then(|k| state.visit_id(&k));
        let Some(visit_occurrence_id) = key else {
            continue;
        };
        let visit_detail_id = state.keys.next_id("visit_detail");
        let preceding_visit_detail_id = match previous {
            Some((hadm, id)) if hadm == detail.hadm_id => Some(id),
            _ => None,
        };
        previous = Some((detail.hadm_id, visit_detail_id));

        rows.push(VisitDetail {
            visit_detail_id,
            person_id,
            visit_detail_concept_id: VISIT_INPATIENT,
            visit_detail_start_date: detail.intime.date(),
            visit_detail_start_datetime: Some(detail.intime),
            visit_detail_end_date: detail.outtime.date(),
            visit_detail_end_datetime: Some(detail.outtime),
            visit_detail_type_concept_id: TYPE_EHR,
            provider_id: None,
            care_site_id: state.care_site_keys.get(&detail.careunit).copied(),
            visit_detail_source_value: detail.careunit.clone(),
            visit_detail_source_concept_id: 0,
            admitting_source_concept_id: 0,
            admitting_source_value: None,
            discharge_to_concept_id: 0,
            discharge_to_source_value: None,
            preceding_visit_detail_id,
            visit_detail_parent_id: None,
            visit_occurrence_id,
            provenance: row_provenance(&transfers, "transfers", detail.idx, "visit_detail.transfers"),
        });
    }

    let emitted = rows.len();
    state.cdm.visit_details = rows;
    state.record_audit("visit_detail", input, emitted);
    Ok(())
}
