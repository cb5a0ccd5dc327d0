//! Run state threaded through every pipeline stage.

use std::collections::HashMap;

use omop_model::{
    CareSite, CdmSource, ConditionEra, ConditionOccurrence, Death, DeviceExposure, DoseEra,
    DrugEra, DrugExposure, FactRelationship, KeyGenerator, Location, MappedFact, Measurement,
    Observation, ObservationPeriod, Person, ProcedureOccurrence, Specimen, VisitDetail,
    VisitOccurrence,
};
use omop_ingest::StagingArena;
use tracing::warn;

use crate::clean::AdmissionIndex;

/// The CDM working tables a run accumulates. Unload projects these
/// onto their documented column lists.
#[derive(Debug, Default)]
pub struct CdmTables {
    pub persons: Vec<Person>,
    pub locations: Vec<Location>,
    pub care_sites: Vec<CareSite>,
    pub deaths: Vec<Death>,
    pub visit_occurrences: Vec<VisitOccurrence>,
    pub visit_details: Vec<VisitDetail>,
    pub condition_occurrences: Vec<ConditionOccurrence>,
    pub procedure_occurrences: Vec<ProcedureOccurrence>,
    pub drug_exposures: Vec<DrugExposure>,
    pub device_exposures: Vec<DeviceExposure>,
    pub measurements: Vec<Measurement>,
    pub observations: Vec<Observation>,
    pub specimens: Vec<Specimen>,
    pub fact_relationships: Vec<FactRelationship>,
    pub observation_periods: Vec<ObservationPeriod>,
    pub condition_eras: Vec<ConditionEra>,
    pub drug_eras: Vec<DrugEra>,
    pub dose_eras: Vec<DoseEra>,
    pub cdm_source: Vec<CdmSource>,
}

/// Input vs emitted row counts per stage. Referential misses drop
/// rows by design; the audit keeps that loss visible.
#[derive(Debug, Clone)]
pub struct StageAudit {
    pub stage: String,
    pub input_rows: usize,
    pub emitted_rows: usize,
    pub dropped_rows: usize,
}

/// Mutable state owned by one run: the staging arena, the surrogate
/// key generator, the accumulated mapped facts awaiting routing, the
/// CDM tables, and the person/visit key indexes finalize joins use.
#[derive(Debug, Default)]
pub struct EtlState {
    pub arena: StagingArena,
    pub keys: KeyGenerator,
    pub facts: Vec<MappedFact>,
    pub cdm: CdmTables,
    pub audits: Vec<StageAudit>,
    pub admissions: AdmissionIndex,
    /// subject_id → person_id (surrogate).
    pub person_keys: HashMap<i64, i64>,
    /// `"<subject>|<hadm>"` (or date fallback) → visit_occurrence_id.
    pub visit_keys: HashMap<String, i64>,
    /// care unit name → care_site_id.
    pub care_site_keys: HashMap<String, i64>,
    /// Trimmed source unit string → unit concept id.
    pub unit_concepts: HashMap<String, i64>,
    /// subject_id → (anchor_year, anchor_age), for age-window filters.
    pub anchors: HashMap<i64, (i64, i64)>,
    /// Visit candidates collected by the visit part 1/2 stages,
    /// consumed by the VisitOccurrence stage.
    pub visit_candidates: Vec<crate::mappers::visit::VisitCandidate>,
    /// Trace-id pairs recorded at routing time for facts that linked
    /// to a sibling fact (organism → specimen, antibiotic → organism).
    pub fact_links: Vec<FactLink>,
}

/// One directed trace-id link between two routed facts.
#[derive(Debug, Clone)]
pub struct FactLink {
    pub trace_id: String,
    pub link_trace_id: String,
}

impl EtlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_audit(&mut self, stage: &str, input_rows: usize, emitted_rows: usize) {
        let dropped_rows = input_rows.saturating_sub(emitted_rows);
        if dropped_rows > 0 {
            warn!(stage, input_rows, emitted_rows, dropped_rows, "stage dropped rows");
        }
        self.audits.push(StageAudit {
            stage: stage.to_string(),
            input_rows,
            emitted_rows,
            dropped_rows,
        });
    }

    pub fn person_id(&self, subject_id: i64) -> Option<i64> {
        self.person_keys.get(&subject_id).copied()
    }

    pub fn visit_id(&self, visit_key: &str) -> Option<i64> {
        self.visit_keys.get(visit_key).copied()
    }
}

/// Composite visit key: admissions key on `subject|hadm`, keyless
/// facts (specimens outside any admission) fall back to the event
/// date.
pub fn visit_key(subject_id: i64, hadm_id: Option<i64>) -> Option<String> {
    hadm_id.map(|hadm| format!("{subject_id}|{hadm}"))
}

pub fn visit_key_by_date(subject_id: i64, date: chrono::NaiveDate) -> String {
    format!("{subject_id}|{date}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_counts_drops() {
        let mut state = EtlState::new();
        state.record_audit("measurement", 10, 7);
        let audit = &state.audits[0];
        assert_eq!(audit.dropped_rows, 3);
    }

    #[test]
    fn visit_keys_compose() {
        assert_eq!(visit_key(10, Some(100)).as_deref(), Some("10|100"));
        assert_eq!(visit_key(10, None), None);
        let date = chrono::NaiveDate::from_ymd_opt(2150, 1, 3).unwrap();
        assert_eq!(visit_key_by_date(10, date), "10|2150-01-03");
    }
}
