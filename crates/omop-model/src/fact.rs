//! The mapped-fact intermediate representation.
//!
//! Each source mapper resolves its rows into [`MappedFact`] values
//! tagged with a [`TargetDomain`]; one routing step then dispatches
//! every fact to the CDM table its resolved domain selects. This is
//! the single place where multi-domain fan-out happens.

use chrono::NaiveDateTime;

use crate::provenance::Provenance;

/// CDM table family a resolved fact is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetDomain {
    Measurement,
    Condition,
    Procedure,
    Observation,
    Specimen,
    Device,
    Drug,
}

impl TargetDomain {
    /// Map a vocabulary `domain_id` onto a routable target, falling
    /// back to the mapper's default when the domain is absent or not
    /// a fact table (e.g. `Meas Value`).
    pub fn from_domain_id(domain_id: Option<&str>, default: TargetDomain) -> TargetDomain {
        match domain_id {
            Some("Measurement") => TargetDomain::Measurement,
            Some("Condition") => TargetDomain::Condition,
            Some("Procedure") => TargetDomain::Procedure,
            Some("Observation") => TargetDomain::Observation,
            Some("Specimen") => TargetDomain::Specimen,
            Some("Device") => TargetDomain::Device,
            Some("Drug") => TargetDomain::Drug,
            _ => default,
        }
    }

    /// OMOP domain concept id, used by fact_relationship rows.
    pub fn domain_concept_id(self) -> i64 {
        match self {
            TargetDomain::Measurement => 21,
            TargetDomain::Condition => 19,
            TargetDomain::Procedure => 10,
            TargetDomain::Observation => 27,
            TargetDomain::Specimen => 36,
            TargetDomain::Device => 17,
            TargetDomain::Drug => 13,
        }
    }
}

/// Value/unit/operator block shared by measurement-like facts.
#[derive(Debug, Clone, Default)]
pub struct FactValue {
    pub value_source_value: Option<String>,
    pub value_as_number: Option<f64>,
    pub value_as_string: Option<String>,
    pub value_as_concept_id: Option<i64>,
    pub unit_source_value: Option<String>,
    pub unit_concept_id: Option<i64>,
    pub operator_source_value: Option<String>,
    pub operator_concept_id: Option<i64>,
    pub range_low: Option<f64>,
    pub range_high: Option<f64>,
}

/// Drug-exposure specific payload.
#[derive(Debug, Clone, Default)]
pub struct DrugDetail {
    pub end_datetime: Option<NaiveDateTime>,
    pub stop_reason: Option<String>,
    pub refills: Option<i64>,
    pub days_supply: Option<i64>,
    pub sig: Option<String>,
    pub route_concept_id: Option<i64>,
    pub route_source_value: Option<String>,
    pub dose_unit_source_value: Option<String>,
}

/// One resolved source fact, ready for routing into a CDM table.
#[derive(Debug, Clone)]
pub struct MappedFact {
    pub subject_id: i64,
    pub hadm_id: Option<i64>,
    pub start_datetime: NaiveDateTime,
    pub type_concept_id: i64,
    pub source_code: Option<String>,
    pub source_vocabulary_id: Option<String>,
    /// 0 when the source code had no vocabulary entry.
    pub source_concept_id: i64,
    pub target_domain: TargetDomain,
    /// 0 when no standard, non-invalid "Maps to" target was found.
    pub target_concept_id: i64,
    pub quantity: Option<f64>,
    pub value: FactValue,
    pub drug: Option<DrugDetail>,
    /// Sibling trace ids for fact_relationship linkage
    /// (specimen <- organism <- antibiotic).
    pub link_trace_id: Option<String>,
    /// When the visit key cannot use hadm_id, fall back to the event
    /// date (specimen rows collected outside any admission).
    pub visit_key_date_fallback: bool,
    pub provenance: Provenance,
}

impl MappedFact {
    /// Fact skeleton with unresolved concepts and empty payloads.
    pub fn new(
        subject_id: i64,
        hadm_id: Option<i64>,
        start_datetime: NaiveDateTime,
        type_concept_id: i64,
        target_domain: TargetDomain,
        provenance: Provenance,
    ) -> Self {
        Self {
            subject_id,
            hadm_id,
            start_datetime,
            type_concept_id,
            source_code: None,
            source_vocabulary_id: None,
            source_concept_id: 0,
            target_domain,
            target_concept_id: 0,
            quantity: None,
            value: FactValue::default(),
            drug: None,
            link_trace_id: None,
            visit_key_date_fallback: false,
            provenance,
        }
    }
}
