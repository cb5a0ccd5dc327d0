//! Fact routing: one dispatch step from [`MappedFact`] to the CDM
//! table its resolved target domain selects.
//!
//! Finalize joins are intentionally inner: a fact whose subject has no
//! Person row (or whose admission never became a visit) is dropped,
//! and the drop is counted in the stage audit rather than swallowed.

use omop_model::{
    ConditionOccurrence, DeviceExposure, DrugExposure, MappedFact, Measurement, Observation,
    ProcedureOccurrence, Specimen, TargetDomain,
};
use tracing::info;

use crate::concepts::operator_concept_id;
use crate::state::{EtlState, FactLink, visit_key, visit_key_by_date};

/// Route every pending fact with the given target domain into its CDM
/// table. Facts for other domains stay queued for their own finalize
/// stage.
pub fn finalize_domain(state: &mut EtlState, domain: TargetDomain, stage: &str) {
    let pending = std::mem::take(&mut state.facts);
    let (matched, rest): (Vec<MappedFact>, Vec<MappedFact>) =
        pending.into_iter().partition(|f| f.target_domain == domain);
    state.facts = rest;

    let input_rows = matched.len();
    let mut emitted = 0usize;
    for fact in matched {
        if route_fact(state, &fact) {
            emitted += 1;
        }
    }
    info!(stage, input_rows, emitted, "finalized domain");
    state.record_audit(stage, input_rows, emitted);
}

fn resolve_visit(state: &EtlState, fact: &MappedFact) -> Option<i64> {
    if let Some(key) = visit_key(fact.subject_id, fact.hadm_id) {
        return state.visit_id(&key);
    }
    if fact.visit_key_date_fallback {
        return state.visit_id(&visit_key_by_date(fact.subject_id, fact.start_datetime.date()));
    }
    None
}

fn route_fact(state: &mut EtlState, fact: &MappedFact) -> bool {
    // Inner join to Person: unresolvable subjects never enter the CDM.
    let Some(person_id) = state.person_id(fact.subject_id) else {
        return false;
    };
    let visit_occurrence_id = resolve_visit(state, fact);

    if let Some(link) = &fact.link_trace_id {
        state.fact_links.push(FactLink {
            trace_id: fact.provenance.trace_id.clone(),
            link_trace_id: link.clone(),
        });
    }

    match fact.target_domain {
        TargetDomain::Measurement => {
            let row = measurement_row(state, fact, person_id, visit_occurrence_id);
            state.cdm.measurements.push(row);
        }
        TargetDomain::Condition => {
            let row = condition_row(state, fact, person_id, visit_occurrence_id);
            state.cdm.condition_occurrences.push(row);
        }
        TargetDomain::Procedure => {
            let row = procedure_row(state, fact, person_id, visit_occurrence_id);
            state.cdm.procedure_occurrences.push(row);
        }
        TargetDomain::Observation => {
            let row = observation_row(state, fact, person_id, visit_occurrence_id);
            state.cdm.observations.push(row);
        }
        TargetDomain::Specimen => {
            let row = specimen_row(state, fact, person_id);
            state.cdm.specimens.push(row);
        }
        TargetDomain::Device => {
            let row = device_row(state, fact, person_id, visit_occurrence_id);
            state.cdm.device_exposures.push(row);
        }
        TargetDomain::Drug => {
            let row = drug_row(state, fact, person_id, visit_occurrence_id);
            state.cdm.drug_exposures.push(row);
        }
    }
    true
}

fn fact_operator_concept(fact: &MappedFact) -> Option<i64> {
    fact.value
        .operator_concept_id
        .or_else(|| fact.value.operator_source_value.as_deref().and_then(operator_concept_id))
}

fn measurement_row(
    state: &mut EtlState,
    fact: &MappedFact,
    person_id: i64,
    visit_occurrence_id: Option<i64>,
) -> Measurement {
    Measurement {
        measurement_id: state.keys.next_id("measurement"),
        person_id,
        measurement_concept_id: fact.target_concept_id,
        measurement_date: fact.start_datetime.date(),
        measurement_datetime: Some(fact.start_datetime),
        measurement_type_concept_id: fact.type_concept_id,
        operator_concept_id: fact_operator_concept(fact),
        value_as_number: fact.value.value_as_number,
        value_as_concept_id: fact.value.value_as_concept_id,
        unit_concept_id: fact.value.unit_concept_id,
        range_low: fact.value.range_low,
        range_high: fact.value.range_high,
        provider_id: None,
        visit_occurrence_id,
        visit_detail_id: None,
        measurement_source_value: fact.source_code.clone(),
        measurement_source_concept_id: fact.source_concept_id,
        unit_source_value: fact.value.unit_source_value.clone(),
        value_source_value: fact.value.value_source_value.clone(),
        provenance: fact.provenance.clone(),
    }
}

fn condition_row(
    state: &mut EtlState,
    fact: &MappedFact,
    person_id: i64,
    visit_occurrence_id: Option<i64>,
) -> ConditionOccurrence {
    ConditionOccurrence {
        condition_occurrence_id: state.keys.next_id("condition_occurrence"),
        person_id,
        condition_concept_id: fact.target_concept_id,
        condition_start_date: fact.start_datetime.date(),
        condition_start_datetime: Some(fact.start_datetime),
        condition_end_date: None,
        condition_end_datetime: None,
        condition_type_concept_id: fact.type_concept_id,
        stop_reason: None,
        provider_id: None,
        visit_occurrence_id,
        visit_detail_id: None,
        condition_source_value: fact.source_code.clone(),
        condition_source_concept_id: fact.source_concept_id,
        condition_status_source_value: None,
        condition_status_concept_id: 0,
        provenance: fact.provenance.clone(),
    }
}

fn procedure_row(
    state: &mut EtlState,
    fact: &MappedFact,
    person_id: i64,
    visit_occurrence_id: Option<i64>,
) -> ProcedureOccurrence {
    ProcedureOccurrence {
        procedure_occurrence_id: state.keys.next_id("procedure_occurrence"),
        person_id,
        procedure_concept_id: fact.target_concept_id,
        procedure_date: fact.start_datetime.date(),
        procedure_datetime: Some(fact.start_datetime),
        procedure_type_concept_id: fact.type_concept_id,
        modifier_concept_id: 0,
        quantity: fact.quantity.map(|q| q as i64),
        provider_id: None,
        visit_occurrence_id,
        visit_detail_id: None,
        procedure_source_value: fact.source_code.clone(),
        procedure_source_concept_id: fact.source_concept_id,
        modifier_source_value: None,
        provenance: fact.provenance.clone(),
    }
}

fn observation_row(
    state: &mut EtlState,
    fact: &MappedFact,
    person_id: i64,
    visit_occurrence_id: Option<i64>,
) -> Observation {
    Observation {
        observation_id: state.keys.next_id("observation"),
        person_id,
        observation_concept_id: fact.target_concept_id,
        observation_date: fact.start_datetime.date(),
        observation_datetime: Some(fact.start_datetime),
        observation_type_concept_id: fact.type_concept_id,
        value_as_number: fact.value.value_as_number,
        value_as_string: fact.value.value_as_string.clone(),
        value_as_concept_id: fact.value.value_as_concept_id,
        qualifier_concept_id: None,
        unit_concept_id: fact.value.unit_concept_id,
        provider_id: None,
        visit_occurrence_id,
        visit_detail_id: None,
        observation_source_value: fact.source_code.clone(),
        observation_source_concept_id: fact.source_concept_id,
        unit_source_value: fact.value.unit_source_value.clone(),
        qualifier_source_value: None,
        provenance: fact.provenance.clone(),
    }
}

fn specimen_row(state: &mut EtlState, fact: &MappedFact, person_id: i64) -> Specimen {
    Specimen {
        specimen_id: state.keys.next_id("specimen"),
        person_id,
        specimen_concept_id: fact.target_concept_id,
        specimen_type_concept_id: fact.type_concept_id,
        specimen_date: fact.start_datetime.date(),
        specimen_datetime: Some(fact.start_datetime),
        quantity: fact.quantity,
        unit_concept_id: fact.value.unit_concept_id,
        anatomic_site_concept_id: 0,
        disease_status_concept_id: 0,
        specimen_source_id: fact.link_trace_id.clone(),
        specimen_source_value: fact.source_code.clone(),
        unit_source_value: fact.value.unit_source_value.clone(),
        anatomic_site_source_value: None,
        disease_status_source_value: None,
        provenance: fact.provenance.clone(),
    }
}

fn device_row(
    state: &mut EtlState,
    fact: &MappedFact,
    person_id: i64,
    visit_occurrence_id: Option<i64>,
) -> DeviceExposure {
    DeviceExposure {
        device_exposure_id: state.keys.next_id("device_exposure"),
        person_id,
        device_concept_id: fact.target_concept_id,
        device_exposure_start_date: fact.start_datetime.date(),
        device_exposure_start_datetime: Some(fact.start_datetime),
        device_exposure_end_date: None,
        device_exposure_end_datetime: None,
        device_type_concept_id: fact.type_concept_id,
        unique_device_id: None,
        quantity: fact.quantity.map(|q| q as i64),
        provider_id: None,
        visit_occurrence_id,
        visit_detail_id: None,
        device_source_value: fact.source_code.clone(),
        device_source_concept_id: fact.source_concept_id,
        provenance: fact.provenance.clone(),
    }
}

fn drug_row(
    state: &mut EtlState,
    fact: &MappedFact,
    person_id: i64,
    visit_occurrence_id: Option<i64>,
) -> DrugExposure {
    let detail = fact.drug.clone().unwrap_or_default();
    let end_datetime = detail.end_datetime.unwrap_or(fact.start_datetime);
    DrugExposure {
        drug_exposure_id: state.keys.next_id("drug_exposure"),
        person_id,
        drug_concept_id: fact.target_concept_id,
        drug_exposure_start_date: fact.start_datetime.date(),
        drug_exposure_start_datetime: Some(fact.start_datetime),
        drug_exposure_end_date: end_datetime.date(),
        drug_exposure_end_datetime: Some(end_datetime),
        verbatim_end_date: detail.end_datetime.map(|dt| dt.date()),
        drug_type_concept_id: fact.type_concept_id,
        stop_reason: detail.stop_reason,
        refills: detail.refills,
        quantity: fact.quantity,
        days_supply: detail.days_supply,
        sig: detail.sig,
        route_concept_id: detail.route_concept_id.unwrap_or(0),
        lot_number: None,
        provider_id: None,
        visit_occurrence_id,
        visit_detail_id: None,
        drug_source_value: fact.source_code.clone(),
        drug_source_concept_id: fact.source_concept_id,
        route_source_value: detail.route_source_value,
        dose_unit_source_value: detail.dose_unit_source_value,
        provenance: fact.provenance.clone(),
    }
}
