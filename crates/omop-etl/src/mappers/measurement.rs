//! Measurement mappers: unit resolution, chart events and lab events.

use std::collections::HashMap;

use omop_ingest::frame::{
    column_datetime, column_f64, column_i64, column_opt_string, column_string,
};
use omop_model::{FactValue, MappedFact, Result, TargetDomain};
use omop_vocab::VocabularyStore;
use tracing::info;

use crate::clean::{decompose_value_unit, extract_number, extract_operator, plausible_temperature};
use crate::concepts::{TYPE_EHR, TYPE_LAB};
use crate::config::EtlConfig;
use crate::mappers::row_provenance;
use crate::state::EtlState;

pub const UNIT_VOCABULARIES: &[&str] = &["mimiciv_meas_unit", "UCUM"];
pub const CHART_ITEM_VOCABULARY: &str = "mimiciv_meas_chart";
pub const CHART_VALUE_VOCABULARY: &str = "mimiciv_meas_chartevents_value";
pub const LAB_ITEM_VOCABULARY: &str = "mimiciv_meas_lab_loinc";

/// Resolve every distinct unit string seen in the fact tables once,
/// so per-row lookups are map hits.
pub fn migrate_units(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let mut units: Vec<String> = Vec::new();
    for table in ["labevents", "chartevents"] {
        let Some(frame) = state.arena.maybe(table) else {
            continue;
        };
        for idx in 0..frame.height() {
            if let Some(unit) = column_opt_string(frame, "valueuom", idx) {
                let unit = unit.trim().to_string();
                if !unit.is_empty() && !units.contains(&unit) {
                    units.push(unit);
                }
            }
        }
    }

    let input = units.len();
    for unit in units {
        let resolution = store.resolve_in(UNIT_VOCABULARIES, &unit);
        state
            .unit_concepts
            .insert(unit, resolution.target_concept_id);
    }
    state.record_audit("measurement.units", input, input);
    Ok(())
}

fn unit_concept(state: &EtlState, unit: Option<&str>) -> Option<i64> {
    // Unit concept is only attached when a source unit exists at all.
    let unit = unit?.trim();
    if unit.is_empty() {
        return None;
    }
    Some(state.unit_concepts.get(unit).copied().unwrap_or(0))
}

/// Chart events: itemid lookup plus free-text value lookup. A value
/// that resolves to a Condition-domain concept re-routes the whole
/// row; resolved Meas Value concepts land in `value_as_concept_id`.
pub fn migrate_chartevents(
    state: &mut EtlState,
    store: &VocabularyStore,
    config: &EtlConfig,
) -> Result<()> {
    let Some(chartevents) = state.arena.maybe("chartevents").cloned() else {
        return Ok(());
    };
    let d_items = state.arena.get("measurement.chartevents", "d_items")?;
    let mut labels: HashMap<i64, String> = HashMap::new();
    for idx in 0..d_items.height() {
        if let Some(itemid) = column_i64(d_items, "itemid", idx) {
            labels.insert(itemid, column_string(d_items, "label", idx));
        }
    }

    let range = config.temperature_range();
    let input = chartevents.height();
    let mut emitted = 0usize;
    for idx in 0..input {
        let Some(subject_id) = column_i64(&chartevents, "subject_id", idx) else {
            continue;
        };
        let Some(charttime) = column_datetime(&chartevents, "charttime", idx) else {
            continue;
        };
        let hadm_id = column_i64(&chartevents, "hadm_id", idx)
            .or_else(|| state.admissions.infer(subject_id, charttime));
        let itemid = column_i64(&chartevents, "itemid", idx).unwrap_or(0);
        let label = labels.get(&itemid).cloned().unwrap_or_default();

        let raw_value = column_string(&chartevents, "value", idx);
        let mut value_as_number = column_f64(&chartevents, "valuenum", idx);
        let mut unit_source_value = column_opt_string(&chartevents, "valueuom", idx);
        // Free-text repair overrides the stored numeric/unit columns.
        if let Some((number, unit)) = decompose_value_unit(&raw_value) {
            value_as_number = Some(number);
            unit_source_value = Some(unit);
        }

        if label.to_lowercase().contains("temperature") {
            let Some(value) = value_as_number else {
                continue;
            };
            match plausible_temperature(value, unit_source_value.as_deref(), &range) {
                Some(celsius) => value_as_number = Some(celsius),
                None => continue,
            }
        }

        let item = store.resolve(CHART_ITEM_VOCABULARY, &itemid.to_string());
        let value_lookup = if raw_value.trim().is_empty() {
            None
        } else {
            let r = store.resolve(CHART_VALUE_VOCABULARY, raw_value.trim());
            (r.source_concept_id != 0).then_some(r)
        };

        // Free-text values resolving into the Condition domain carry
        // the whole row there; everything else stays a measurement
        // with the value concept attached.
        let (target_domain, value_as_concept_id) = match &value_lookup {
            Some(r) if r.target_domain_id.as_deref() == Some("Condition") => {
                (TargetDomain::Condition, None)
            }
            Some(r) => (
                TargetDomain::from_domain_id(item.target_domain_id.as_deref(), TargetDomain::Measurement),
                Some(r.target_concept_id),
            ),
            None => (
                TargetDomain::from_domain_id(item.target_domain_id.as_deref(), TargetDomain::Measurement),
                None,
            ),
        };

        let mut fact = MappedFact::new(
            subject_id,
            hadm_id,
            charttime,
            TYPE_EHR,
            target_domain,
            row_provenance(&chartevents, "chartevents", idx, "meas.chartevents"),
        );
        fact.source_code = Some(itemid.to_string());
        fact.source_vocabulary_id = Some(CHART_ITEM_VOCABULARY.to_string());
        fact.source_concept_id = item.source_concept_id;
        fact.target_concept_id = match target_domain {
            TargetDomain::Condition => value_lookup.as_ref().map(|r| r.target_concept_id).unwrap_or(0),
            _ => item.target_concept_id,
        };
        fact.value = FactValue {
            value_source_value: (!raw_value.trim().is_empty()).then(|| raw_value.clone()),
            value_as_number,
            value_as_string: None,
            value_as_concept_id,
            unit_concept_id: unit_concept(state, unit_source_value.as_deref()),
            unit_source_value,
            operator_source_value: None,
            operator_concept_id: None,
            range_low: None,
            range_high: None,
        };
        state.facts.push(fact);
        emitted += 1;
    }

    info!(input, emitted, "mapped chartevents");
    state.record_audit("measurement.chartevents", input, emitted);
    Ok(())
}

/// Lab events: LOINC when the lab item dictionary carries a code,
/// otherwise the fuzzy-built custom lab vocabulary; operator and
/// numeric extraction from the free-text value.
pub fn migrate_labevents(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let Some(labevents) = state.arena.maybe("labevents").cloned() else {
        return Ok(());
    };
    let d_labitems = state.arena.get("measurement.labevents", "d_labitems")?;
    let mut loinc_codes: HashMap<i64, Option<String>> = HashMap::new();
    for idx in 0..d_labitems.height() {
        if let Some(itemid) = column_i64(d_labitems, "itemid", idx) {
            loinc_codes.insert(itemid, column_opt_string(d_labitems, "loinc_code", idx));
        }
    }

    let input = labevents.height();
    let mut emitted = 0usize;
    for idx in 0..input {
        let Some(subject_id) = column_i64(&labevents, "subject_id", idx) else {
            continue;
        };
        let Some(charttime) = column_datetime(&labevents, "charttime", idx) else {
            continue;
        };
        let hadm_id = column_i64(&labevents, "hadm_id", idx)
            .or_else(|| state.admissions.infer(subject_id, charttime));
        let itemid = column_i64(&labevents, "itemid", idx).unwrap_or(0);

        let resolution = match loinc_codes.get(&itemid) {
            Some(Some(loinc)) => store.resolve("LOINC", loinc),
            _ => store.resolve(LAB_ITEM_VOCABULARY, &itemid.to_string()),
        };
        let raw_value = column_string(&labevents, "value", idx);
        let value_as_number =
            column_f64(&labevents, "valuenum", idx).or_else(|| extract_number(&raw_value));
        let operator = extract_operator(&raw_value);
        let unit_source_value = column_opt_string(&labevents, "valueuom", idx)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        let target_domain =
            TargetDomain::from_domain_id(resolution.target_domain_id.as_deref(), TargetDomain::Measurement);
        let mut fact = MappedFact::new(
            subject_id,
            hadm_id,
            charttime,
            TYPE_LAB,
            target_domain,
            row_provenance(&labevents, "labevents", idx, "meas.labevents"),
        );
        fact.source_code = match loinc_codes.get(&itemid) {
            Some(Some(loinc)) => Some(loinc.clone()),
            _ => Some(itemid.to_string()),
        };
        fact.source_vocabulary_id = match loinc_codes.get(&itemid) {
            Some(Some(_)) => Some("LOINC".to_string()),
            _ => Some(LAB_ITEM_VOCABULARY.to_string()),
        };
        fact.source_concept_id = resolution.source_concept_id;
        fact.target_concept_id = resolution.target_concept_id;
        fact.value = FactValue {
            value_source_value: (!raw_value.trim().is_empty()).then(|| raw_value.clone()),
            value_as_number,
            value_as_string: None,
            value_as_concept_id: None,
            unit_concept_id: unit_concept(state, unit_source_value.as_deref()),
            unit_source_value,
            operator_source_value: operator.map(str::to_string),
            operator_concept_id: None,
            range_low: column_f64(&labevents, "ref_range_lower", idx),
            range_high: column_f64(&labevents, "ref_range_upper", idx),
        };
        state.facts.push(fact);
        emitted += 1;
    }

    info!(input, emitted, "mapped labevents");
    state.record_audit("measurement.labevents", input, emitted);
    Ok(())
}
