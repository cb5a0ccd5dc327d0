//! Microbiology: one raw row fans out into up to three nested facts —
//! the specimen, the test/organism result, and the antibiotic
//! susceptibility — linked by representative trace ids so the
//! FactRelationship stage can rebuild the hierarchy.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use omop_ingest::frame::{column_datetime, column_f64, column_i64, column_opt_string, column_string};
use omop_model::{FactValue, MappedFact, Result, TargetDomain};
use omop_vocab::VocabularyStore;
use tracing::info;

use crate::concepts::TYPE_LAB;
use crate::mappers::row_provenance;
use crate::state::EtlState;

pub const SPECIMEN_VOCABULARY: &str = "mimiciv_micro_specimen";
pub const TEST_VOCABULARY: &str = "mimiciv_micro_test";
pub const ORGANISM_VOCABULARY: &str = "mimiciv_micro_organism";
pub const ANTIBIOTIC_VOCABULARY: &str = "mimiciv_micro_antibiotic";
pub const RESISTANCE_VOCABULARY: &str = "mimiciv_micro_resistance";

struct MicroRow {
    idx: usize,
    subject_id: i64,
    hadm_id: Option<i64>,
    at: NaiveDateTime,
    spec_itemid: i64,
    test_itemid: Option<i64>,
    org_itemid: Option<i64>,
    ab_itemid: Option<i64>,
    trace_id: String,
}

fn specimen_key(row: &MicroRow) -> String {
    format!(
        "{}|{}|{}|{}",
        row.subject_id,
        row.hadm_id.map(|h| h.to_string()).unwrap_or_default(),
        row.at,
        row.spec_itemid
    )
}

fn organism_key(row: &MicroRow) -> String {
    format!(
        "{}|{}|{}",
        specimen_key(row),
        row.test_itemid.map(|t| t.to_string()).unwrap_or_default(),
        row.org_itemid.map(|o| o.to_string()).unwrap_or_default()
    )
}

/// Representative trace per partition: the ascending-first trace_id.
fn representatives<'a>(
    rows: &'a [MicroRow],
    key: impl Fn(&MicroRow) -> String,
) -> BTreeMap<String, &'a MicroRow> {
    let mut map: BTreeMap<String, &MicroRow> = BTreeMap::new();
    for row in rows {
        map.entry(key(row))
            .and_modify(|current| {
                if row.trace_id < current.trace_id {
                    *current = row;
                }
            })
            .or_insert(row);
    }
    map
}

pub fn migrate(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let Some(micro) = state.arena.maybe("microbiologyevents").cloned() else {
        return Ok(());
    };

    let mut rows = Vec::with_capacity(micro.height());
    for idx in 0..micro.height() {
        let Some(subject_id) = column_i64(&micro, "subject_id", idx) else {
            continue;
        };
        let at = column_datetime(&micro, "charttime", idx)
            .or_else(|| column_datetime(&micro, "chartdate", idx));
        let Some(at) = at else {
            continue;
        };
        let Some(spec_itemid) = column_i64(&micro, "spec_itemid", idx) else {
            continue;
        };
        let hadm_id =
            column_i64(&micro, "hadm_id", idx).or_else(|| state.admissions.infer(subject_id, at));
        rows.push(MicroRow {
            idx,
            subject_id,
            hadm_id,
            at,
            spec_itemid,
            test_itemid: column_i64(&micro, "test_itemid", idx),
            org_itemid: column_i64(&micro, "org_itemid", idx),
            ab_itemid: column_i64(&micro, "ab_itemid", idx),
            trace_id: column_string(&micro, "trace_id", idx),
        });
    }

    let input = micro.height();
    let mut emitted = 0usize;

    // Specimen level.
    let specimen_reps = representatives(&rows, specimen_key);
    for rep in specimen_reps.values() {
        let resolution = store.resolve(SPECIMEN_VOCABULARY, &rep.spec_itemid.to_string());
        let mut fact = MappedFact::new(
            rep.subject_id,
            rep.hadm_id,
            rep.at,
            TYPE_LAB,
            TargetDomain::Specimen,
            row_provenance(&micro, "microbiologyevents", rep.idx, "micro.specimen"),
        );
        fact.source_code = Some(rep.spec_itemid.to_string());
        fact.source_vocabulary_id = Some(SPECIMEN_VOCABULARY.to_string());
        fact.source_concept_id = resolution.source_concept_id;
        fact.target_concept_id = resolution.target_concept_id;
        fact.value.value_source_value = column_opt_string(&micro, "spec_type_desc", rep.idx);
        fact.visit_key_date_fallback = true;
        state.facts.push(fact);
        emitted += 1;
    }

    // Test/organism level.
    let organism_reps = representatives(&rows, organism_key);
    for rep in organism_reps.values() {
        let Some(test_itemid) = rep.test_itemid else {
            continue;
        };
        let specimen_trace = specimen_reps
            .get(&specimen_key(rep))
            .map(|s| s.trace_id.clone());
        let test = store.resolve(TEST_VOCABULARY, &test_itemid.to_string());
        let organism = rep
            .org_itemid
            .map(|org| store.resolve(ORGANISM_VOCABULARY, &org.to_string()));

        let mut fact = MappedFact::new(
            rep.subject_id,
            rep.hadm_id,
            rep.at,
            TYPE_LAB,
            TargetDomain::from_domain_id(test.target_domain_id.as_deref(), TargetDomain::Measurement),
            row_provenance(&micro, "microbiologyevents", rep.idx, "micro.organism"),
        );
        fact.source_code = Some(test_itemid.to_string());
        fact.source_vocabulary_id = Some(TEST_VOCABULARY.to_string());
        fact.source_concept_id = test.source_concept_id;
        fact.target_concept_id = test.target_concept_id;
        fact.value = FactValue {
            value_source_value: column_opt_string(&micro, "org_name", rep.idx),
            value_as_concept_id: organism.map(|o| o.target_concept_id),
            ..FactValue::default()
        };
        fact.link_trace_id = specimen_trace;
        fact.visit_key_date_fallback = true;
        state.facts.push(fact);
        emitted += 1;
    }

    // Antibiotic level: no aggregation, one fact per tested antibiotic.
    for row in &rows {
        let Some(ab_itemid) = row.ab_itemid else {
            continue;
        };
        let organism_trace = organism_reps
            .get(&organism_key(row))
            .map(|o| o.trace_id.clone());
        let antibiotic = store.resolve(ANTIBIOTIC_VOCABULARY, &ab_itemid.to_string());
        let interpretation = column_opt_string(&micro, "interpretation", row.idx);
        let resistance = interpretation
            .as_deref()
            .map(|i| store.resolve(RESISTANCE_VOCABULARY, i));

        let mut fact = MappedFact::new(
            row.subject_id,
            row.hadm_id,
            row.at,
            TYPE_LAB,
            TargetDomain::Measurement,
            row_provenance(&micro, "microbiologyevents", row.idx, "micro.antibiotic"),
        );
        fact.source_code = Some(ab_itemid.to_string());
        fact.source_vocabulary_id = Some(ANTIBIOTIC_VOCABULARY.to_string());
        fact.source_concept_id = antibiotic.source_concept_id;
        fact.target_concept_id = antibiotic.target_concept_id;
        fact.value = FactValue {
            value_source_value: column_opt_string(&micro, "dilution_text", row.idx),
            value_as_number: column_f64(&micro, "dilution_value", row.idx),
            value_as_concept_id: resistance.map(|r| r.target_concept_id),
            operator_source_value: column_opt_string(&micro, "dilution_comparison", row.idx)
                .map(|op| op.trim().to_string()),
            ..FactValue::default()
        };
        fact.link_trace_id = organism_trace;
        fact.visit_key_date_fallback = true;
        state.facts.push(fact);
        emitted += 1;
    }

    info!(input, emitted, "mapped microbiology");
    state.record_audit("measurement.micro", input, emitted);
    Ok(())
}
