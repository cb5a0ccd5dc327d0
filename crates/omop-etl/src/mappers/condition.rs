//! Conditions: billed ICD diagnoses, plus the 30-day-gap condition
//! era derivation.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use omop_ingest::frame::{column_i64, column_opt_string};
use omop_model::{ConditionEra, MappedFact, Provenance, Result, TargetDomain};
use omop_vocab::{Resolution, VocabularyStore};
use tracing::info;

use crate::concepts::TYPE_EHR_BILLING;
use crate::mappers::row_provenance;
use crate::state::EtlState;

/// ICD codes are stored dotless in the extract but dotted in the
/// vocabulary; try the raw code first, then the dotted form.
pub fn resolve_icd(store: &VocabularyStore, vocabulary_id: &str, code: &str) -> Resolution {
    let direct = store.resolve(vocabulary_id, code);
    if direct.source_concept_id != 0 {
        return direct;
    }
    if code.len() > 3 && !code.contains('.') {
        let dotted = format!("{}.{}", &code[..3], &code[3..]);
        return store.resolve(vocabulary_id, &dotted);
    }
    direct
}

pub fn icd_vocabulary(version: i64, procedure: bool) -> Option<&'static str> {
    match (version, procedure) {
        (9, false) => Some("ICD9CM"),
        (10, false) => Some("ICD10CM"),
        (9, true) => Some("ICD9Proc"),
        (10, true) => Some("ICD10PCS"),
        _ => None,
    }
}

/// Diagnoses carry no event time of their own; they are dated by
/// their admission's discharge.
pub fn migrate(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let Some(diagnoses) = state.arena.maybe("diagnoses_icd").cloned() else {
        return Ok(());
    };

    let input = diagnoses.height();
    let mut emitted = 0usize;
    for idx in 0..input {
        let Some(subject_id) = column_i64(&diagnoses, "subject_id", idx) else {
            continue;
        };
        let Some(hadm_id) = column_i64(&diagnoses, "hadm_id", idx) else {
            continue;
        };
        let Some(code) = column_opt_string(&diagnoses, "icd_code", idx) else {
            continue;
        };
        let version = column_i64(&diagnoses, "icd_version", idx).unwrap_or(0);
        let Some(vocabulary_id) = icd_vocabulary(version, false) else {
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
        let at = span.dischtime;

        let resolution = resolve_icd(store, vocabulary_id, code.trim());
        let target_domain =
            TargetDomain::from_domain_id(resolution.target_domain_id.as_deref(), TargetDomain::Condition);
        let mut fact = MappedFact::new(
            subject_id,
            Some(hadm_id),
            at,
            TYPE_EHR_BILLING,
            target_domain,
            row_provenance(&diagnoses, "diagnoses_icd", idx, "cond.diagnoses_icd"),
        );
        fact.source_code = Some(code.trim().to_string());
        fact.source_vocabulary_id = Some(vocabulary_id.to_string());
        fact.source_concept_id = resolution.source_concept_id;
        fact.target_concept_id = resolution.target_concept_id;
        state.facts.push(fact);
        emitted += 1;
    }

    info!(input, emitted, "mapped diagnoses");
    state.record_audit("condition.diagnoses", input, emitted);
    Ok(())
}

/// Merge each person's occurrences of a condition concept into eras,
/// bridging gaps of up to 30 days.
pub fn migrate_condition_era(state: &mut EtlState) -> Result<()> {
    let mut by_group: BTreeMap<(i64, i64), Vec<NaiveDate>> = BTreeMap::new();
    for row in &state.cdm.condition_occurrences {
        if row.condition_concept_id == 0 {
            continue;
        }
        by_group
            .entry((row.person_id, row.condition_concept_id))
            .or_default()
            .push(row.condition_start_date);
    }

    let input = state.cdm.condition_occurrences.len();
    let mut rows = Vec::new();
    for ((person_id, condition_concept_id), mut dates) in by_group {
        dates.sort_unstable();
        let mut start = dates[0];
        let mut end = dates[0];
        let mut count = 0i64;
        for date in dates {
            if date - end > Duration::days(30) {
                rows.push(era_row(state, person_id, condition_concept_id, start, end, count));
                start = date;
                count = 0;
            }
            end = end.max(date);
            count += 1;
        }
        rows.push(era_row(state, person_id, condition_concept_id, start, end, count));
    }

    let emitted = rows.len();
    state.cdm.condition_eras = rows;
    state.record_audit("condition_era", input, emitted);
    Ok(())
}

fn era_row(
    state: &mut EtlState,
    person_id: i64,
    condition_concept_id: i64,
    start: NaiveDate,
    end: NaiveDate,
    count: i64,
) -> ConditionEra {
    ConditionEra {
        condition_era_id: state.keys.next_id("condition_era"),
        person_id,
        condition_concept_id,
        condition_era_start_date: start,
        condition_era_end_date: end,
        condition_occurrence_count: count,
        provenance: Provenance::new(
            "condition_era",
            "condition_occurrence",
            None,
            format!("condition_era:{person_id}:{condition_concept_id}:{start}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icd_vocabularies() {
        assert_eq!(icd_vocabulary(9, false), Some("ICD9CM"));
        assert_eq!(icd_vocabulary(10, true), Some("ICD10PCS"));
        assert_eq!(icd_vocabulary(11, false), None);
    }
}
