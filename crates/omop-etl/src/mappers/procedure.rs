//! Procedures: billed HCPCS/CPT4 events, coded ICD procedures, and
//! ordered bedside procedures from procedureevents/datetimeevents.

use chrono::Datelike;
use omop_ingest::frame::{column_datetime, column_f64, column_i64, column_opt_string};
use omop_model::{MappedFact, Result, TargetDomain};
use omop_vocab::VocabularyStore;
use tracing::info;

use crate::concepts::{TYPE_EHR_BILLING, TYPE_EHR_ORDER};
use crate::mappers::condition::{icd_vocabulary, resolve_icd};
use crate::mappers::row_provenance;
use crate::state::EtlState;

pub const PROC_ITEM_VOCABULARY: &str = "mimiciv_proc_itemid";
pub const DATETIME_ITEM_VOCABULARY: &str = "mimiciv_proc_datetimeevents";

pub fn migrate_lookup(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    migrate_hcpcs(state, store)?;
    migrate_icd_procedures(state, store)?;
    migrate_procedureevents(state, store)?;
    migrate_datetimeevents(state, store)?;
    Ok(())
}

/// HCPCS events carry no time of their own; they are dated by their
/// admission's discharge.
fn migrate_hcpcs(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let Some(hcpcs) = state.arena.maybe("hcpcsevents").cloned() else {
        return Ok(());
    };
    let input = hcpcs.height();
    let mut emitted = 0usize;
    for idx in 0..input {
        let Some(subject_id) = column_i64(&hcpcs, "subject_id", idx) else {
            continue;
        };
        let Some(hadm_id) = column_i64(&hcpcs, "hadm_id", idx) else {
            continue;
        };
        let Some(code) = column_opt_string(&hcpcs, "hcpcs_cd", idx) else {
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

        let resolution = store.resolve_in(&["HCPCS", "CPT4"], code.trim());
        let target_domain = TargetDomain::from_domain_id(
            resolution.target_domain_id.as_deref(),
            TargetDomain::Procedure,
        );
        let mut fact = MappedFact::new(
            subject_id,
            Some(hadm_id),
            at,
            TYPE_EHR_BILLING,
            target_domain,
            row_provenance(&hcpcs, "hcpcsevents", idx, "proc.hcpcsevents"),
        );
        fact.source_code = Some(code.trim().to_string());
        fact.source_vocabulary_id = Some("HCPCS".to_string());
        fact.source_concept_id = resolution.source_concept_id;
        fact.target_concept_id = resolution.target_concept_id;
        state.facts.push(fact);
        emitted += 1;
    }
    state.record_audit("procedure.hcpcsevents", input, emitted);
    Ok(())
}

fn migrate_icd_procedures(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let Some(procedures) = state.arena.maybe("procedures_icd").cloned() else {
        return Ok(());
    };
    let input = procedures.height();
    let mut emitted = 0usize;
    for idx in 0..input {
        let Some(subject_id) = column_i64(&procedures, "subject_id", idx) else {
            continue;
        };
        let hadm_id = column_i64(&procedures, "hadm_id", idx);
        let Some(code) = column_opt_string(&procedures, "icd_code", idx) else {
            continue;
        };
        let version = column_i64(&procedures, "icd_version", idx).unwrap_or(0);
        let Some(vocabulary_id) = icd_vocabulary(version, true) else {
            continue;
        };
        let at = column_datetime(&procedures, "chartdate", idx).or_else(|| {
            hadm_id.and_then(|h| {
                state
                    .admissions
                    .spans(subject_id)
                    .iter()
                    .find(|s| s.hadm_id == h)
                    .map(|s| s.dischtime)
            })
        });
        let Some(at) = at else {
            continue;
        };

        let resolution = resolve_icd(store, vocabulary_id, code.trim());
        let target_domain = TargetDomain::from_domain_id(
            resolution.target_domain_id.as_deref(),
            TargetDomain::Procedure,
        );
        let mut fact = MappedFact::new(
            subject_id,
            hadm_id,
            at,
            TYPE_EHR_BILLING,
            target_domain,
            row_provenance(&procedures, "procedures_icd", idx, "proc.procedures_icd"),
        );
        fact.source_code = Some(code.trim().to_string());
        fact.source_vocabulary_id = Some(vocabulary_id.to_string());
        fact.source_concept_id = resolution.source_concept_id;
        fact.target_concept_id = resolution.target_concept_id;
        state.facts.push(fact);
        emitted += 1;
    }
    state.record_audit("procedure.procedures_icd", input, emitted);
    Ok(())
}

/// Ordered bedside procedures; cancelled orders are dropped.
fn migrate_procedureevents(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let Some(events) = state.arena.maybe("procedureevents").cloned() else {
        return Ok(());
    };
    let input = events.height();
    let mut emitted = 0usize;
    for idx in 0..input {
        let Some(subject_id) = column_i64(&events, "subject_id", idx) else {
            continue;
        };
        if column_i64(&events, "cancelreason", idx).unwrap_or(0) > 0 {
            continue;
        }
        let Some(starttime) = column_datetime(&events, "starttime", idx) else {
            continue;
        };
        let hadm_id = column_i64(&events, "hadm_id", idx)
            .or_else(|| state.admissions.infer(subject_id, starttime));
        let itemid = column_i64(&events, "itemid", idx).unwrap_or(0);

        let resolution = store.resolve(PROC_ITEM_VOCABULARY, &itemid.to_string());
        let target_domain = TargetDomain::from_domain_id(
            resolution.target_domain_id.as_deref(),
            TargetDomain::Procedure,
        );
        let mut fact = MappedFact::new(
            subject_id,
            hadm_id,
            starttime,
            TYPE_EHR_ORDER,
            target_domain,
            row_provenance(&events, "procedureevents", idx, "proc.procedureevents"),
        );
        fact.source_code = Some(itemid.to_string());
        fact.source_vocabulary_id = Some(PROC_ITEM_VOCABULARY.to_string());
        fact.source_concept_id = resolution.source_concept_id;
        fact.target_concept_id = resolution.target_concept_id;
        fact.quantity = column_f64(&events, "value", idx);
        state.facts.push(fact);
        emitted += 1;
    }
    state.record_audit("procedure.procedureevents", input, emitted);
    Ok(())
}

/// Datetime-valued chart items whose value is the procedure time.
/// Values dated before the subject's plausible lifetime (shifted
/// anchor window) are discarded as entry errors.
fn migrate_datetimeevents(state: &mut EtlState, store: &VocabularyStore) -> Result<()> {
    let Some(events) = state.arena.maybe("datetimeevents").cloned() else {
        return Ok(());
    };
    let input = events.height();
    let mut emitted = 0usize;
    for idx in 0..input {
        let Some(subject_id) = column_i64(&events, "subject_id", idx) else {
            continue;
        };
        let Some(value) = column_opt_string(&events, "value", idx) else {
            continue;
        };
        let Some(at) = omop_ingest::frame::parse_datetime(&value) else {
            continue;
        };
        if let Some(&(anchor_year, anchor_age)) = state.anchors.get(&subject_id) {
            if i64::from(at.date().year()) < anchor_year - anchor_age - 1 {
                continue;
            }
        }
        let hadm_id = column_i64(&events, "hadm_id", idx)
            .or_else(|| state.admissions.infer(subject_id, at));
        let itemid = column_i64(&events, "itemid", idx).unwrap_or(0);

        let resolution = store.resolve(DATETIME_ITEM_VOCABULARY, &itemid.to_string());
        let target_domain = TargetDomain::from_domain_id(
            resolution.target_domain_id.as_deref(),
            TargetDomain::Procedure,
        );
        let mut fact = MappedFact::new(
            subject_id,
            hadm_id,
            at,
            TYPE_EHR_ORDER,
            target_domain,
            row_provenance(&events, "datetimeevents", idx, "proc.datetimeevents"),
        );
        fact.source_code = Some(itemid.to_string());
        fact.source_vocabulary_id = Some(DATETIME_ITEM_VOCABULARY.to_string());
        fact.source_concept_id = resolution.source_concept_id;
        fact.target_concept_id = resolution.target_concept_id;
        state.facts.push(fact);
        emitted += 1;
    }
    info!(input, emitted, "mapped datetimeevents");
    state.record_audit("procedure.datetimeevents", input, emitted);
    Ok(())
}
