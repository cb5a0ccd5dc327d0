//! The collect step of the custom vocabulary build: fuzzy-match raw
//! source terms against a filtered concept pool and produce the
//! mapping rows the builder allocates ids for.

use chrono::NaiveDate;
use omop_model::{CustomMapping, MAPPED_FROM, MAPS_TO, Result};
use tracing::info;

use crate::matcher::FuzzyConceptMatcher;
use crate::store::VocabularyStore;

/// One source value needing a standard target. `code` is the key the
/// mappers resolve by (an item id, a unit string); `label` is the
/// human text the matcher scores. For free-text vocabularies the two
/// coincide.
#[derive(Debug, Clone)]
pub struct SourceTerm {
    pub code: String,
    pub label: String,
}

impl SourceTerm {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }

    /// A term whose code is its own label (units, chart values).
    pub fn verbatim(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            code: value.clone(),
            label: value,
        }
    }
}

/// One fuzzy-match request: the terms needing standard targets, the
/// custom vocabulary they will live in, and the concept pool to match
/// against.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub terms: Vec<SourceTerm>,
    pub source_vocabulary_id: String,
    pub source_domain_id: String,
    pub source_concept_class_id: String,
    pub pool_vocabulary_id: String,
    pub pool_domain_id: String,
    pub pool_concept_class_id: String,
    /// Disambiguating suffix appended to every query, e.g.
    /// "antibiotic" when matching antibiotic names against drug
    /// ingredients.
    pub key_phrase: Option<String>,
}

fn mapping_valid_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn mapping_valid_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 12, 31).unwrap_or_default()
}

/// Run every request against the store and return the mapping rows,
/// ids unassigned. Terms are trimmed, deduplicated by code and sorted,
/// so equal inputs always collect equal output. Codes the store
/// already maps in the request's source vocabulary are skipped;
/// re-runs only collect what is new.
///
/// A request whose pool is empty fails the whole collection: silently
/// matching against nothing would flood the vocabulary with garbage.
pub fn collect_mappings(
    store: &VocabularyStore,
    requests: &[MatchRequest],
) -> Result<Vec<CustomMapping>> {
    let mut mappings = Vec::new();
    for request in requests {
        let matcher = FuzzyConceptMatcher::for_pool(
            store,
            &request.pool_vocabulary_id,
            &request.pool_domain_id,
            &request.pool_concept_class_id,
            request.key_phrase.as_deref(),
        )?;

        let mut terms: Vec<SourceTerm> = request
            .terms
            .iter()
            .map(|t| SourceTerm::new(t.code.trim(), t.label.trim()))
            .filter(|t| !t.code.is_empty() && !t.label.is_empty())
            .collect();
        terms.sort_by(|a, b| a.code.cmp(&b.code));
        terms.dedup_by(|a, b| a.code == b.code);

        let mut collected = 0usize;
        for term in terms {
            if store
                .concept_by_code(&request.source_vocabulary_id, &term.code)
                .is_some()
            {
                continue;
            }
            let outcome = matcher.best_match(&term.label);
            mappings.push(CustomMapping {
                source_concept_id: 0,
                concept_name: term.label,
                source_domain_id: request.source_domain_id.clone(),
                source_vocabulary_id: request.source_vocabulary_id.clone(),
                source_concept_class_id: request.source_concept_class_id.clone(),
                standard_concept: None,
                concept_code: term.code,
                valid_start_date: mapping_valid_start(),
                valid_end_date: mapping_valid_end(),
                invalid_reason: None,
                relationship_id: MAPS_TO.to_string(),
                reverse_relationship_id: MAPPED_FROM.to_string(),
                invalid_reason_cr: None,
                relationship_valid_start_date: mapping_valid_start(),
                relationship_end_date: mapping_valid_end(),
                target_concept_id: outcome.concept_id,
            });
            collected += 1;
        }
        info!(
            source_vocabulary_id = %request.source_vocabulary_id,
            pool_vocabulary_id = %request.pool_vocabulary_id,
            collected,
            "collected custom mappings"
        );
    }
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use omop_model::{Concept, EtlError, StandardConcept};

    use super::*;

    fn pool_concept(id: i64, name: &str) -> Concept {
        Concept {
            concept_id: id,
            concept_name: name.to_string(),
            domain_id: "Unit".to_string(),
            vocabulary_id: "UCUM".to_string(),
            concept_class_id: "Unit".to_string(),
            standard_concept: Some(StandardConcept::Standard),
            concept_code: name.to_string(),
            valid_start_date: mapping_valid_start(),
            valid_end_date: mapping_valid_end(),
            invalid_reason: None,
        }
    }

    fn unit_request(values: &[&str]) -> MatchRequest {
        MatchRequest {
            terms: values.iter().map(|v| SourceTerm::verbatim(*v)).collect(),
            source_vocabulary_id: "mimiciv_meas_unit".to_string(),
            source_domain_id: "Unit".to_string(),
            source_concept_class_id: "Unit".to_string(),
            pool_vocabulary_id: "UCUM".to_string(),
            pool_domain_id: "Unit".to_string(),
            pool_concept_class_id: "Unit".to_string(),
            key_phrase: None,
        }
    }

    #[test]
    fn collection_is_deterministic() {
        let mut store = VocabularyStore::new();
        store.add_concept(pool_concept(8840, "milligram per deciliter"));
        store.add_concept(pool_concept(8876, "millimeter mercury column"));

        let request = unit_request(&["mmHg ", "mg/dL", "", "mg/dL"]);
        let first = collect_mappings(&store, &[request.clone()]).unwrap();
        let second = collect_mappings(&store, &[request]).unwrap();

        assert_eq!(first.len(), 2);
        // Sorted by code, trimmed, deduplicated.
        assert_eq!(first[0].concept_code, "mg/dL");
        assert_eq!(first[1].concept_code, "mmHg");
        let targets: Vec<i64> = first.iter().map(|m| m.target_concept_id).collect();
        let again: Vec<i64> = second.iter().map(|m| m.target_concept_id).collect();
        assert_eq!(targets, again);
    }

    #[test]
    fn item_terms_match_by_label_but_key_by_code() {
        let mut store = VocabularyStore::new();
        let mut glucose = pool_concept(3000963, "Glucose serum or plasma");
        glucose.domain_id = "Measurement".to_string();
        glucose.vocabulary_id = "LOINC".to_string();
        glucose.concept_class_id = "Lab Test".to_string();
        store.add_concept(glucose);

        let request = MatchRequest {
            terms: vec![SourceTerm::new("50931", "Glucose")],
            source_vocabulary_id: "mimiciv_meas_lab_loinc".to_string(),
            source_domain_id: "Measurement".to_string(),
            source_concept_class_id: "Lab Test".to_string(),
            pool_vocabulary_id: "LOINC".to_string(),
            pool_domain_id: "Measurement".to_string(),
            pool_concept_class_id: "Lab Test".to_string(),
            key_phrase: None,
        };
        let collected = collect_mappings(&store, &[request]).unwrap();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].concept_code, "50931");
        assert_eq!(collected[0].concept_name, "Glucose");
        assert_eq!(collected[0].target_concept_id, 3000963);
    }

    #[test]
    fn already_mapped_codes_are_skipped() {
        let mut store = VocabularyStore::new();
        store.add_concept(pool_concept(8840, "milligram per deciliter"));
        let mut existing = pool_concept(2_100_000_001, "mg/dL");
        existing.vocabulary_id = "mimiciv_meas_unit".to_string();
        store.add_concept(existing);

        let collected = collect_mappings(&store, &[unit_request(&["mg/dL", "new unit"])]).unwrap();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].concept_code, "new unit");
    }

    #[test]
    fn empty_pool_aborts_collection() {
        let store = VocabularyStore::new();
        let err = collect_mappings(&store, &[unit_request(&["mg/dL"])]).unwrap_err();
        assert!(matches!(err, EtlError::NoMatchCandidates { .. }));
    }
}
