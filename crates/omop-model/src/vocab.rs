//! Vocabulary reference types.
//!
//! Shapes mirror the Athena vocabulary download files (concept,
//! concept_relationship, vocabulary, domain, concept_class,
//! relationship, concept_synonym, concept_ancestor, drug_strength).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reference concepts live below this id.
pub const REFERENCE_CONCEPT_ID_CEILING: i64 = 2_000_000_000;

/// Custom concepts are allocated strictly above this id.
pub const CUSTOM_CONCEPT_ID_FLOOR: i64 = 2_100_000_000;

/// Custom vocabulary concept ids are allocated from this disjoint range.
pub const CUSTOM_VOCABULARY_CONCEPT_ID_FLOOR: i64 = 2_110_000_001;

/// The "No matching concept" sentinel. Never a valid concept.
pub const CONCEPT_ID_NO_MATCH: i64 = 0;

/// Canonical source-to-standard resolution relationship.
pub const MAPS_TO: &str = "Maps to";

/// Reverse edge synthesized for every custom mapping.
pub const MAPPED_FROM: &str = "Mapped from";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StandardConcept {
    #[serde(rename = "S")]
    Standard,
    #[serde(rename = "C")]
    Classification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    #[serde(rename = "D")]
    Deleted,
    #[serde(rename = "U")]
    Updated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub concept_id: i64,
    pub concept_name: String,
    pub domain_id: String,
    pub vocabulary_id: String,
    pub concept_class_id: String,
    pub standard_concept: Option<StandardConcept>,
    pub concept_code: String,
    pub valid_start_date: NaiveDate,
    pub valid_end_date: NaiveDate,
    pub invalid_reason: Option<InvalidReason>,
}

impl Concept {
    /// A concept is standard iff it is flagged `S` and not invalidated.
    pub fn is_standard(&self) -> bool {
        self.standard_concept == Some(StandardConcept::Standard) && self.invalid_reason.is_none()
    }

    pub fn is_custom(&self) -> bool {
        self.concept_id > CUSTOM_CONCEPT_ID_FLOOR
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptRelationship {
    pub concept_id_1: i64,
    pub concept_id_2: i64,
    pub relationship_id: String,
    pub valid_start_date: NaiveDate,
    pub valid_end_date: NaiveDate,
    pub invalid_reason: Option<InvalidReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    pub vocabulary_id: String,
    pub vocabulary_name: String,
    pub vocabulary_reference: String,
    pub vocabulary_version: Option<String>,
    pub vocabulary_concept_id: i64,
}

/// The OMOP `domain` table row; named to avoid clashing with the CDM
/// notion of a target domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRecord {
    pub domain_id: String,
    pub domain_name: String,
    pub domain_concept_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptClass {
    pub concept_class_id: String,
    pub concept_class_name: String,
    pub concept_class_concept_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub relationship_id: String,
    pub relationship_name: String,
    pub is_hierarchical: String,
    pub defines_ancestry: String,
    pub reverse_relationship_id: String,
    pub relationship_concept_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptSynonym {
    pub concept_id: i64,
    pub concept_synonym_name: String,
    pub language_concept_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptAncestor {
    pub ancestor_concept_id: i64,
    pub descendant_concept_id: i64,
    pub min_levels_of_separation: i64,
    pub max_levels_of_separation: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugStrength {
    pub drug_concept_id: i64,
    pub ingredient_concept_id: i64,
    pub amount_value: Option<f64>,
    pub amount_unit_concept_id: Option<i64>,
    pub numerator_value: Option<f64>,
    pub numerator_unit_concept_id: Option<i64>,
    pub denominator_value: Option<f64>,
    pub denominator_unit_concept_id: Option<i64>,
    pub box_size: Option<i64>,
    pub valid_start_date: NaiveDate,
    pub valid_end_date: NaiveDate,
    pub invalid_reason: Option<InvalidReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: i64, standard: Option<StandardConcept>, invalid: Option<InvalidReason>) -> Concept {
        Concept {
            concept_id: id,
            concept_name: "test".to_string(),
            domain_id: "Measurement".to_string(),
            vocabulary_id: "LOINC".to_string(),
            concept_class_id: "Lab Test".to_string(),
            standard_concept: standard,
            concept_code: "1-1".to_string(),
            valid_start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            valid_end_date: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            invalid_reason: invalid,
        }
    }

    #[test]
    fn standard_requires_flag_and_validity() {
        assert!(concept(1, Some(StandardConcept::Standard), None).is_standard());
        assert!(!concept(1, Some(StandardConcept::Classification), None).is_standard());
        assert!(!concept(1, None, None).is_standard());
        assert!(
            !concept(1, Some(StandardConcept::Standard), Some(InvalidReason::Deleted))
                .is_standard()
        );
    }

    #[test]
    fn id_spaces_are_disjoint() {
        assert!(CUSTOM_CONCEPT_ID_FLOOR > REFERENCE_CONCEPT_ID_CEILING);
        assert!(CUSTOM_VOCABULARY_CONCEPT_ID_FLOOR > CUSTOM_CONCEPT_ID_FLOOR);
        assert!(!concept(1_999_999_999, None, None).is_custom());
        assert!(concept(2_100_000_001, None, None).is_custom());
    }
}
