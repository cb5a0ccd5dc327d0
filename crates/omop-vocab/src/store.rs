//! In-memory vocabulary store with code and relationship indexes.

use std::collections::HashMap;

use omop_model::{
    CONCEPT_ID_NO_MATCH, CUSTOM_CONCEPT_ID_FLOOR, Concept, ConceptAncestor, ConceptClass,
    ConceptRelationship, ConceptSynonym, DomainRecord, DrugStrength, MAPS_TO, RelationshipRecord,
    Vocabulary,
};

/// Result of resolving a source code against the store.
///
/// Both ids fall back to the `0` sentinel; a miss is data, not an
/// error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub source_concept_id: i64,
    pub target_concept_id: i64,
    /// Domain of the standard target, when one was found.
    pub target_domain_id: Option<String>,
}

/// Reference plus custom vocabulary content, indexed for the lookups
/// the mappers perform per row: `(vocabulary_id, concept_code)` to
/// concept, and concept id to its standard "Maps to" targets.
#[derive(Debug, Default)]
pub struct VocabularyStore {
    concepts: Vec<Concept>,
    by_id: HashMap<i64, usize>,
    by_code: HashMap<(String, String), usize>,
    relationships: Vec<ConceptRelationship>,
    maps_to: HashMap<i64, Vec<i64>>,
    vocabularies: Vec<Vocabulary>,
    domains: Vec<DomainRecord>,
    concept_classes: Vec<ConceptClass>,
    relationship_records: Vec<RelationshipRecord>,
    synonyms: Vec<ConceptSynonym>,
    ancestors: Vec<ConceptAncestor>,
    ancestors_by_descendant: HashMap<i64, Vec<i64>>,
    drug_strengths: Vec<DrugStrength>,
}

impl VocabularyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_concepts(&mut self, concepts: Vec<Concept>) {
        for concept in concepts {
            self.add_concept(concept);
        }
    }

    pub fn add_concept(&mut self, concept: Concept) {
        let index = self.concepts.len();
        self.by_id.insert(concept.concept_id, index);
        self.by_code.insert(
            (concept.vocabulary_id.clone(), concept.concept_code.clone()),
            index,
        );
        self.concepts.push(concept);
    }

    pub fn add_relationships(&mut self, relationships: Vec<ConceptRelationship>) {
        for relationship in relationships {
            self.add_relationship(relationship);
        }
    }

    pub fn add_relationship(&mut self, relationship: ConceptRelationship) {
        if relationship.relationship_id == MAPS_TO && relationship.invalid_reason.is_none() {
            self.maps_to
                .entry(relationship.concept_id_1)
                .or_default()
                .push(relationship.concept_id_2);
        }
        self.relationships.push(relationship);
    }

    pub fn add_vocabularies(&mut self, vocabularies: Vec<Vocabulary>) {
        self.vocabularies.extend(vocabularies);
    }

    pub fn add_domains(&mut self, domains: Vec<DomainRecord>) {
        self.domains.extend(domains);
    }

    pub fn add_concept_classes(&mut self, classes: Vec<ConceptClass>) {
        self.concept_classes.extend(classes);
    }

    pub fn add_relationship_records(&mut self, records: Vec<RelationshipRecord>) {
        self.relationship_records.extend(records);
    }

    pub fn add_concept_synonyms(&mut self, synonyms: Vec<ConceptSynonym>) {
        self.synonyms.extend(synonyms);
    }

    pub fn add_concept_ancestors(&mut self, ancestors: Vec<ConceptAncestor>) {
        for ancestor in &ancestors {
            self.ancestors_by_descendant
                .entry(ancestor.descendant_concept_id)
                .or_default()
                .push(ancestor.ancestor_concept_id);
        }
        self.ancestors.extend(ancestors);
    }

    pub fn add_drug_strengths(&mut self, strengths: Vec<DrugStrength>) {
        self.drug_strengths.extend(strengths);
    }

    pub fn concept(&self, concept_id: i64) -> Option<&Concept> {
        self.by_id.get(&concept_id).map(|&i| &self.concepts[i])
    }

    pub fn concept_by_code(&self, vocabulary_id: &str, concept_code: &str) -> Option<&Concept> {
        self.by_code
            .get(&(vocabulary_id.to_string(), concept_code.to_string()))
            .map(|&i| &self.concepts[i])
    }

    pub fn concepts(&self) -> &[Concept] {
        &self.concepts
    }

    pub fn relationships(&self) -> &[ConceptRelationship] {
        &self.relationships
    }

    pub fn vocabularies(&self) -> &[Vocabulary] {
        &self.vocabularies
    }

    /// Athena stamps the release version on the `None` vocabulary row.
    pub fn vocabulary_version(&self) -> Option<String> {
        self.vocabularies
            .iter()
            .find(|v| v.vocabulary_id == "None")
            .and_then(|v| v.vocabulary_version.clone())
    }

    pub fn domains(&self) -> &[DomainRecord] {
        &self.domains
    }

    pub fn concept_classes(&self) -> &[ConceptClass] {
        &self.concept_classes
    }

    pub fn relationship_records(&self) -> &[RelationshipRecord] {
        &self.relationship_records
    }

    pub fn concept_synonyms(&self) -> &[ConceptSynonym] {
        &self.synonyms
    }

    pub fn concept_ancestors(&self) -> &[ConceptAncestor] {
        &self.ancestors
    }

    pub fn drug_strengths(&self) -> &[DrugStrength] {
        &self.drug_strengths
    }

    pub fn has_vocabulary(&self, vocabulary_id: &str) -> bool {
        self.vocabularies
            .iter()
            .any(|v| v.vocabulary_id == vocabulary_id)
    }

    /// Standard "Maps to" targets of a concept, smallest id first so
    /// resolution is deterministic when a code has several targets.
    pub fn standard_targets(&self, concept_id: i64) -> Vec<&Concept> {
        let mut targets: Vec<&Concept> = self
            .maps_to
            .get(&concept_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.concept(*id))
                    .filter(|c| c.is_standard())
                    .collect()
            })
            .unwrap_or_default();
        targets.sort_by_key(|c| c.concept_id);
        targets.dedup_by_key(|c| c.concept_id);
        targets
    }

    /// Resolve a source code: find its concept in the named
    /// vocabulary, then follow "Maps to" to a standard target.
    pub fn resolve(&self, vocabulary_id: &str, concept_code: &str) -> Resolution {
        let Some(source) = self.concept_by_code(vocabulary_id, concept_code) else {
            return Resolution::default();
        };
        let mut resolution = Resolution {
            source_concept_id: source.concept_id,
            target_concept_id: CONCEPT_ID_NO_MATCH,
            target_domain_id: None,
        };
        if let Some(target) = self.standard_targets(source.concept_id).first() {
            resolution.target_concept_id = target.concept_id;
            resolution.target_domain_id = Some(target.domain_id.clone());
        }
        resolution
    }

    /// Resolve a code against several vocabularies in priority order.
    pub fn resolve_in(&self, vocabulary_ids: &[&str], concept_code: &str) -> Resolution {
        for vocabulary_id in vocabulary_ids {
            let resolution = self.resolve(vocabulary_id, concept_code);
            if resolution.source_concept_id != CONCEPT_ID_NO_MATCH {
                return resolution;
            }
        }
        Resolution::default()
    }

    /// Candidate pool for fuzzy matching: every concept in the given
    /// vocabulary, domain and class, in load order.
    pub fn match_candidates(
        &self,
        vocabulary_id: &str,
        domain_id: &str,
        concept_class_id: &str,
    ) -> Vec<&Concept> {
        self.concepts
            .iter()
            .filter(|c| {
                c.vocabulary_id == vocabulary_id
                    && c.domain_id == domain_id
                    && c.concept_class_id == concept_class_id
            })
            .collect()
    }

    /// Highest custom concept id seen so far, or the floor when no
    /// custom concepts exist yet. Allocation continues above this.
    pub fn max_custom_concept_id(&self) -> i64 {
        self.concepts
            .iter()
            .map(|c| c.concept_id)
            .filter(|&id| id > CUSTOM_CONCEPT_ID_FLOOR)
            .max()
            .unwrap_or(CUSTOM_CONCEPT_ID_FLOOR)
    }

    /// Ingredient-class ancestors of a drug concept.
    pub fn ingredients_of(&self, drug_concept_id: i64) -> Vec<i64> {
        let mut ingredients: Vec<i64> = self
            .ancestors_by_descendant
            .get(&drug_concept_id)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| {
                        self.concept(*id)
                            .is_some_and(|c| c.concept_class_id == "Ingredient")
                    })
                    .collect()
            })
            .unwrap_or_default();
        ingredients.sort_unstable();
        ingredients.dedup();
        ingredients
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use omop_model::{InvalidReason, StandardConcept};

    use super::*;

    fn concept(id: i64, code: &str, vocab: &str, standard: bool) -> Concept {
        Concept {
            concept_id: id,
            concept_name: format!("concept {id}"),
            domain_id: "Measurement".to_string(),
            vocabulary_id: vocab.to_string(),
            concept_class_id: "Lab Test".to_string(),
            standard_concept: standard.then_some(StandardConcept::Standard),
            concept_code: code.to_string(),
            valid_start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            valid_end_date: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            invalid_reason: None,
        }
    }

    fn maps_to(from: i64, to: i64) -> ConceptRelationship {
        ConceptRelationship {
            concept_id_1: from,
            concept_id_2: to,
            relationship_id: MAPS_TO.to_string(),
            valid_start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            valid_end_date: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            invalid_reason: None,
        }
    }

    #[test]
    fn resolve_follows_maps_to_to_standard_target() {
        let mut store = VocabularyStore::new();
        store.add_concept(concept(100, "50931", "MIMIC Code", false));
        store.add_concept(concept(3004410, "2345-7", "LOINC", true));
        store.add_relationship(maps_to(100, 3004410));

        let resolution = store.resolve("MIMIC Code", "50931");
        assert_eq!(resolution.source_concept_id, 100);
        assert_eq!(resolution.target_concept_id, 3004410);
        assert_eq!(resolution.target_domain_id.as_deref(), Some("Measurement"));
    }

    #[test]
    fn resolve_miss_is_zero_not_error() {
        let store = VocabularyStore::new();
        let resolution = store.resolve("LOINC", "nope");
        assert_eq!(resolution.source_concept_id, 0);
        assert_eq!(resolution.target_concept_id, 0);
    }

    #[test]
    fn non_standard_target_is_not_resolved() {
        let mut store = VocabularyStore::new();
        store.add_concept(concept(100, "A", "V", false));
        store.add_concept(concept(200, "B", "V", false));
        store.add_relationship(maps_to(100, 200));
        assert_eq!(store.resolve("V", "A").target_concept_id, 0);
    }

    #[test]
    fn invalidated_edge_is_ignored() {
        let mut store = VocabularyStore::new();
        store.add_concept(concept(100, "A", "V", false));
        store.add_concept(concept(200, "B", "V", true));
        let mut edge = maps_to(100, 200);
        edge.invalid_reason = Some(InvalidReason::Deleted);
        store.add_relationship(edge);
        assert_eq!(store.resolve("V", "A").target_concept_id, 0);
    }

    #[test]
    fn resolve_in_prefers_earlier_vocabulary() {
        let mut store = VocabularyStore::new();
        store.add_concept(concept(1, "X", "First", true));
        store.add_concept(concept(2, "X", "Second", true));
        store.add_relationship(maps_to(1, 1));
        let resolution = store.resolve_in(&["First", "Second"], "X");
        assert_eq!(resolution.source_concept_id, 1);
    }

    #[test]
    fn max_custom_concept_id_defaults_to_floor() {
        let mut store = VocabularyStore::new();
        store.add_concept(concept(3004410, "2345-7", "LOINC", true));
        assert_eq!(store.max_custom_concept_id(), CUSTOM_CONCEPT_ID_FLOOR);
        store.add_concept(concept(2_100_000_005, "raw", "mimiciv_meas_lab_loinc", false));
        assert_eq!(store.max_custom_concept_id(), 2_100_000_005);
    }
}
