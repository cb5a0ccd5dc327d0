//! Custom vocabulary build: allocate concept ids for fuzzy-matched
//! source values, synthesize relationship edges, and union the result
//! into the reference store.

use std::path::Path;

use omop_model::{
    CUSTOM_CONCEPT_ID_FLOOR, CUSTOM_VOCABULARY_CONCEPT_ID_FLOOR, Concept, ConceptRelationship,
    CustomMapping, EtlError, InvalidReason, Result, StandardConcept, Vocabulary,
};
use tracing::info;

use crate::store::VocabularyStore;

/// Everything one build run appended to the store. Kept separately so
/// the unload stage can write the custom portion without re-deriving
/// the reference/custom partition.
#[derive(Debug, Default)]
pub struct CustomVocabularyBuild {
    pub concepts: Vec<Concept>,
    pub relationships: Vec<ConceptRelationship>,
    pub vocabularies: Vec<Vocabulary>,
}

pub struct CustomVocabularyBuilder;

impl CustomVocabularyBuilder {
    /// Read one custom-mapping CSV file, validating every row. A
    /// malformed row aborts the whole build; a partially applied
    /// vocabulary is worse than none.
    pub fn load_mapping_file(path: &Path) -> Result<Vec<CustomMapping>> {
        let mut reader = csv::Reader::from_path(path).map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let mut mappings = Vec::new();
        for (row, record) in reader.deserialize().enumerate() {
            let mapping: CustomMapping = record.map_err(|source| EtlError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            mapping.validate(row)?;
            mappings.push(mapping);
        }
        Ok(mappings)
    }

    /// Read every `*.csv` mapping file in a directory, in file-name
    /// order so id allocation is reproducible.
    pub fn load_mapping_dir(dir: &Path) -> Result<Vec<CustomMapping>> {
        let mut paths = Vec::new();
        let entries = std::fs::read_dir(dir).map_err(|source| EtlError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| EtlError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut mappings = Vec::new();
        for path in &paths {
            mappings.extend(Self::load_mapping_file(path)?);
        }
        info!(files = paths.len(), rows = mappings.len(), dir = %dir.display(), "loaded custom mappings");
        Ok(mappings)
    }

    /// Persist mapping rows (with their allocated ids) back to disk so
    /// a later run can resume the same id space.
    pub fn write_mapping_file(path: &Path, mappings: &[CustomMapping]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        for mapping in mappings {
            writer.serialize(mapping).map_err(|source| EtlError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        }
        writer.flush().map_err(|source| EtlError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Allocate ids, synthesize concepts/relationships/vocabularies
    /// and union everything into the store.
    ///
    /// Ids continue strictly above both the store's current custom
    /// maximum and the batch's own maximum, so repeated builds against
    /// an accumulating store never reuse an id.
    pub fn build(
        store: &mut VocabularyStore,
        mappings: &mut [CustomMapping],
    ) -> Result<CustomVocabularyBuild> {
        let mut next_id = store
            .max_custom_concept_id()
            .max(CUSTOM_CONCEPT_ID_FLOOR)
            .max(
                mappings
                    .iter()
                    .map(|m| m.source_concept_id)
                    .max()
                    .unwrap_or(0),
            );
        for mapping in mappings.iter_mut() {
            if mapping.source_concept_id <= CUSTOM_CONCEPT_ID_FLOOR {
                next_id += 1;
                mapping.source_concept_id = next_id;
            }
        }

        let mut build = CustomVocabularyBuild::default();
        for mapping in mappings.iter() {
            build.concepts.push(concept_from_mapping(mapping));
            let (forward, reverse) = edges_from_mapping(mapping);
            build.relationships.push(forward);
            build.relationships.push(reverse);
        }

        // One vocabulary row (and its Metadata concept) per custom
        // vocabulary the store has not seen yet, name-ordered.
        let mut new_vocabulary_ids: Vec<String> = mappings
            .iter()
            .map(|m| m.source_vocabulary_id.clone())
            .filter(|id| !store.has_vocabulary(id))
            .collect();
        new_vocabulary_ids.sort();
        new_vocabulary_ids.dedup();

        let mut next_vocabulary_concept_id = store
            .vocabularies()
            .iter()
            .map(|v| v.vocabulary_concept_id)
            .filter(|&id| id >= CUSTOM_VOCABULARY_CONCEPT_ID_FLOOR)
            .max()
            .unwrap_or(CUSTOM_VOCABULARY_CONCEPT_ID_FLOOR - 1);
        for vocabulary_id in new_vocabulary_ids {
            next_vocabulary_concept_id += 1;
            build.vocabularies.push(Vocabulary {
                vocabulary_id: vocabulary_id.clone(),
                vocabulary_name: vocabulary_id.clone(),
                vocabulary_reference: "Custom mapping".to_string(),
                vocabulary_version: None,
                vocabulary_concept_id: next_vocabulary_concept_id,
            });
            build.concepts.push(vocabulary_concept(
                next_vocabulary_concept_id,
                &vocabulary_id,
            ));
        }

        info!(
            concepts = build.concepts.len(),
            relationships = build.relationships.len(),
            vocabularies = build.vocabularies.len(),
            "built custom vocabulary"
        );

        store.add_concepts(build.concepts.clone());
        store.add_relationships(build.relationships.clone());
        store.add_vocabularies(build.vocabularies.clone());
        Ok(build)
    }
}

fn parse_standard(raw: Option<&str>) -> Option<StandardConcept> {
    match raw {
        Some("S") => Some(StandardConcept::Standard),
        Some("C") => Some(StandardConcept::Classification),
        _ => None,
    }
}

fn parse_invalid(raw: Option<&str>) -> Option<InvalidReason> {
    match raw {
        Some("D") => Some(InvalidReason::Deleted),
        Some("U") => Some(InvalidReason::Updated),
        _ => None,
    }
}

fn concept_from_mapping(mapping: &CustomMapping) -> Concept {
    // An unmapped custom concept stands alone, so it is forced
    // standard; a mapped one defers to its standard target.
    let standard_concept = if mapping.target_concept_id == 0 {
        Some(StandardConcept::Standard)
    } else {
        parse_standard(mapping.standard_concept.as_deref())
    };
    Concept {
        concept_id: mapping.source_concept_id,
        concept_name: mapping.concept_name.clone(),
        domain_id: mapping.source_domain_id.clone(),
        vocabulary_id: mapping.source_vocabulary_id.clone(),
        concept_class_id: mapping.source_concept_class_id.clone(),
        standard_concept,
        concept_code: mapping.concept_code.clone(),
        valid_start_date: mapping.valid_start_date,
        valid_end_date: mapping.valid_end_date,
        invalid_reason: parse_invalid(mapping.invalid_reason.as_deref()),
    }
}

fn edges_from_mapping(mapping: &CustomMapping) -> (ConceptRelationship, ConceptRelationship) {
    // target 0 self-loops: the concept is its own standard.
    let target = if mapping.target_concept_id == 0 {
        mapping.source_concept_id
    } else {
        mapping.target_concept_id
    };
    let invalid_reason = parse_invalid(mapping.invalid_reason_cr.as_deref());
    let forward = ConceptRelationship {
        concept_id_1: mapping.source_concept_id,
        concept_id_2: target,
        relationship_id: mapping.relationship_id.clone(),
        valid_start_date: mapping.relationship_valid_start_date,
        valid_end_date: mapping.relationship_end_date,
        invalid_reason,
    };
    let reverse = ConceptRelationship {
        concept_id_1: target,
        concept_id_2: mapping.source_concept_id,
        relationship_id: mapping.reverse_relationship_id.clone(),
        valid_start_date: mapping.relationship_valid_start_date,
        valid_end_date: mapping.relationship_end_date,
        invalid_reason,
    };
    (forward, reverse)
}

fn vocabulary_concept(concept_id: i64, vocabulary_id: &str) -> Concept {
    let start = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let end = chrono::NaiveDate::from_ymd_opt(2099, 12, 31).unwrap_or_default();
    Concept {
        concept_id,
        concept_name: vocabulary_id.to_string(),
        domain_id: "Metadata".to_string(),
        vocabulary_id: "Vocabulary".to_string(),
        concept_class_id: "Vocabulary".to_string(),
        standard_concept: None,
        concept_code: vocabulary_id.to_string(),
        valid_start_date: start,
        valid_end_date: end,
        invalid_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use omop_model::{MAPPED_FROM, MAPS_TO};

    use super::*;

    fn mapping(name: &str, vocab: &str, target: i64) -> CustomMapping {
        CustomMapping {
            source_concept_id: 0,
            concept_name: name.to_string(),
            source_domain_id: "Measurement".to_string(),
            source_vocabulary_id: vocab.to_string(),
            source_concept_class_id: "Lab Test".to_string(),
            standard_concept: None,
            concept_code: name.to_string(),
            valid_start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            valid_end_date: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            invalid_reason: None,
            relationship_id: MAPS_TO.to_string(),
            reverse_relationship_id: MAPPED_FROM.to_string(),
            invalid_reason_cr: None,
            relationship_valid_start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            relationship_end_date: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            target_concept_id: target,
        }
    }

    #[test]
    fn allocation_is_monotonic_across_builds() {
        let mut store = VocabularyStore::new();
        let mut first = vec![mapping("wbc", "mimiciv_meas_lab", 3000905)];
        CustomVocabularyBuilder::build(&mut store, &mut first).unwrap();
        assert_eq!(first[0].source_concept_id, CUSTOM_CONCEPT_ID_FLOOR + 1);

        let mut second = vec![mapping("rbc", "mimiciv_meas_lab", 3009542)];
        CustomVocabularyBuilder::build(&mut store, &mut second).unwrap();
        assert_eq!(second[0].source_concept_id, CUSTOM_CONCEPT_ID_FLOOR + 2);
    }

    #[test]
    fn pre_assigned_ids_are_kept() {
        let mut store = VocabularyStore::new();
        let mut batch = vec![mapping("a", "v", 0), mapping("b", "v", 0)];
        batch[0].source_concept_id = CUSTOM_CONCEPT_ID_FLOOR + 7;
        CustomVocabularyBuilder::build(&mut store, &mut batch).unwrap();
        assert_eq!(batch[0].source_concept_id, CUSTOM_CONCEPT_ID_FLOOR + 7);
        assert_eq!(batch[1].source_concept_id, CUSTOM_CONCEPT_ID_FLOOR + 8);
    }

    #[test]
    fn mapped_concept_gets_two_cycle_edges() {
        let mut store = VocabularyStore::new();
        let mut batch = vec![mapping("wbc", "mimiciv_meas_lab", 3000905)];
        let build = CustomVocabularyBuilder::build(&mut store, &mut batch).unwrap();
        let custom_id = batch[0].source_concept_id;

        let forward: Vec<_> = build
            .relationships
            .iter()
            .filter(|r| r.relationship_id == MAPS_TO && r.concept_id_1 == custom_id)
            .collect();
        let reverse: Vec<_> = build
            .relationships
            .iter()
            .filter(|r| r.relationship_id == MAPPED_FROM && r.concept_id_2 == custom_id)
            .collect();
        assert_eq!(forward.len(), 1);
        assert_eq!(reverse.len(), 1);
        assert_eq!(forward[0].concept_id_2, 3000905);
        assert_eq!(reverse[0].concept_id_1, 3000905);
    }

    #[test]
    fn unmapped_concept_self_loops_and_is_standard() {
        let mut store = VocabularyStore::new();
        let mut batch = vec![mapping("free text", "mimiciv_obs", 0)];
        let build = CustomVocabularyBuilder::build(&mut store, &mut batch).unwrap();
        let custom_id = batch[0].source_concept_id;

        let concept = build
            .concepts
            .iter()
            .find(|c| c.concept_id == custom_id)
            .unwrap();
        assert!(concept.is_standard());
        assert!(
            build
                .relationships
                .iter()
                .any(|r| r.concept_id_1 == custom_id && r.concept_id_2 == custom_id)
        );
        // The self-standard concept resolves to itself downstream.
        assert_eq!(store.resolve("mimiciv_obs", "free text").target_concept_id, custom_id);
    }

    #[test]
    fn mapping_files_round_trip_through_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut batch = vec![
            mapping("mg/dL", "mimiciv_meas_unit", 8840),
            mapping("wbc", "mimiciv_meas_lab", 3000905),
        ];
        batch[0].source_concept_id = CUSTOM_CONCEPT_ID_FLOOR + 3;
        batch[1].source_concept_id = CUSTOM_CONCEPT_ID_FLOOR + 4;
        CustomVocabularyBuilder::write_mapping_file(&dir.path().join("generated.csv"), &batch)
            .unwrap();
        // Non-csv files in the mapping directory are skipped.
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let loaded = CustomVocabularyBuilder::load_mapping_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].concept_code, "mg/dL");
        assert_eq!(loaded[0].source_concept_id, CUSTOM_CONCEPT_ID_FLOOR + 3);
        assert_eq!(loaded[0].target_concept_id, 8840);
        assert_eq!(loaded[1].relationship_id, MAPS_TO);
        assert_eq!(loaded[1].reverse_relationship_id, MAPPED_FROM);
    }

    #[test]
    fn vocabulary_rows_allocated_name_ordered_from_disjoint_range() {
        let mut store = VocabularyStore::new();
        let mut batch = vec![
            mapping("x", "mimiciv_proc_itemid", 0),
            mapping("y", "mimiciv_meas_chart", 0),
        ];
        let build = CustomVocabularyBuilder::build(&mut store, &mut batch).unwrap();
        assert_eq!(build.vocabularies.len(), 2);
        assert_eq!(build.vocabularies[0].vocabulary_id, "mimiciv_meas_chart");
        assert_eq!(
            build.vocabularies[0].vocabulary_concept_id,
            CUSTOM_VOCABULARY_CONCEPT_ID_FLOOR
        );
        assert_eq!(
            build.vocabularies[1].vocabulary_concept_id,
            CUSTOM_VOCABULARY_CONCEPT_ID_FLOOR + 1
        );
    }
}
