//! Loaders for the Athena vocabulary download files.
//!
//! Athena ships tab-delimited, unquoted files with `YYYYMMDD` dates.
//! Each loader reads one file into the typed rows from `omop_model`;
//! [`load_reference_vocabulary`] reads a whole download directory into
//! a [`VocabularyStore`].

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::ReaderBuilder;
use omop_model::{
    Concept, ConceptAncestor, ConceptClass, ConceptRelationship, ConceptSynonym, DomainRecord,
    DrugStrength, EtlError, InvalidReason, RelationshipRecord, Result, StandardConcept,
    Vocabulary,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::store::VocabularyStore;

fn athena_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .from_path(path)
        .map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = athena_reader(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: T = record.map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Athena dates are `YYYYMMDD`; custom mapping files use ISO dates.
/// Both are accepted everywhere.
pub fn parse_vocab_date(raw: &str, path: &Path, row: usize) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| {
            EtlError::message(format!(
                "unparseable date {raw:?} at {}:{row}",
                path.display()
            ))
        })
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

#[derive(Debug, Deserialize)]
struct RawConcept {
    concept_id: i64,
    concept_name: String,
    domain_id: String,
    vocabulary_id: String,
    concept_class_id: String,
    standard_concept: Option<String>,
    concept_code: String,
    valid_start_date: String,
    valid_end_date: String,
    invalid_reason: Option<String>,
}

pub fn load_concepts(path: &Path) -> Result<Vec<Concept>> {
    let raw: Vec<RawConcept> = read_rows(path)?;
    let mut concepts = Vec::with_capacity(raw.len());
    for (row, r) in raw.into_iter().enumerate() {
        concepts.push(Concept {
            concept_id: r.concept_id,
            concept_name: r.concept_name,
            domain_id: r.domain_id,
            vocabulary_id: r.vocabulary_id,
            concept_class_id: r.concept_class_id,
            standard_concept: parse_standard(r.standard_concept.as_deref()),
            concept_code: r.concept_code,
            valid_start_date: parse_vocab_date(&r.valid_start_date, path, row)?,
            valid_end_date: parse_vocab_date(&r.valid_end_date, path, row)?,
            invalid_reason: parse_invalid(r.invalid_reason.as_deref()),
        });
    }
    Ok(concepts)
}

#[derive(Debug, Deserialize)]
struct RawConceptRelationship {
    concept_id_1: i64,
    concept_id_2: i64,
    relationship_id: String,
    valid_start_date: String,
    valid_end_date: String,
    invalid_reason: Option<String>,
}

pub fn load_concept_relationships(path: &Path) -> Result<Vec<ConceptRelationship>> {
    let raw: Vec<RawConceptRelationship> = read_rows(path)?;
    let mut relationships = Vec::with_capacity(raw.len());
    for (row, r) in raw.into_iter().enumerate() {
        relationships.push(ConceptRelationship {
            concept_id_1: r.concept_id_1,
            concept_id_2: r.concept_id_2,
            relationship_id: r.relationship_id,
            valid_start_date: parse_vocab_date(&r.valid_start_date, path, row)?,
            valid_end_date: parse_vocab_date(&r.valid_end_date, path, row)?,
            invalid_reason: parse_invalid(r.invalid_reason.as_deref()),
        });
    }
    Ok(relationships)
}

pub fn load_vocabularies(path: &Path) -> Result<Vec<Vocabulary>> {
    read_rows(path)
}

pub fn load_domains(path: &Path) -> Result<Vec<DomainRecord>> {
    read_rows(path)
}

pub fn load_concept_classes(path: &Path) -> Result<Vec<ConceptClass>> {
    read_rows(path)
}

pub fn load_relationships(path: &Path) -> Result<Vec<RelationshipRecord>> {
    read_rows(path)
}

pub fn load_concept_synonyms(path: &Path) -> Result<Vec<ConceptSynonym>> {
    read_rows(path)
}

pub fn load_concept_ancestors(path: &Path) -> Result<Vec<ConceptAncestor>> {
    read_rows(path)
}

#[derive(Debug, Deserialize)]
struct RawDrugStrength {
    drug_concept_id: i64,
    ingredient_concept_id: i64,
    amount_value: Option<f64>,
    amount_unit_concept_id: Option<i64>,
    numerator_value: Option<f64>,
    numerator_unit_concept_id: Option<i64>,
    denominator_value: Option<f64>,
    denominator_unit_concept_id: Option<i64>,
    box_size: Option<i64>,
    valid_start_date: String,
    valid_end_date: String,
    invalid_reason: Option<String>,
}

pub fn load_drug_strengths(path: &Path) -> Result<Vec<DrugStrength>> {
    let raw: Vec<RawDrugStrength> = read_rows(path)?;
    let mut strengths = Vec::with_capacity(raw.len());
    for (row, r) in raw.into_iter().enumerate() {
        strengths.push(DrugStrength {
            drug_concept_id: r.drug_concept_id,
            ingredient_concept_id: r.ingredient_concept_id,
            amount_value: r.amount_value,
            amount_unit_concept_id: r.amount_unit_concept_id,
            numerator_value: r.numerator_value,
            numerator_unit_concept_id: r.numerator_unit_concept_id,
            denominator_value: r.denominator_value,
            denominator_unit_concept_id: r.denominator_unit_concept_id,
            box_size: r.box_size,
            valid_start_date: parse_vocab_date(&r.valid_start_date, path, row)?,
            valid_end_date: parse_vocab_date(&r.valid_end_date, path, row)?,
            invalid_reason: parse_invalid(r.invalid_reason.as_deref()),
        });
    }
    Ok(strengths)
}

fn athena_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

/// Load a full Athena download directory into a [`VocabularyStore`].
///
/// `CONCEPT.csv` and `CONCEPT_RELATIONSHIP.csv` are required; the
/// remaining files are loaded when present.
pub fn load_reference_vocabulary(dir: &Path) -> Result<VocabularyStore> {
    let concept_path = athena_file(dir, "CONCEPT.csv");
    let relationship_path = athena_file(dir, "CONCEPT_RELATIONSHIP.csv");

    let concepts = load_concepts(&concept_path)?;
    let relationships = load_concept_relationships(&relationship_path)?;
    info!(
        concepts = concepts.len(),
        relationships = relationships.len(),
        dir = %dir.display(),
        "loaded reference vocabulary"
    );

    let mut store = VocabularyStore::new();
    store.add_concepts(concepts);
    store.add_relationships(relationships);

    let vocab_path = athena_file(dir, "VOCABULARY.csv");
    if vocab_path.exists() {
        store.add_vocabularies(load_vocabularies(&vocab_path)?);
    }
    let domain_path = athena_file(dir, "DOMAIN.csv");
    if domain_path.exists() {
        store.add_domains(load_domains(&domain_path)?);
    }
    let class_path = athena_file(dir, "CONCEPT_CLASS.csv");
    if class_path.exists() {
        store.add_concept_classes(load_concept_classes(&class_path)?);
    }
    let rel_path = athena_file(dir, "RELATIONSHIP.csv");
    if rel_path.exists() {
        store.add_relationship_records(load_relationships(&rel_path)?);
    }
    let synonym_path = athena_file(dir, "CONCEPT_SYNONYM.csv");
    if synonym_path.exists() {
        store.add_concept_synonyms(load_concept_synonyms(&synonym_path)?);
    }
    let ancestor_path = athena_file(dir, "CONCEPT_ANCESTOR.csv");
    if ancestor_path.exists() {
        store.add_concept_ancestors(load_concept_ancestors(&ancestor_path)?);
    }
    let strength_path = athena_file(dir, "DRUG_STRENGTH.csv");
    if strength_path.exists() {
        store.add_drug_strengths(load_drug_strengths(&strength_path)?);
    }

    Ok(store)
}
