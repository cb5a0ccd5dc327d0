//! Vocabulary table delivery: the merged reference + custom content
//! of the store, written alongside the CDM tables.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use omop_vocab::VocabularyStore;

use crate::writer::{UnloadedTable, write_table};

pub fn unload_vocabulary(store: &VocabularyStore, dir: &Path) -> Result<Vec<UnloadedTable>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating delivery directory {}", dir.display()))?;

    let mut written = Vec::new();
    written.push(write_table(dir, "concept", store.concepts())?);
    written.push(write_table(
        dir,
        "concept_relationship",
        store.relationships(),
    )?);
    written.push(write_table(dir, "vocabulary", store.vocabularies())?);
    written.push(write_table(dir, "domain", store.domains())?);
    written.push(write_table(dir, "concept_class", store.concept_classes())?);
    written.push(write_table(
        dir,
        "relationship",
        store.relationship_records(),
    )?);
    written.push(write_table(
        dir,
        "concept_synonym",
        store.concept_synonyms(),
    )?);
    written.push(write_table(
        dir,
        "concept_ancestor",
        store.concept_ancestors(),
    )?);
    written.push(write_table(dir, "drug_strength", store.drug_strengths())?);
    Ok(written)
}
