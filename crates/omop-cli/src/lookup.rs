//! The lookup phase: load the Athena reference vocabulary, replay the
//! persisted custom mappings, fuzzy-collect new mappings from the
//! staged source values and persist them for the next run.

use anyhow::Context;
use omop_etl::EtlConfig;
use omop_ingest::StagingArena;
use omop_ingest::frame::{column_i64, column_opt_string, column_string};
use omop_vocab::builder::CustomVocabularyBuilder;
use omop_vocab::{MatchRequest, SourceTerm, VocabularyStore, collect_mappings};
use polars::prelude::DataFrame;
use tracing::info;

/// Fuzzy-collected mappings accumulate in this file under the custom
/// mapping directory, keeping their allocated ids across runs. Curated
/// mapping files in the same directory are never touched.
pub const GENERATED_MAPPING_FILE: &str = "generated_mappings.csv";

/// Build the complete vocabulary store for a run: reference load,
/// persisted custom build, then fuzzy collection over whatever source
/// values are staged.
pub fn build_lookup(config: &EtlConfig, arena: &StagingArena) -> anyhow::Result<VocabularyStore> {
    let mut store = load_reference(config)?;
    collect_and_build(config, arena, &mut store)?;
    Ok(store)
}

/// Reference vocabulary plus the persisted custom mappings, without
/// collecting anything new. Used when the lookup phase is switched
/// off but a later phase still needs to resolve concepts.
pub fn load_reference(config: &EtlConfig) -> anyhow::Result<VocabularyStore> {
    let mut store = omop_vocab::load_reference_vocabulary(&config.vocabulary_dir)
        .with_context(|| {
            format!(
                "loading reference vocabulary from {}",
                config.vocabulary_dir.display()
            )
        })?;

    if config.custom_mapping_dir.is_dir() {
        let mut persisted = CustomVocabularyBuilder::load_mapping_dir(&config.custom_mapping_dir)
            .context("loading custom mapping files")?;
        CustomVocabularyBuilder::build(&mut store, &mut persisted)
            .context("building persisted custom vocabulary")?;
    }
    Ok(store)
}

fn collect_and_build(
    config: &EtlConfig,
    arena: &StagingArena,
    store: &mut VocabularyStore,
) -> anyhow::Result<()> {
    let requests = match_requests(arena);
    if requests.is_empty() {
        info!("no staged source values to collect, lookup phase is a no-op");
        return Ok(());
    }

    let mut collected =
        collect_mappings(store, &requests).context("collecting fuzzy-matched mappings")?;
    if collected.is_empty() {
        info!("all staged source values already mapped");
        return Ok(());
    }
    CustomVocabularyBuilder::build(store, &mut collected)
        .context("building collected custom vocabulary")?;

    // Append to the generated file after the build, so the rows land
    // on disk with their ids and the next run resumes the id space.
    std::fs::create_dir_all(&config.custom_mapping_dir).with_context(|| {
        format!(
            "creating custom mapping directory {}",
            config.custom_mapping_dir.display()
        )
    })?;
    let generated_path = config.custom_mapping_dir.join(GENERATED_MAPPING_FILE);
    let mut generated = if generated_path.exists() {
        CustomVocabularyBuilder::load_mapping_file(&generated_path)
            .context("re-reading generated mapping file")?
    } else {
        Vec::new()
    };
    let appended = collected.len();
    generated.extend(collected);
    CustomVocabularyBuilder::write_mapping_file(&generated_path, &generated)
        .context("persisting generated mappings")?;
    info!(
        appended,
        total = generated.len(),
        path = %generated_path.display(),
        "persisted generated mappings"
    );
    Ok(())
}

/// Derive the fuzzy-match requests from the staged frames. Tables that
/// were not staged contribute nothing; a request without terms is not
/// emitted, so its concept pool is never validated.
fn match_requests(arena: &StagingArena) -> Vec<MatchRequest> {
    let mut requests = Vec::new();

    // Distinct unit strings across the fact tables.
    let mut units: Vec<SourceTerm> = Vec::new();
    for table in ["labevents", "chartevents"] {
        if let Some(frame) = arena.maybe(table) {
            for term in distinct_values(frame, "valueuom") {
                units.push(SourceTerm::verbatim(term));
            }
        }
    }
    push_request(
        &mut requests,
        units,
        ("mimiciv_meas_unit", "Unit", "Unit"),
        ("UCUM", "Unit", "Unit"),
        None,
    );

    // Lab items without a LOINC code match against LOINC lab tests by
    // label and fluid.
    if let Some(d_labitems) = arena.maybe("d_labitems") {
        let mut terms = Vec::new();
        for idx in 0..d_labitems.height() {
            let Some(itemid) = column_i64(d_labitems, "itemid", idx) else {
                continue;
            };
            if column_opt_string(d_labitems, "loinc_code", idx).is_some() {
                continue;
            }
            let label = column_string(d_labitems, "label", idx);
            let fluid = column_string(d_labitems, "fluid", idx);
            let query = format!("{} {}", label.trim(), fluid.trim());
            terms.push(SourceTerm::new(itemid.to_string(), query.trim()));
        }
        push_request(
            &mut requests,
            terms,
            ("mimiciv_meas_lab_loinc", "Measurement", "Lab Test"),
            ("LOINC", "Measurement", "Lab Test"),
            None,
        );
    }

    // Bedside items, split by the event table they link to.
    if let Some(d_items) = arena.maybe("d_items") {
        push_request(
            &mut requests,
            linked_item_terms(d_items, "chartevents"),
            ("mimiciv_meas_chart", "Measurement", "Clinical Observation"),
            ("LOINC", "Measurement", "Clinical Observation"),
            None,
        );
        push_request(
            &mut requests,
            linked_item_terms(d_items, "procedureevents"),
            ("mimiciv_proc_itemid", "Procedure", "Procedure"),
            ("SNOMED", "Procedure", "Procedure"),
            None,
        );
        push_request(
            &mut requests,
            linked_item_terms(d_items, "datetimeevents"),
            ("mimiciv_proc_datetimeevents", "Procedure", "Procedure"),
            ("SNOMED", "Procedure", "Procedure"),
            None,
        );
    }

    // Microbiology dictionary, split by item category.
    if let Some(d_micro) = arena.maybe("d_micro") {
        push_request(
            &mut requests,
            category_item_terms(d_micro, "SPECIMEN"),
            ("mimiciv_micro_specimen", "Specimen", "Specimen"),
            ("SNOMED", "Specimen", "Specimen"),
            None,
        );
        push_request(
            &mut requests,
            category_item_terms(d_micro, "ORGANISM"),
            ("mimiciv_micro_organism", "Observation", "Organism"),
            ("SNOMED", "Observation", "Organism"),
            None,
        );
        push_request(
            &mut requests,
            category_item_terms(d_micro, "ANTIBIOTIC"),
            ("mimiciv_micro_antibiotic", "Drug", "Ingredient"),
            ("RxNorm", "Drug", "Ingredient"),
            Some("antibiotic"),
        );
        push_request(
            &mut requests,
            category_item_terms(d_micro, "MICROTEST"),
            ("mimiciv_micro_test", "Measurement", "Lab Test"),
            ("LOINC", "Measurement", "Lab Test"),
            None,
        );
    }

    requests
}

fn push_request(
    requests: &mut Vec<MatchRequest>,
    terms: Vec<SourceTerm>,
    source: (&str, &str, &str),
    pool: (&str, &str, &str),
    key_phrase: Option<&str>,
) {
    if terms.is_empty() {
        return;
    }
    requests.push(MatchRequest {
        terms,
        source_vocabulary_id: source.0.to_string(),
        source_domain_id: source.1.to_string(),
        source_concept_class_id: source.2.to_string(),
        pool_vocabulary_id: pool.0.to_string(),
        pool_domain_id: pool.1.to_string(),
        pool_concept_class_id: pool.2.to_string(),
        key_phrase: key_phrase.map(str::to_string),
    });
}

fn distinct_values(frame: &DataFrame, column: &str) -> Vec<String> {
    let mut values = Vec::new();
    for idx in 0..frame.height() {
        if let Some(value) = column_opt_string(frame, column, idx) {
            let value = value.trim().to_string();
            if !value.is_empty() && !values.contains(&value) {
                values.push(value);
            }
        }
    }
    values
}

fn linked_item_terms(d_items: &DataFrame, linksto: &str) -> Vec<SourceTerm> {
    item_terms(d_items, |frame, idx| {
        column_string(frame, "linksto", idx).trim().eq_ignore_ascii_case(linksto)
    })
}

fn category_item_terms(d_micro: &DataFrame, category: &str) -> Vec<SourceTerm> {
    item_terms(d_micro, |frame, idx| {
        column_string(frame, "category", idx).trim().eq_ignore_ascii_case(category)
    })
}

fn item_terms<F>(frame: &DataFrame, keep: F) -> Vec<SourceTerm>
where
    F: Fn(&DataFrame, usize) -> bool,
{
    let mut terms = Vec::new();
    for idx in 0..frame.height() {
        if !keep(frame, idx) {
            continue;
        }
        let Some(itemid) = column_i64(frame, "itemid", idx) else {
            continue;
        };
        let label = column_string(frame, "label", idx);
        if label.trim().is_empty() {
            continue;
        }
        terms.push(SourceTerm::new(itemid.to_string(), label.trim()));
    }
    terms
}

#[cfg(test)]
mod tests {
    use polars::prelude::{NamedFrom, Series};

    use super::*;

    fn frame(columns: &[(&str, Vec<&str>)]) -> DataFrame {
        let series: Vec<_> = columns
            .iter()
            .map(|(name, values)| Series::new((*name).into(), values.clone()).into())
            .collect();
        DataFrame::new(series).unwrap()
    }

    #[test]
    fn empty_arena_yields_no_requests() {
        let arena = StagingArena::new();
        assert!(match_requests(&arena).is_empty());
    }

    #[test]
    fn unit_values_deduplicate_across_fact_tables() {
        let mut arena = StagingArena::new();
        arena.publish(
            "labevents",
            frame(&[("valueuom", vec!["mg/dL", "", "mmHg"])]),
        );
        arena.publish("chartevents", frame(&[("valueuom", vec!["mg/dL"])]));

        let requests = match_requests(&arena);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].source_vocabulary_id, "mimiciv_meas_unit");
        // Order preserved, blanks skipped; codes deduplicate inside
        // collection by code, which here covers the repeat.
        assert_eq!(requests[0].terms.len(), 3);
    }

    #[test]
    fn lab_items_with_loinc_codes_are_not_collected() {
        let mut arena = StagingArena::new();
        arena.publish(
            "d_labitems",
            frame(&[
                ("itemid", vec!["50931", "50970"]),
                ("label", vec!["Glucose", "Phosphate"]),
                ("fluid", vec!["Blood", "Blood"]),
                ("loinc_code", vec!["2345-7", ""]),
            ]),
        );

        let requests = match_requests(&arena);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].source_vocabulary_id, "mimiciv_meas_lab_loinc");
        assert_eq!(requests[0].terms.len(), 1);
        assert_eq!(requests[0].terms[0].code, "50970");
        assert_eq!(requests[0].terms[0].label, "Phosphate Blood");
    }

    #[test]
    fn micro_dictionary_splits_by_category() {
        let mut arena = StagingArena::new();
        arena.publish(
            "d_micro",
            frame(&[
                ("itemid", vec!["90001", "90002", "90003"]),
                ("label", vec!["BLOOD CULTURE", "ESCHERICHIA COLI", "GENTAMICIN"]),
                ("category", vec!["SPECIMEN", "ORGANISM", "ANTIBIOTIC"]),
            ]),
        );

        let requests = match_requests(&arena);
        let vocabularies: Vec<&str> = requests
            .iter()
            .map(|r| r.source_vocabulary_id.as_str())
            .collect();
        assert_eq!(
            vocabularies,
            vec![
                "mimiciv_micro_specimen",
                "mimiciv_micro_organism",
                "mimiciv_micro_antibiotic"
            ]
        );
        let antibiotic = &requests[2];
        assert_eq!(antibiotic.key_phrase.as_deref(), Some("antibiotic"));
        assert_eq!(antibiotic.pool_vocabulary_id, "RxNorm");
    }
}
