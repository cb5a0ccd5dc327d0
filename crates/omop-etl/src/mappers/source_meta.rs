//! The single cdm_source metadata row.

use chrono::Utc;
use omop_model::{CdmSource, Result};
use omop_vocab::VocabularyStore;

use crate::config::EtlConfig;
use crate::state::EtlState;

pub fn migrate(state: &mut EtlState, config: &EtlConfig, store: &VocabularyStore) -> Result<()> {
    let meta = &config.cdm_source;
    state.cdm.cdm_source.push(CdmSource {
        cdm_source_name: meta.name.clone(),
        cdm_source_abbreviation: meta.abbreviation.clone(),
        cdm_holder: meta.holder.clone(),
        source_description: meta.description.clone(),
        source_documentation_reference: None,
        cdm_etl_reference: meta.etl_reference.clone(),
        source_release_date: None,
        cdm_release_date: Some(Utc::now().date_naive()),
        cdm_version: meta.cdm_version.clone(),
        vocabulary_version: meta
            .vocabulary_version
            .clone()
            .or_else(|| store.vocabulary_version()),
    });
    state.record_audit("cdm_source", 1, 1);
    Ok(())
}
