//! Phase orchestration behind `omop-forge run`.
//!
//! A run is up to four phases: lookup (vocabulary build), import
//! (stage the source extracts), etl (the entity-mapping transform)
//! and unload (write the delivery CSVs). Each is independently
//! toggleable; staging happens whenever any phase reads source data.

use std::path::Path;

use anyhow::{Context, Result};
use omop_etl::state::CdmTables;
use omop_etl::{EtlConfig, EtlState, StageAudit, run_etl, stage_sources};
use omop_unload::{UnloadedTable, unload_cdm, unload_vocabulary};
use omop_vocab::VocabularyStore;
use tracing::info;

use crate::lookup::{build_lookup, load_reference};

/// Which phases a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
    pub lookup: bool,
    pub import: bool,
    pub etl: bool,
    pub unload: bool,
}

impl Phases {
    pub const ALL: Phases = Phases {
        lookup: true,
        import: true,
        etl: true,
        unload: true,
    };

    /// The lookup phase collects from staged values and the transform
    /// reads them, so staging runs for either.
    fn needs_staging(self) -> bool {
        self.lookup || self.import || self.etl
    }

    fn needs_store(self) -> bool {
        self.etl || self.unload
    }
}

/// Everything the summary prints after a run.
pub struct RunOutcome {
    pub audits: Vec<StageAudit>,
    pub table_counts: Vec<(&'static str, usize)>,
    pub unloaded: Vec<UnloadedTable>,
}

/// Read and validate the TOML run configuration.
pub fn load_config(path: &Path) -> Result<EtlConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading run configuration {}", path.display()))?;
    let config: EtlConfig = toml::from_str(&raw)
        .with_context(|| format!("parsing run configuration {}", path.display()))?;
    config.validate().context("validating run configuration")?;
    Ok(config)
}

/// Execute the selected phases against one configuration.
pub fn run_migration(config: &EtlConfig, phases: Phases) -> Result<RunOutcome> {
    let mut state = EtlState::new();

    if phases.needs_staging() {
        info!("phase import: staging source extracts");
        stage_sources(config, &mut state).context("staging source extracts")?;
    }

    let store = if phases.lookup {
        info!("phase lookup: building vocabulary");
        build_lookup(config, &state.arena)?
    } else if phases.needs_store() {
        info!("phase lookup skipped, loading persisted vocabulary");
        load_reference(config)?
    } else {
        VocabularyStore::new()
    };

    if phases.etl {
        info!("phase etl: running entity-mapping transform");
        run_etl(config, &store, &mut state)?;
    }

    let mut unloaded = Vec::new();
    if phases.unload {
        info!(output_dir = %config.output_dir.display(), "phase unload: writing delivery files");
        unloaded.extend(unload_cdm(&state.cdm, &config.output_dir)?);
        unloaded.extend(unload_vocabulary(&store, &config.output_dir)?);
    }

    Ok(RunOutcome {
        table_counts: table_counts(&state.cdm),
        audits: state.audits,
        unloaded,
    })
}

fn table_counts(cdm: &CdmTables) -> Vec<(&'static str, usize)> {
    vec![
        ("person", cdm.persons.len()),
        ("location", cdm.locations.len()),
        ("care_site", cdm.care_sites.len()),
        ("death", cdm.deaths.len()),
        ("visit_occurrence", cdm.visit_occurrences.len()),
        ("visit_detail", cdm.visit_details.len()),
        ("condition_occurrence", cdm.condition_occurrences.len()),
        ("procedure_occurrence", cdm.procedure_occurrences.len()),
        ("drug_exposure", cdm.drug_exposures.len()),
        ("device_exposure", cdm.device_exposures.len()),
        ("measurement", cdm.measurements.len()),
        ("observation", cdm.observations.len()),
        ("specimen", cdm.specimens.len()),
        ("fact_relationship", cdm.fact_relationships.len()),
        ("observation_period", cdm.observation_periods.len()),
        ("condition_era", cdm.condition_eras.len()),
        ("drug_era", cdm.drug_eras.len()),
        ("dose_era", cdm.dose_eras.len()),
        ("cdm_source", cdm.cdm_source.len()),
    ]
}
