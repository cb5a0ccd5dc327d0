//! CDM table delivery.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use omop_etl::CdmTables;

use crate::writer::{UnloadedTable, write_table};

/// Write every CDM working table into the delivery directory.
pub fn unload_cdm(cdm: &CdmTables, dir: &Path) -> Result<Vec<UnloadedTable>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating delivery directory {}", dir.display()))?;

    let mut written = Vec::new();
    written.push(write_table(dir, "person", &cdm.persons)?);
    written.push(write_table(dir, "location", &cdm.locations)?);
    written.push(write_table(dir, "care_site", &cdm.care_sites)?);
    written.push(write_table(dir, "death", &cdm.deaths)?);
    written.push(write_table(dir, "visit_occurrence", &cdm.visit_occurrences)?);
    written.push(write_table(dir, "visit_detail", &cdm.visit_details)?);
    written.push(write_table(
        dir,
        "condition_occurrence",
        &cdm.condition_occurrences,
    )?);
    written.push(write_table(
        dir,
        "procedure_occurrence",
        &cdm.procedure_occurrences,
    )?);
    written.push(write_table(dir, "drug_exposure", &cdm.drug_exposures)?);
    written.push(write_table(dir, "device_exposure", &cdm.device_exposures)?);
    written.push(write_table(dir, "measurement", &cdm.measurements)?);
    written.push(write_table(dir, "observation", &cdm.observations)?);
    written.push(write_table(dir, "specimen", &cdm.specimens)?);
    written.push(write_table(
        dir,
        "fact_relationship",
        &cdm.fact_relationships,
    )?);
    written.push(write_table(
        dir,
        "observation_period",
        &cdm.observation_periods,
    )?);
    written.push(write_table(dir, "condition_era", &cdm.condition_eras)?);
    written.push(write_table(dir, "drug_era", &cdm.drug_eras)?);
    written.push(write_table(dir, "dose_era", &cdm.dose_eras)?);
    written.push(write_table(dir, "cdm_source", &cdm.cdm_source)?);
    Ok(written)
}
