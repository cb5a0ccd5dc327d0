//! Run configuration.
//!
//! Deserialized from the TOML run file by the CLI. Paths are resolved
//! relative to wherever the caller says; this crate treats them as
//! given.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use omop_model::{EtlError, Result};
use serde::Deserialize;

use omop_ingest::SourceTable;

fn default_temperature_low() -> f64 {
    25.0
}

fn default_temperature_high() -> f64 {
    44.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct EtlConfig {
    /// Directory of source extract CSVs, one per table.
    pub source_dir: PathBuf,
    /// Athena vocabulary download directory.
    pub vocabulary_dir: PathBuf,
    /// Directory of custom mapping CSVs.
    pub custom_mapping_dir: PathBuf,
    /// Delivery directory the unload stage writes into.
    pub output_dir: PathBuf,
    /// Per-table file-name overrides; tables not listed use the
    /// registry default under `source_dir`.
    #[serde(default)]
    pub source_files: BTreeMap<String, PathBuf>,
    /// Plausibility bounds for chart temperatures, in Celsius,
    /// applied after Fahrenheit conversion.
    #[serde(default = "default_temperature_low")]
    pub chart_temperature_low: f64,
    #[serde(default = "default_temperature_high")]
    pub chart_temperature_high: f64,
    #[serde(default)]
    pub cdm_source: CdmSourceConfig,
}

/// Metadata for the single cdm_source row.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CdmSourceConfig {
    pub name: String,
    pub abbreviation: String,
    pub holder: Option<String>,
    pub description: Option<String>,
    pub etl_reference: Option<String>,
    pub cdm_version: String,
    pub vocabulary_version: Option<String>,
}

impl Default for CdmSourceConfig {
    fn default() -> Self {
        Self {
            name: "MIMIC-IV".to_string(),
            abbreviation: "mimiciv".to_string(),
            holder: None,
            description: None,
            etl_reference: None,
            cdm_version: "5.3.1".to_string(),
            vocabulary_version: None,
        }
    }
}

impl EtlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chart_temperature_low >= self.chart_temperature_high {
            return Err(EtlError::Config(format!(
                "chart temperature range is empty: {}..={}",
                self.chart_temperature_low, self.chart_temperature_high
            )));
        }
        Ok(())
    }

    pub fn source_path(&self, table: &SourceTable) -> PathBuf {
        match self.source_files.get(table.name) {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.source_dir.join(path),
            None => self.source_dir.join(table.file_name),
        }
    }

    pub fn temperature_range(&self) -> RangeInclusive<f64> {
        self.chart_temperature_low..=self.chart_temperature_high
    }

    /// A minimal config rooted at one directory, used by tests.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            source_dir: root.join("source"),
            vocabulary_dir: root.join("vocabulary"),
            custom_mapping_dir: root.join("custom"),
            output_dir: root.join("cdm"),
            source_files: BTreeMap::new(),
            chart_temperature_low: default_temperature_low(),
            chart_temperature_high: default_temperature_high(),
            cdm_source: CdmSourceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use omop_ingest::source_table;

    use super::*;

    #[test]
    fn source_path_prefers_override() {
        let mut config = EtlConfig::rooted_at(Path::new("/data"));
        let table = source_table("patients").unwrap();
        assert_eq!(
            config.source_path(table),
            Path::new("/data/source/patients.csv")
        );
        config
            .source_files
            .insert("patients".to_string(), PathBuf::from("pat_2024.csv"));
        assert_eq!(
            config.source_path(table),
            Path::new("/data/source/pat_2024.csv")
        );
    }

    #[test]
    fn empty_temperature_range_rejected() {
        let mut config = EtlConfig::rooted_at(Path::new("/data"));
        config.chart_temperature_low = 50.0;
        assert!(config.validate().is_err());
    }
}
