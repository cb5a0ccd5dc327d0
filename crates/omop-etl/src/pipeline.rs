//! The orchestrator: staging plus the fixed topological stage list.
//!
//! Later stages join on surrogate keys minted by earlier ones, so the
//! order is load-bearing: Person and Visit rows must exist before any
//! fact finalize, the mapped fact pool must be complete before the
//! Procedure finalize (chartevent and specimen rows can re-route
//! there), and ObservationPeriod must exist before the Person final
//! prune.

use anyhow::Context;
use omop_ingest::{SOURCE_TABLES, load_source_table};
use omop_model::TargetDomain;
use omop_vocab::VocabularyStore;
use tracing::{info, warn};

use crate::config::EtlConfig;
use crate::mappers;
use crate::routing::finalize_domain;
use crate::state::EtlState;

/// Load every source extract found under the configured paths into
/// the staging arena. A table whose file is absent is skipped; the
/// mappers treat missing staged tables as empty input.
pub fn stage_sources(config: &EtlConfig, state: &mut EtlState) -> anyhow::Result<()> {
    for table in SOURCE_TABLES {
        let path = config.source_path(table);
        if !path.exists() {
            warn!(table = table.name, path = %path.display(), "source file absent, skipping");
            continue;
        }
        let frame = load_source_table(&path, table)
            .with_context(|| format!("staging source table {}", table.name))?;
        info!(table = table.name, rows = frame.height(), "staged source table");
        state.arena.publish(table.name, frame);
    }
    Ok(())
}

/// Run the whole transform against an already-staged arena and a
/// built vocabulary store. Any stage error aborts the run.
pub fn run_etl(
    config: &EtlConfig,
    store: &VocabularyStore,
    state: &mut EtlState,
) -> anyhow::Result<()> {
    config.validate().context("validating run configuration")?;

    info!("running stage location");
    mappers::location::migrate(state).context("stage location")?;
    info!("running stage person");
    mappers::person::migrate(state, store).context("stage person")?;
    info!("running stage death");
    mappers::death::migrate(state).context("stage death")?;
    info!("running stage care_site");
    mappers::care_site::migrate(state, store).context("stage care_site")?;
    info!("running stage visit part 1");
    mappers::visit::migrate_part1(state).context("stage visit part 1")?;

    info!("running stage measurement units");
    mappers::measurement::migrate_units(state, store).context("stage measurement units")?;
    info!("running stage measurement chartevents");
    mappers::measurement::migrate_chartevents(state, store, config)
        .context("stage measurement chartevents")?;
    info!("running stage measurement labevents");
    mappers::measurement::migrate_labevents(state, store).context("stage measurement labevents")?;
    info!("running stage microbiology");
    mappers::micro::migrate(state, store).context("stage microbiology")?;

    info!("running stage visit part 2");
    mappers::visit::migrate_part2(state).context("stage visit part 2")?;
    info!("running stage visit_occurrence");
    mappers::visit::migrate_visit_occurrence(state).context("stage visit_occurrence")?;
    info!("running stage visit_detail");
    mappers::visit::migrate_visit_detail(state).context("stage visit_detail")?;

    info!("running stage diagnoses");
    mappers::condition::migrate(state, store).context("stage diagnoses")?;
    info!("running stage procedure lookup");
    mappers::procedure::migrate_lookup(state, store).context("stage procedure lookup")?;
    info!("running stage observation lookup");
    mappers::observation::migrate_lookup(state, store).context("stage observation lookup")?;

    finalize_domain(state, TargetDomain::Condition, "condition_occurrence");
    finalize_domain(state, TargetDomain::Procedure, "procedure_occurrence");
    finalize_domain(state, TargetDomain::Specimen, "specimen");
    finalize_domain(state, TargetDomain::Measurement, "measurement");

    info!("running stage drug lookup");
    mappers::drug::migrate_lookup(state, store).context("stage drug lookup")?;
    finalize_domain(state, TargetDomain::Drug, "drug_exposure");
    finalize_domain(state, TargetDomain::Device, "device_exposure");
    finalize_domain(state, TargetDomain::Observation, "observation");

    info!("running stage observation_period");
    mappers::observation::migrate_period(state).context("stage observation_period")?;
    info!("running stage person final");
    mappers::person::migrate_final(state).context("stage person final")?;
    info!("running stage fact_relationship");
    mappers::fact_relationship::migrate(state).context("stage fact_relationship")?;

    info!("running stage condition_era");
    mappers::condition::migrate_condition_era(state).context("stage condition_era")?;
    info!("running stage drug_era");
    mappers::drug::migrate_drug_era(state, store).context("stage drug_era")?;
    info!("running stage dose_era");
    mappers::drug::migrate_dose_era(state).context("stage dose_era")?;

    info!("running stage cdm_source");
    mappers::source_meta::migrate(state, config, store).context("stage cdm_source")?;

    info!(stages = state.audits.len(), "transform complete");
    Ok(())
}
