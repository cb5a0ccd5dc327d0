//! The per-entity mappers. Each follows the same clean → lookup →
//! mapped shape: read staging frames, resolve codes against the
//! vocabulary, and either emit CDM rows directly (person, visit,
//! location) or queue [`omop_model::MappedFact`]s for domain routing.

pub mod care_site;
pub mod condition;
pub mod death;
pub mod drug;
pub mod fact_relationship;
pub mod location;
pub mod measurement;
pub mod micro;
pub mod observation;
pub mod person;
pub mod procedure;
pub mod source_meta;
pub mod visit;

use omop_ingest::frame::column_string;
use omop_model::Provenance;
use polars::prelude::DataFrame;

/// Provenance block for row `idx` of a staging frame.
pub(crate) fn row_provenance(
    frame: &DataFrame,
    table: &str,
    idx: usize,
    unit_id: &str,
) -> Provenance {
    Provenance::new(
        unit_id,
        table,
        Some(idx as i64),
        column_string(frame, "trace_id", idx),
    )
}
