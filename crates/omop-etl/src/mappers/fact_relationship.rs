//! Fact relationships: bidirectional specimen / organism / antibiotic
//! links reconstructed from the trace-id pairs recorded at routing.

use std::collections::HashMap;

use omop_model::{FactRelationship, Provenance, Result, TargetDomain};

use crate::concepts::{REL_HAS_SPECIMEN, REL_SPECIMEN_OF};
use crate::state::EtlState;

/// Index every routed fact row by its trace id so the recorded links
/// can be resolved to (domain concept, surrogate id) pairs.
fn fact_index(state: &EtlState) -> HashMap<&str, (i64, i64)> {
    let mut index: HashMap<&str, (i64, i64)> = HashMap::new();
    for row in &state.cdm.specimens {
        index.insert(
            row.provenance.trace_id.as_str(),
            (TargetDomain::Specimen.domain_concept_id(), row.specimen_id),
        );
    }
    for row in &state.cdm.measurements {
        index.insert(
            row.provenance.trace_id.as_str(),
            (TargetDomain::Measurement.domain_concept_id(), row.measurement_id),
        );
    }
    for row in &state.cdm.observations {
        index.insert(
            row.provenance.trace_id.as_str(),
            (TargetDomain::Observation.domain_concept_id(), row.observation_id),
        );
    }
    index
}

/// A link is only emitted when both endpoints survived their finalize
/// joins; the referencing fact points at its specimen-side parent with
/// "Specimen of" and the parent points back with "Has specimen".
pub fn migrate(state: &mut EtlState) -> Result<()> {
    let mut rows = Vec::new();
    let input = state.fact_links.len();
    {
        let index = fact_index(state);
        for link in &state.fact_links {
            let Some(&(domain_1, fact_id_1)) = index.get(link.trace_id.as_str()) else {
                continue;
            };
            let Some(&(domain_2, fact_id_2)) = index.get(link.link_trace_id.as_str()) else {
                continue;
            };
            let provenance = Provenance::new(
                "fact_relationship",
                "microbiologyevents",
                None,
                link.trace_id.clone(),
            );
            rows.push(FactRelationship {
                domain_concept_id_1: domain_1,
                fact_id_1,
                domain_concept_id_2: domain_2,
                fact_id_2,
                relationship_concept_id: REL_SPECIMEN_OF,
                provenance: provenance.clone(),
            });
            rows.push(FactRelationship {
                domain_concept_id_1: domain_2,
                fact_id_1: fact_id_2,
                domain_concept_id_2: domain_1,
                fact_id_2: fact_id_1,
                relationship_concept_id: REL_HAS_SPECIMEN,
                provenance,
            });
        }
    }

    let emitted = rows.len() / 2;
    state.cdm.fact_relationships = rows;
    state.record_audit("fact_relationship", input, emitted);
    Ok(())
}
