#![deny(unsafe_code)]

//! The entity-mapping pipeline: cleaning, concept resolution, fact
//! routing and the dependency-ordered orchestrator.

pub mod clean;
pub mod concepts;
pub mod config;
pub mod mappers;
pub mod pipeline;
pub mod routing;
pub mod state;

pub use crate::clean::AdmissionIndex;
pub use crate::config::EtlConfig;
pub use crate::pipeline::{run_etl, stage_sources};
pub use crate::state::{CdmTables, EtlState, StageAudit};
