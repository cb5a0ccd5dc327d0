#![deny(unsafe_code)]

//! Delivery projections: write the CDM working tables and the
//! resolved vocabulary into the delivery directory, one CSV per
//! table.
//!
//! The projection is the serde view of each row type: internal
//! working state (the provenance block) is marked skip-serializing,
//! so a written row is exactly the documented column list with no
//! further transformation.

pub mod cdm;
pub mod vocab;
mod writer;

pub use crate::cdm::unload_cdm;
pub use crate::vocab::unload_vocabulary;
pub use crate::writer::UnloadedTable;
