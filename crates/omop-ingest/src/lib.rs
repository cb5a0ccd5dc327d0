#![deny(unsafe_code)]

//! Source CSV staging: table registry, CSV loading into string-typed
//! frames with provenance columns, and the named-dataset arena the
//! pipeline stages read from and write to.

pub mod csv;
pub mod frame;
pub mod staging;
pub mod tables;

pub use crate::csv::load_source_table;
pub use crate::staging::StagingArena;
pub use crate::tables::{SOURCE_TABLES, SourceTable, source_table};
