#![deny(unsafe_code)]

//! Library side of the migration CLI: logging setup, the lookup
//! vocabulary build and the phase orchestration.

pub mod commands;
pub mod logging;
pub mod lookup;
