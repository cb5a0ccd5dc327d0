//! Named-dataset arena shared by the pipeline stages.
//!
//! Stages read the frames earlier stages produced and publish their
//! own under a well-known name. Asking for a frame that has not been
//! published is a sequencing bug and fails with the stage dependency
//! spelled out, not a panic.

use std::collections::BTreeMap;

use omop_model::{EtlError, Result};
use polars::prelude::DataFrame;
use tracing::debug;

#[derive(Debug, Default)]
pub struct StagingArena {
    frames: BTreeMap<String, DataFrame>,
}

impl StagingArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame, replacing any previous frame of the same name.
    /// Re-runs drop-and-recreate, they never append.
    pub fn publish(&mut self, name: &str, frame: DataFrame) {
        debug!(name, rows = frame.height(), "published staging frame");
        self.frames.insert(name.to_string(), frame);
    }

    pub fn get(&self, stage: &'static str, name: &'static str) -> Result<&DataFrame> {
        self.frames
            .get(name)
            .ok_or(EtlError::MissingStage {
                stage,
                dependency: name,
            })
    }

    pub fn maybe(&self, name: &str) -> Option<&DataFrame> {
        self.frames.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frames.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.frames.keys().map(String::as_str)
    }
}
