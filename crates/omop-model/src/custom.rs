use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};

/// One row of the custom-mapping interchange file.
///
/// Produced by the fuzzy-match stage and consumed by the custom
/// vocabulary builder. The column list, including the misspelled
/// `reverese_relationship_id` header, is the on-disk wire format of
/// the upstream mapping files and is preserved verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomMapping {
    pub source_concept_id: i64,
    /// The original raw source value.
    pub concept_name: String,
    pub source_domain_id: String,
    pub source_vocabulary_id: String,
    pub source_concept_class_id: String,
    pub standard_concept: Option<String>,
    pub concept_code: String,
    pub valid_start_date: NaiveDate,
    pub valid_end_date: NaiveDate,
    pub invalid_reason: Option<String>,
    pub relationship_id: String,
    #[serde(rename = "reverese_relationship_id")]
    pub reverse_relationship_id: String,
    pub invalid_reason_cr: Option<String>,
    pub relationship_valid_start_date: NaiveDate,
    pub relationship_end_date: NaiveDate,
    /// Zero means "unmapped": the custom concept stands alone.
    pub target_concept_id: i64,
}

impl CustomMapping {
    /// A broken mapping row poisons the whole vocabulary build, so the
    /// required fields are checked before any allocation happens.
    pub fn validate(&self, row: usize) -> Result<()> {
        let missing = if self.concept_name.trim().is_empty() {
            Some("concept_name")
        } else if self.source_vocabulary_id.trim().is_empty() {
            Some("source_vocabulary_id")
        } else if self.source_domain_id.trim().is_empty() {
            Some("source_domain_id")
        } else if self.concept_code.trim().is_empty() {
            Some("concept_code")
        } else if self.relationship_id.trim().is_empty() {
            Some("relationship_id")
        } else if self.reverse_relationship_id.trim().is_empty() {
            Some("reverese_relationship_id")
        } else {
            None
        };
        match missing {
            Some(field) => Err(EtlError::MalformedMapping {
                row,
                reason: format!("missing required field {field}"),
            }),
            None => Ok(()),
        }
    }
}
