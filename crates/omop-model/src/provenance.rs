use serde::{Deserialize, Serialize};

/// Provenance triplet plus trace id, threaded through every derived row.
///
/// `trace_id` is the row's stable identity: it joins derived facts back
/// to the raw input and links sibling facts produced from the same
/// real-world event (e.g. a microbiology specimen and its organisms).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Dotted mapper path, e.g. `meas.chartevents` or `person.patients`.
    pub unit_id: String,
    /// Source table the row was loaded from.
    pub load_table_id: String,
    /// Row index within the source table, when one row maps one-to-one.
    pub load_row_id: Option<i64>,
    /// Deterministic `"<table>:<row>"` identifier.
    pub trace_id: String,
}

impl Provenance {
    pub fn new(unit_id: impl Into<String>, load_table_id: impl Into<String>, load_row_id: Option<i64>, trace_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            load_table_id: load_table_id.into(),
            load_row_id,
            trace_id: trace_id.into(),
        }
    }

    /// Re-tag the provenance with a mapper-specific unit prefix,
    /// e.g. `meas.` + `chartevents`.
    pub fn with_unit_prefix(mut self, prefix: &str) -> Self {
        self.unit_id = format!("{prefix}.{}", self.unit_id);
        self
    }
}
