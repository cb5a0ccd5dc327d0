//! CSV extract loading.
//!
//! Every source table is staged as a string-typed frame in the
//! table's declared column order, plus two provenance columns:
//! `load_row_id` (0-based row index) and `trace_id`
//! (`"<table>:<row>"`), the stable identity every derived fact keeps.

use std::path::Path;

use csv::ReaderBuilder;
use omop_model::{EtlError, Result};
use polars::prelude::{Column, DataFrame, NamedFrom, Series};
use tracing::info;

use crate::tables::SourceTable;

/// Load one source CSV into a staging frame, validating the header
/// against the table registry. Extra columns in the extract are
/// ignored; a missing declared column is fatal.
pub fn load_source_table(path: &Path, table: &SourceTable) -> Result<DataFrame> {
    let mut reader = ReaderBuilder::new()
        .flexible(false)
        .from_path(path)
        .map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let headers = reader
        .headers()
        .map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let header_index = |name: &str| headers.iter().position(|h| h.trim() == name);

    let mut indices = Vec::with_capacity(table.columns.len());
    for column in table.columns {
        let Some(index) = header_index(column) else {
            return Err(EtlError::MissingColumn {
                table: table.name.to_string(),
                column: (*column).to_string(),
            });
        };
        indices.push(index);
    }

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); table.columns.len()];
    let mut row_ids: Vec<i64> = Vec::new();
    let mut trace_ids: Vec<String> = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|source| EtlError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        for (slot, &index) in values.iter_mut().zip(indices.iter()) {
            let cell = record.get(index).unwrap_or("").trim();
            slot.push(if cell.is_empty() {
                None
            } else {
                Some(cell.to_string())
            });
        }
        row_ids.push(row_idx as i64);
        trace_ids.push(format!("{}:{row_idx}", table.name));
    }

    let mut columns: Vec<Column> = Vec::with_capacity(table.columns.len() + 2);
    for (name, column_values) in table.columns.iter().zip(values) {
        columns.push(Series::new((*name).into(), column_values).into());
    }
    columns.push(Series::new("load_row_id".into(), row_ids).into());
    columns.push(Series::new("trace_id".into(), trace_ids).into());

    let frame = DataFrame::new(columns)
        .map_err(|e| EtlError::message(format!("staging {}: {e}", table.name)))?;
    info!(table = table.name, rows = frame.height(), path = %path.display(), "staged source table");
    Ok(frame)
}
