use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

/// One written delivery file.
#[derive(Debug, Clone)]
pub struct UnloadedTable {
    pub table: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// Serialize rows into `<dir>/<table>.csv`, overwriting any previous
/// delivery. Headers come from the row type's serde field names; an
/// empty table still produces its (empty) file so the delivery set is
/// complete.
pub fn write_table<T: Serialize>(dir: &Path, table: &str, rows: &[T]) -> Result<UnloadedTable> {
    let path = dir.join(format!("{table}.csv"));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("creating delivery file {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("writing {table} row"))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    info!(table, rows = rows.len(), path = %path.display(), "unloaded table");
    Ok(UnloadedTable {
        table: table.to_string(),
        path,
        rows: rows.len(),
    })
}
