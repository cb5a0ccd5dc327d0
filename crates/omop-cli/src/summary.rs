//! Run summary tables printed after `omop-forge run`.

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use omop_cli::commands::RunOutcome;
use omop_ingest::SOURCE_TABLES;

pub fn print_summary(outcome: &RunOutcome) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Rows"),
        header_cell("File"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);

    let mut total_rows = 0usize;
    for (name, rows) in &outcome.table_counts {
        total_rows += rows;
        let file = outcome
            .unloaded
            .iter()
            .find(|u| u.table == *name)
            .map(|u| u.path.display().to_string());
        table.add_row(vec![
            Cell::new(name),
            count_cell(*rows),
            match file {
                Some(path) => Cell::new(path),
                None => dim_cell("-"),
            },
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(total_rows).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    println!("{table}");
    print_audit_table(outcome);
}

/// Stage audit: referential misses drop rows by design, and the run
/// summary keeps that loss visible.
fn print_audit_table(outcome: &RunOutcome) {
    if outcome.audits.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Stage"),
        header_cell("Input"),
        header_cell("Emitted"),
        header_cell("Dropped"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Right);
    for audit in &outcome.audits {
        let dropped = if audit.dropped_rows > 0 {
            Cell::new(audit.dropped_rows)
                .fg(Color::Yellow)
                .add_attribute(Attribute::Bold)
        } else {
            dim_cell(audit.dropped_rows)
        };
        table.add_row(vec![
            Cell::new(&audit.stage),
            Cell::new(audit.input_rows),
            Cell::new(audit.emitted_rows),
            dropped,
        ]);
    }
    println!();
    println!("Stages:");
    println!("{table}");
}

/// `omop-forge tables`: the source extract registry.
pub fn print_source_tables() {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("File"),
        header_cell("Columns"),
    ]);
    apply_table_style(&mut table);
    for source in SOURCE_TABLES {
        table.add_row(vec![
            Cell::new(source.name),
            Cell::new(source.file_name),
            Cell::new(source.columns.join(", ")),
        ]);
    }
    println!("{table}");
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn count_cell(value: usize) -> Cell {
    if value > 0 {
        Cell::new(value)
    } else {
        dim_cell(value)
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value.to_string()).add_attribute(Attribute::Dim)
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}
