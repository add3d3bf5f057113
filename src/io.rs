//! Table I/O: CSV and Excel workbooks
//!
//! The engine itself never touches files; these loaders and writers are the
//! thin adapters around it. CSV cells are kept as strings (downstream code
//! parses what it needs); Excel cells map onto the tagged [`Value`] model.
//! Workbook writes fall back to CSV (first sheet only) when the xlsx writer
//! fails, so a run never silently loses its final output.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Days, NaiveDate};

use crate::table::{Table, Value};

/// Excel sheet names are capped at 31 characters.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Truncate a sheet name to the Excel limit.
pub fn truncate_sheet_name(name: &str) -> String {
    name.chars().take(MAX_SHEET_NAME_LEN).collect()
}

/// Source system tag for a file: its stem (`crm_batch7.xlsx` → `crm_batch7`).
pub fn source_system_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rulebook key for a source system: the stem prefix before the first `_`.
pub fn source_key(source_system: &str) -> &str {
    source_system
        .split('_')
        .next()
        .unwrap_or(source_system)
}

/// Read a table from a file, dispatching on extension.
///
/// `.csv` via the csv crate; `.xlsx` / `.xlsm` / `.xls` / `.ods` read their
/// first sheet via calamine.
pub fn read_table(path: &Path) -> Result<Table> {
    match extension_of(path).as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xlsm" | "xls" | "ods" => {
            let names = sheet_names(path)?;
            let Some(first) = names.first() else {
                bail!("workbook {} has no sheets", path.display());
            };
            read_sheet(path, first)
        }
        other => bail!(
            "unsupported table format `.{other}` for {} (expected csv or xlsx)",
            path.display()
        ),
    }
}

/// Sheet names of a workbook, in file order.
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    Ok(workbook.sheet_names().to_owned())
}

/// Read one named sheet of a workbook.
pub fn read_sheet(path: &Path, sheet: &str) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("Failed to read sheet `{sheet}` of {}", path.display()))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let mut table = Table::new(header.iter().map(|c| c.to_string()));
    for row in rows {
        table.push_row(row.iter().map(cell_to_value).collect());
    }
    tracing::debug!(
        path = %path.display(),
        sheet,
        rows = table.row_count(),
        "read worksheet"
    );
    Ok(table)
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                Value::Empty
            } else {
                Value::Str(s.clone())
            }
        }
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Str(b.to_string()),
        Data::DateTime(serial) => excel_serial_to_value(serial.as_f64()),
        Data::Error(_) => Value::Empty,
        // DateTimeIso / DurationIso / Duration all render sensibly as text.
        other => Value::Str(other.to_string()),
    }
}

/// Excel date serial → calendar date (1900 date system, day 0 = 1899-12-30).
fn excel_serial_to_value(serial: f64) -> Value {
    let days = serial.floor();
    if days < 0.0 {
        return Value::Float(serial);
    }
    match NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|base| base.checked_add_days(Days::new(days as u64)))
    {
        Some(date) => Value::Date(date),
        None => Value::Float(serial),
    }
}

/// Read a CSV file. All non-empty cells are strings.
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();
    let mut table = Table::new(headers.iter());

    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read row of {}", path.display()))?;
        table.push_row(
            record
                .iter()
                .map(|cell| {
                    if cell.trim().is_empty() {
                        Value::Empty
                    } else {
                        Value::Str(cell.to_string())
                    }
                })
                .collect(),
        );
    }
    tracing::debug!(path = %path.display(), rows = table.row_count(), "read csv");
    Ok(table)
}

/// Write a table as CSV.
pub fn write_csv(path: &Path, table: &Table) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer
        .write_record(table.columns())
        .context("Failed to write csv header")?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(Value::to_display))
            .context("Failed to write csv row")?;
    }
    writer.flush().context("Failed to flush csv")?;
    Ok(())
}

/// Write a multi-sheet workbook. Sheet names are truncated to 31 chars.
///
/// Returns the path actually written: on xlsx failure the first sheet is
/// written as CSV next to the target instead (warned, matching the driver's
/// never-lose-the-final-output posture).
pub fn write_workbook(path: &Path, sheets: &[(String, &Table)]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    match write_workbook_xlsx(path, sheets) {
        Ok(()) => Ok(path.to_path_buf()),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "xlsx write failed; saving first sheet as CSV");
            let Some((_, first)) = sheets.first() else {
                bail!("no sheets to write for {}", path.display());
            };
            let csv_path = path.with_extension("csv");
            write_csv(&csv_path, first)?;
            Ok(csv_path)
        }
    }
}

fn write_workbook_xlsx(path: &Path, sheets: &[(String, &Table)]) -> Result<()> {
    let mut book = umya_spreadsheet::new_file_empty_worksheet();

    for (name, table) in sheets {
        let name = truncate_sheet_name(name);
        let sheet = book
            .new_sheet(&name)
            .map_err(|e| anyhow::anyhow!("failed to add sheet `{name}`: {e}"))?;
        for (col, header) in table.columns().iter().enumerate() {
            sheet
                .get_cell_mut((col as u32 + 1, 1))
                .set_value(header.clone());
        }
        for (row_idx, row) in table.rows().iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                let cell = sheet.get_cell_mut((col as u32 + 1, row_idx as u32 + 2));
                match value {
                    Value::Int(i) => {
                        cell.set_value_number(*i as f64);
                    }
                    Value::Float(f) => {
                        cell.set_value_number(*f);
                    }
                    Value::Empty => {}
                    other => {
                        cell.set_value(other.to_display());
                    }
                }
            }
        }
    }

    umya_spreadsheet::writer::xlsx::write(&book, path)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {:?}", path.display(), e))?;
    tracing::debug!(path = %path.display(), sheets = sheets.len(), "wrote workbook");
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
