use crate::error::Result;
use crate::table::Table;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

/// Drop columns whose share of nulls exceeds `threshold_pct` percent.
/// Returns the dropped labels.
pub fn drop_sparse_columns(table: &mut Table, threshold_pct: f64) -> Vec<String> {
    let sparse: Vec<String> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, _)| table.null_fraction(*idx) * 100.0 > threshold_pct)
        .map(|(_, c)| c.clone())
        .collect();
    if !sparse.is_empty() {
        info!(
            "🧹 Dropping {} columns of '{}' above {}% missing: {:?}",
            sparse.len(),
            table.name(),
            threshold_pct,
            sparse
        );
        table.retain_columns(|c| !sparse.iter().any(|s| s == c));
    }
    sparse
}

/// Replace every null cell with `sentinel`
pub fn fill_nulls(table: &mut Table, sentinel: &str) -> Result<()> {
    let columns: Vec<String> = table.columns().to_vec();
    fill_nulls_in(table, &columns, sentinel)
}

/// Replace null cells with `sentinel` in the listed columns that exist
pub fn fill_nulls_in<S: AsRef<str>>(table: &mut Table, columns: &[S], sentinel: &str) -> Result<()> {
    for column in columns.iter().map(AsRef::as_ref) {
        if table.has_column(column) {
            table.map_column(column, |v| Some(v.map_or_else(|| sentinel.to_string(), str::to_string)))?;
        }
    }
    Ok(())
}

/// Parse an integer-like cell. Float renderings such as `2019.0` are truncated.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

/// Rewrite a column as integers; anything unparsable (sentinels included) becomes 0.
/// A column that does not exist is ignored. Returns how many cells were coerced to 0.
pub fn coerce_integer(table: &mut Table, column: &str) -> usize {
    let mut invalid = 0;
    let coerced = table.map_column(column, |v| {
        let n = v.and_then(parse_integer).unwrap_or_else(|| {
            invalid += 1;
            0
        });
        Some(n.to_string())
    });
    if coerced.is_ok() && invalid > 0 {
        debug!("{} cells of '{}' coerced to 0", invalid, column);
    }
    invalid
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d.%m.%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"];

/// Extract the calendar year of a date-like string, or `None` if it is not one
pub fn parse_year(text: &str) -> Option<i32> {
    let text = text.trim();
    if text.chars().all(|c| c.is_ascii_digit()) {
        return match text.len() {
            4 => text.parse().ok(),
            // Compact YYYYMMDD
            8 => {
                let year: i32 = text[..4].parse().ok()?;
                let month: u32 = text[4..6].parse().ok()?;
                let day: u32 = text[6..].parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, day).map(|d| d.year())
            }
            _ => None,
        };
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.year());
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.year());
        }
    }
    None
}

/// Drop columns with a blank label or one starting with `unnamed` (spreadsheet
/// index columns). Returns how many were dropped.
pub fn drop_unnamed_columns(table: &mut Table) -> usize {
    let before = table.columns().len();
    table.retain_columns(|c| {
        let c = c.trim();
        !c.is_empty() && !c.to_lowercase().starts_with("unnamed")
    });
    before - table.columns().len()
}

/// Prepend a `0..n` row-number column
pub fn add_row_ids(table: &mut Table, column: &str) -> Result<()> {
    let ids = (0..table.len()).map(|i| Some(i.to_string())).collect();
    table.prepend_column(column, ids)
}
