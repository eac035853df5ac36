//! Reading and writing delimited files as [`Table`]s.

use crate::error::{EtlError, Result};
use crate::table::{Cell, Table};
use metrics::counter;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Read a delimited file with a header row.
pub fn read_table(path: &Path, name: &str, delimiter: char) -> Result<Table> {
    read_inner(path, name, delimiter, None)
}

/// Read a headerless delimited file, naming its columns positionally.
pub fn read_table_with_columns(path: &Path, name: &str, delimiter: char, columns: &[&str]) -> Result<Table> {
    read_inner(path, name, delimiter, Some(columns))
}

fn read_inner(path: &Path, name: &str, delimiter: char, columns: Option<&[&str]>) -> Result<Table> {
    if !path.is_file() {
        return Err(EtlError::MissingInput {
            path: path.to_path_buf(),
        });
    }

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(columns.is_none())
        .flexible(true)
        .from_path(path)?;

    let header: Vec<String> = match columns {
        Some(cols) => cols.iter().map(|c| c.to_string()).collect(),
        None => rdr
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect(),
    };
    let width = header.len();
    let mut table = Table::new(name, header);

    let mut ragged = 0usize;
    for record in rdr.records() {
        let record = record?;
        if record.len() != width {
            ragged += 1;
        }
        let mut row: Vec<Cell> = record
            .iter()
            .take(width)
            .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
            .collect();
        row.resize(width, None);
        table.push_row(row)?;
    }

    if ragged > 0 {
        warn!(
            "⚠️ {} rows in {} did not match the header width {} and were padded/truncated",
            ragged,
            path.display(),
            width
        );
    }
    counter!("etl_rows_read_total", "table" => name.to_string()).increment(table.len() as u64);
    debug!("Read {} rows from {}", table.len(), path.display());
    Ok(table)
}

/// Write a table as a comma-separated file with a header row. Null cells are
/// written as empty fields.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(table.columns())?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
    }
    wtr.flush()?;
    Ok(())
}

/// List `*.csv` files in `dir`, optionally descending into sub-directories.
/// The result is sorted so consolidation order does not depend on the filesystem.
pub fn list_csv_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(EtlError::MissingInput {
            path: dir.to_path_buf(),
        });
    }
    let mut files = Vec::new();
    collect_csv_files(dir, recursive, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_csv_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_csv_files(&path, recursive, out)?;
            }
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false)
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Read every file and stack them into one table. An empty file list is a
/// missing-input error on `dir`.
pub fn read_and_concat(dir: &Path, files: &[PathBuf], name: &str, delimiter: char) -> Result<Table> {
    if files.is_empty() {
        return Err(EtlError::MissingInput {
            path: dir.join("*.csv"),
        });
    }
    let tables = files
        .iter()
        .map(|f| read_table(f, name, delimiter))
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::concat(name, tables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_preserves_nulls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("t.csv");
        let table = Table::from_rows("t", &["a", "b"], &[&["1", ""], &["x;y", "z"]]).unwrap();
        write_table(&table, &path).unwrap();
        let back = read_table(&path, "t", ',').unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_semicolon_and_ragged_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.csv");
        fs::write(&path, "a;b;c\n1;2\n4;5;6;7\n").unwrap();
        let table = read_table(&path, "p", ';').unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 2), None);
        assert_eq!(table.cell(1, 2), Some("6"));
    }

    #[test]
    fn test_headerless_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("terms.txt");
        fs::write(&path, "Tabebuia rosea,Bignoniaceae\nRosa,Rosaceae\n").unwrap();
        let table = read_table_with_columns(&path, "terms", ',', &["name", "group"]).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 0), Some("Tabebuia rosea"));
    }

    #[test]
    fn test_missing_file_and_dir() {
        let dir = tempdir().unwrap();
        let err = read_table(&dir.path().join("nope.csv"), "x", ',').unwrap_err();
        assert!(matches!(err, EtlError::MissingInput { .. }));
        let err = list_csv_files(&dir.path().join("nope"), false).unwrap_err();
        assert!(matches!(err, EtlError::MissingInput { .. }));
    }

    #[test]
    fn test_list_csv_files_recursive() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.csv"), "a\n1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("sub").join("a.CSV"), "a\n2\n").unwrap();

        assert_eq!(list_csv_files(dir.path(), false).unwrap().len(), 1);
        let all = list_csv_files(dir.path(), true).unwrap();
        assert_eq!(all.len(), 2);

        let table = read_and_concat(dir.path(), &all, "all", ',').unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_concat_of_nothing_is_missing_input() {
        let dir = tempdir().unwrap();
        let err = read_and_concat(dir.path(), &[], "x", ',').unwrap_err();
        assert!(matches!(err, EtlError::MissingInput { .. }));
    }
}
