//! In-memory tabular data shared by every stage.
//!
//! Cells are optional strings: an empty CSV cell reads back as `None`, which
//! plays the role of a null. Typed columns (years, counts) are stored in their
//! rendered form; the cleaning rules decide what a valid rendering is.

use crate::error::{EtlError, Result};
use std::collections::HashSet;

pub type Cell = Option<String>;

/// A named, ordered set of columns and rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Result of a lenient projection: the projected table plus the requested
/// columns that did not exist.
#[derive(Debug, Clone)]
pub struct Projection {
    pub table: Table,
    pub missing: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_columns<S: AsRef<str>>(name: impl Into<String>, columns: &[S]) -> Self {
        Self::new(name, columns.iter().map(|c| c.as_ref().to_string()).collect())
    }

    /// Convenience constructor used heavily by tests: `""` becomes a null cell.
    pub fn from_rows<S: AsRef<str>>(name: impl Into<String>, columns: &[S], rows: &[&[&str]]) -> Result<Self> {
        let mut table = Self::with_columns(name, columns);
        for row in rows {
            table.push_row(
                row.iter()
                    .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                    .collect(),
            )?;
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Replace every column label at once (same arity required)
    pub fn set_columns(&mut self, columns: Vec<String>) -> Result<()> {
        if columns.len() != self.columns.len() {
            return Err(EtlError::SchemaMismatch(format!(
                "table '{}' has {} columns, got {} labels",
                self.name,
                self.columns.len(),
                columns.len()
            )));
        }
        self.columns = columns;
        Ok(())
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::SchemaMismatch(format!(
                "row with {} cells pushed into table '{}' with {} columns",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| EtlError::missing_column(&self.name, column))
    }

    /// Check several columns at once, reporting the first one missing
    pub fn require_columns(&self, columns: &[&str]) -> Result<Vec<usize>> {
        columns.iter().map(|c| self.require_column(c)).collect()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .and_then(|c| c.as_deref())
    }

    /// All values of one column, in row order
    pub fn column_values(&self, column: &str) -> Result<Vec<Option<&str>>> {
        let idx = self.require_column(column)?;
        Ok(self.rows.iter().map(|r| r[idx].as_deref()).collect())
    }

    /// `(first, second)` value pairs for two columns, in row order
    pub fn column_pairs(&self, first: &str, second: &str) -> Result<Vec<(Option<&str>, Option<&str>)>> {
        let a = self.require_column(first)?;
        let b = self.require_column(second)?;
        Ok(self
            .rows
            .iter()
            .map(|r| (r[a].as_deref(), r[b].as_deref()))
            .collect())
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Keep only the columns for which `keep` returns true
    pub fn retain_columns<F: Fn(&str) -> bool>(&mut self, keep: F) {
        let kept: Vec<usize> = (0..self.columns.len())
            .filter(|&i| keep(&self.columns[i]))
            .collect();
        if kept.len() == self.columns.len() {
            return;
        }
        self.columns = kept.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            let old = std::mem::take(row);
            *row = kept.iter().map(|&i| old[i].clone()).collect();
        }
    }

    /// Drop the named columns; names that do not exist are ignored
    pub fn drop_columns(&mut self, columns: &[&str]) {
        self.retain_columns(|c| !columns.contains(&c));
    }

    pub fn add_column(&mut self, name: &str, values: Vec<Cell>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(EtlError::SchemaMismatch(format!(
                "column '{}' has {} values but table '{}' has {} rows",
                name,
                values.len(),
                self.name,
                self.rows.len()
            )));
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Insert a column at position 0
    pub fn prepend_column(&mut self, name: &str, values: Vec<Cell>) -> Result<()> {
        self.add_column(name, values)?;
        let last = self.columns.len() - 1;
        self.columns[..=last].rotate_right(1);
        for row in &mut self.rows {
            row[..=last].rotate_right(1);
        }
        Ok(())
    }

    /// Rewrite every cell of a column in place
    pub fn map_column<F: FnMut(Option<&str>) -> Cell>(&mut self, column: &str, mut f: F) -> Result<()> {
        let idx = self.require_column(column)?;
        for row in &mut self.rows {
            let new = f(row[idx].as_deref());
            row[idx] = new;
        }
        Ok(())
    }

    /// Fraction of null cells in a column (0.0 for an empty table)
    pub fn null_fraction(&self, column: usize) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let nulls = self.rows.iter().filter(|r| r[column].is_none()).count();
        nulls as f64 / self.rows.len() as f64
    }

    /// Keep the rows matching a predicate
    pub fn filter_rows<F: Fn(&[Cell]) -> bool>(&self, keep: F) -> Table {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Remove fully duplicated rows, keeping the first occurrence.
    /// Returns how many rows were removed.
    pub fn dedup_rows(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen: HashSet<Vec<Cell>> = HashSet::with_capacity(before);
        self.rows.retain(|r| seen.insert(r.clone()));
        before - self.rows.len()
    }

    /// Count rows whose value in `column` already appeared in an earlier row
    pub fn duplicated_values(&self, column: &str) -> Result<usize> {
        let idx = self.require_column(column)?;
        let mut seen = HashSet::new();
        Ok(self
            .rows
            .iter()
            .filter(|r| !seen.insert(r[idx].as_deref()))
            .count())
    }

    /// Project onto `columns` in the requested order, skipping any that do not exist.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Projection {
        let mut indices = Vec::new();
        let mut names = Vec::new();
        let mut missing = Vec::new();
        for column in columns {
            let column = column.as_ref();
            match self.column_index(column) {
                Some(idx) => {
                    indices.push(idx);
                    names.push(column.to_string());
                }
                None => missing.push(column.to_string()),
            }
        }
        let rows = self
            .rows
            .iter()
            .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Projection {
            table: Table {
                name: self.name.clone(),
                columns: names,
                rows,
            },
            missing,
        }
    }

    /// Stack tables vertically. The result has the union of all columns in
    /// first-seen order; cells for columns a table lacks are null.
    pub fn concat(name: impl Into<String>, tables: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        let mut out = Table::new(name, columns);
        for table in tables {
            let mapping: Vec<Option<usize>> = out
                .columns
                .iter()
                .map(|c| table.column_index(c))
                .collect();
            for row in table.rows {
                let new_row = mapping
                    .iter()
                    .map(|m| m.and_then(|i| row[i].clone()))
                    .collect();
                out.rows.push(new_row);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            "sample",
            &["id", "name", "score"],
            &[&["1", "Rosa", "10"], &["2", "", "7"], &["1", "Rosa", "10"]],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_strings_become_nulls() {
        let table = sample();
        assert_eq!(table.cell(1, 1), None);
        assert_eq!(table.cell(0, 1), Some("Rosa"));
    }

    #[test]
    fn test_push_row_checks_arity() {
        let mut table = sample();
        let err = table.push_row(vec![Some("x".into())]).unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatch(_)));
    }

    #[test]
    fn test_dedup_rows_keeps_first() {
        let mut table = sample();
        assert_eq!(table.dedup_rows(), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 0), Some("1"));
    }

    #[test]
    fn test_project_reports_missing_columns() {
        let projection = sample().project(&["score", "nope", "id"]);
        assert_eq!(projection.table.columns(), &["score".to_string(), "id".to_string()]);
        assert_eq!(projection.missing, vec!["nope".to_string()]);
        assert_eq!(projection.table.cell(0, 0), Some("10"));
    }

    #[test]
    fn test_drop_and_rename_columns() {
        let mut table = sample();
        table.drop_columns(&["score", "absent"]);
        assert!(table.rename_column("id", "record_id"));
        assert!(!table.rename_column("absent", "x"));
        assert_eq!(table.columns(), &["record_id".to_string(), "name".to_string()]);
        assert_eq!(table.rows()[0].len(), 2);
    }

    #[test]
    fn test_prepend_column() {
        let mut table = sample();
        table
            .prepend_column("row", vec![Some("a".into()), Some("b".into()), Some("c".into())])
            .unwrap();
        assert_eq!(table.columns()[0], "row");
        assert_eq!(table.cell(2, 0), Some("c"));
        assert_eq!(table.cell(2, 1), Some("1"));
    }

    #[test]
    fn test_concat_unions_columns() {
        let a = Table::from_rows("a", &["x", "y"], &[&["1", "2"]]).unwrap();
        let b = Table::from_rows("b", &["y", "z"], &[&["3", "4"]]).unwrap();
        let all = Table::concat("all", vec![a, b]);
        assert_eq!(all.columns(), &["x".to_string(), "y".to_string(), "z".to_string()]);
        assert_eq!(all.rows()[1], vec![None, Some("3".to_string()), Some("4".to_string())]);
    }

    #[test]
    fn test_null_fraction_and_duplicates() {
        let table = sample();
        let name = table.require_column("name").unwrap();
        assert!((table.null_fraction(name) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(table.duplicated_values("id").unwrap(), 1);
        assert!(table.require_column("missing").unwrap_err().is_missing_column());
    }
}
