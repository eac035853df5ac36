//! Fact tables: one row per record, natural values swapped for dimension keys.

use super::dimension::Dimension;
use crate::error::{EtlError, Result};
use crate::table::{Cell, Table};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What to do when a requested output column does not exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    /// Omit the column and carry on
    #[default]
    Lenient,
    /// Fail with a missing-column error
    Strict,
}

struct FactJoin<'a> {
    natural_column: String,
    dimension: &'a Dimension,
}

/// Left-joins records to dimensions and projects the fact columns.
///
/// Every input record yields exactly one output row. A record whose natural
/// value has no dimension row gets a null foreign key.
pub struct FactAssembler<'a> {
    joins: Vec<FactJoin<'a>>,
    mode: ProjectionMode,
}

impl<'a> FactAssembler<'a> {
    pub fn new(mode: ProjectionMode) -> Self {
        Self {
            joins: Vec::new(),
            mode,
        }
    }

    /// Resolve `natural_column` against `dimension`, adding its key column
    pub fn join(mut self, natural_column: &str, dimension: &'a Dimension) -> Self {
        self.joins.push(FactJoin {
            natural_column: natural_column.to_string(),
            dimension,
        });
        self
    }

    pub fn assemble<S: AsRef<str>>(&self, records: &Table, name: &str, output_columns: &[S]) -> Result<Table> {
        let mut joined = records.clone();
        joined.set_name(name);

        for join in &self.joins {
            let key_column = join.dimension.key_column();
            let values = match joined.column_values(&join.natural_column) {
                Ok(values) => values,
                Err(e) if e.is_missing_column() && self.mode == ProjectionMode::Lenient => {
                    warn!(
                        "⚠️ '{}' has no column '{}', skipping join to '{}'",
                        records.name(),
                        join.natural_column,
                        join.dimension.name()
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            let keys: Vec<Cell> = values
                .iter()
                .map(|v| v.and_then(|v| join.dimension.key_for(v.trim())).map(str::to_string))
                .collect();
            let unmatched = keys.iter().filter(|k| k.is_none()).count();
            if unmatched > 0 {
                debug!(
                    "{} of {} rows of '{}' found no '{}' row",
                    unmatched,
                    keys.len(),
                    name,
                    join.dimension.name()
                );
            }

            if joined.has_column(key_column) {
                let mut iter = keys.into_iter();
                joined.map_column(key_column, |_| iter.next().flatten())?;
            } else {
                joined.add_column(key_column, keys)?;
            }
        }

        let projection = joined.project(output_columns);
        if !projection.missing.is_empty() {
            match self.mode {
                ProjectionMode::Strict => {
                    return Err(EtlError::missing_column(name, projection.missing[0].clone()));
                }
                ProjectionMode::Lenient => {
                    debug!("'{}' omits absent columns {:?}", name, projection.missing);
                }
            }
        }
        Ok(projection.table)
    }
}

/// Replace each dimension key column found in `fact` by the dimension's value
/// and extra columns. Columns whose names clash with existing ones are
/// prefixed with the dimension name.
pub fn denormalize(fact: &Table, name: &str, dimensions: &[&Dimension]) -> Result<Table> {
    let mut wide = fact.clone();
    wide.set_name(name);

    for dimension in dimensions {
        let keys: Vec<Option<String>> = match wide.column_values(dimension.key_column()) {
            Ok(values) => values.into_iter().map(|v| v.map(str::to_string)).collect(),
            Err(_) => continue,
        };

        let mut columns = vec![dimension.value_column().to_string()];
        columns.extend(dimension.extra_columns().iter().cloned());

        for (i, column) in columns.iter().enumerate() {
            let values: Vec<Cell> = keys
                .iter()
                .map(|k| {
                    let entry = k.as_deref().and_then(|k| dimension.entry_by_key(k))?;
                    if i == 0 {
                        Some(entry.value.clone())
                    } else {
                        entry.extras.get(i - 1).cloned()
                    }
                })
                .collect();
            let label = if wide.has_column(column) {
                format!("{}_{}", dimension.name(), column)
            } else {
                column.clone()
            };
            wide.add_column(&label, values)?;
        }
        wide.drop_columns(&[dimension.key_column()]);
    }
    Ok(wide)
}
