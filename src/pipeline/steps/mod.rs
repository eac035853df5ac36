use crate::error::Result;
use crate::pipeline::processing::dimension::{DimensionBuilder, DimensionModel, ValueNormalizer};
use crate::pipeline::processing::splitter::MultiValueSplitter;
use crate::storage::{TableId, TableStore};
use crate::table::Table;
use metrics::counter;
use serde::Serialize;
use tracing::warn;

/// Common trait for the four pipeline stages
pub trait Stage {
    /// Name used on the command line and in the run report
    fn name(&self) -> &'static str;

    /// Stages whose outputs this stage reads
    fn dependencies(&self) -> Vec<&'static str>;

    /// Tables from earlier stages that must exist before this stage starts
    fn inputs(&self) -> Vec<TableId> {
        Vec::new()
    }

    /// Run the stage, writing its tables into `store`
    fn execute(&self, store: &mut dyn TableStore) -> Result<StageResult>;
}

/// One table written by a stage
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub rows: usize,
}

/// Result of executing one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: String,
    pub tables: Vec<TableSummary>,
    /// Models not built because their source column was absent
    pub skipped_models: Vec<String>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
    pub message: String,
}

impl StageResult {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            tables: Vec::new(),
            skipped_models: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
            message: String::new(),
        }
    }

    pub fn rows_written(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }

    /// Row count of a written table, looked up by `source/name`
    pub fn table_rows(&self, table: &str) -> Option<usize> {
        self.tables.iter().find(|t| t.table == table).map(|t| t.rows)
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("⚠️ {}", message);
        self.warnings.push(message);
    }

    /// Persist a table and record it in the summary
    pub fn save(&mut self, store: &mut dyn TableStore, id: TableId, table: Table) -> Result<()> {
        let rows = table.len();
        store.put(&id, table)?;
        self.tables.push(TableSummary {
            table: id.to_string(),
            rows,
        });
        Ok(())
    }

    /// Persist a dimension and its bridge
    pub fn save_model(&mut self, store: &mut dyn TableStore, source: &str, model: &DimensionModel, dimension_table: &str, bridge_table: &str) -> Result<()> {
        self.save(store, TableId::new(source, dimension_table), model.dimension.to_table()?)?;
        self.save(store, TableId::new(source, bridge_table), model.bridge.to_table(bridge_table)?)
    }

    /// Turn a missing-column failure into a skipped model; anything else propagates
    pub fn optional<T>(&mut self, model: &str, built: Result<T>) -> Result<Option<T>> {
        match built {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_missing_column() => {
                self.warn(format!("Skipping model '{}': {}", model, e));
                counter!("etl_skipped_models_total", "stage" => self.stage.clone()).increment(1);
                self.skipped_models.push(model.to_string());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Split one multi-valued column and build its dimension and bridge
pub fn split_and_build(
    records: &Table,
    record_column: &str,
    column: &str,
    splitter: &MultiValueSplitter,
    builder: DimensionBuilder,
    normalizer: &dyn ValueNormalizer,
) -> Result<DimensionModel> {
    let atoms = splitter.split_column(records, record_column, column)?;
    builder.build(&atoms, normalizer)
}

pub mod cncflora;
pub mod espacenet;
pub mod scopus;
pub mod unify;

pub use cncflora::CncfloraStage;
pub use espacenet::EspacenetStage;
pub use scopus::ScopusStage;
pub use unify::UnifyStage;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::storage::InMemoryTableStore;

    #[test]
    fn test_optional_skips_only_missing_columns() {
        let mut result = StageResult::new("scopus");
        let skipped: Option<()> = result
            .optional("keywords", Err(EtlError::missing_column("scopus", "author_keywords")))
            .unwrap();
        assert!(skipped.is_none());
        assert_eq!(result.skipped_models, vec!["keywords".to_string()]);
        assert_eq!(result.warnings.len(), 1);

        let fatal = result.optional::<()>("x", Err(EtlError::SchemaMismatch("bad".into())));
        assert!(fatal.is_err());
    }

    #[test]
    fn test_save_records_row_counts() {
        let mut store = InMemoryTableStore::new();
        let mut result = StageResult::new("cncflora");
        let table = Table::from_rows("t", &["a"], &[&["1"], &["2"]]).unwrap();
        result.save(&mut store, TableId::new("cncflora", "dim_groups"), table).unwrap();
        assert_eq!(result.table_rows("cncflora/dim_groups"), Some(2));
        assert_eq!(result.rows_written(), 2);
        assert!(store.contains(&TableId::new("cncflora", "dim_groups")));
    }
}
