use super::{TableId, TableStore};
use crate::error::{EtlError, Result};
use crate::table::Table;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// In-memory table store for development/testing
#[derive(Debug, Default)]
pub struct InMemoryTableStore {
    tables: HashMap<TableId, Table>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers of every stored table, sorted
    pub fn ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl TableStore for InMemoryTableStore {
    fn put(&mut self, id: &TableId, table: Table) -> Result<()> {
        debug!("Stored table {} with {} rows", id, table.len());
        self.tables.insert(id.clone(), table);
        Ok(())
    }

    fn get(&mut self, id: &TableId) -> Result<Table> {
        self.tables
            .get(id)
            .cloned()
            .ok_or_else(|| EtlError::MissingInput {
                path: PathBuf::from(id.to_string()),
            })
    }

    fn contains(&self, id: &TableId) -> bool {
        self.tables.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let mut store = InMemoryTableStore::new();
        let id = TableId::new("scopus", "dim_keywords");
        let table = Table::from_rows("dim_keywords", &["keyword_id", "keyword"], &[&["0", "ROSA"]]).unwrap();
        store.put(&id, table.clone()).unwrap();
        assert!(store.contains(&id));
        assert_eq!(store.get(&id).unwrap(), table);
        assert_eq!(store.ids(), vec![id]);
    }

    #[test]
    fn test_missing_table_is_missing_input() {
        let mut store = InMemoryTableStore::new();
        let err = store.get(&TableId::new("unified", "dim_species_master")).unwrap_err();
        assert!(matches!(err, EtlError::MissingInput { .. }));
    }
}
