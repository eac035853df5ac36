use super::csv_files;
use super::{TableId, TableStore};
use crate::error::{EtlError, Result};
use crate::table::Table;
use metrics::counter;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Table store backed by CSV files under the processed-data directory.
///
/// Every `put` writes `<root>/<source>/<name>.csv` immediately and keeps the
/// table cached. `get` serves the cache first and otherwise reads the file a
/// previous run (or a previous `stage` invocation) left behind.
#[derive(Debug)]
pub struct CsvTableStore {
    root: PathBuf,
    cache: HashMap<TableId, Table>,
}

impl CsvTableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &TableId) -> PathBuf {
        id.path_under(&self.root)
    }
}

impl TableStore for CsvTableStore {
    fn put(&mut self, id: &TableId, mut table: Table) -> Result<()> {
        let path = self.path_for(id);
        table.set_name(id.name.clone());
        csv_files::write_table(&table, &path)?;
        counter!("etl_rows_written_total", "table" => id.to_string()).increment(table.len() as u64);
        info!("💾 Saved {} ({} rows)", path.display(), table.len());
        self.cache.insert(id.clone(), table);
        Ok(())
    }

    fn get(&mut self, id: &TableId) -> Result<Table> {
        if let Some(table) = self.cache.get(id) {
            return Ok(table.clone());
        }
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(EtlError::MissingInput { path });
        }
        debug!("Loading {} from disk", path.display());
        let table = csv_files::read_table(&path, &id.name, ',')?;
        self.cache.insert(id.clone(), table.clone());
        Ok(table)
    }

    fn contains(&self, id: &TableId) -> bool {
        self.cache.contains_key(id) || self.path_for(id).is_file()
    }

    fn location(&self, id: &TableId) -> PathBuf {
        self.path_for(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_tables_survive_a_new_store() {
        let dir = tempdir().unwrap();
        let id = TableId::new("cncflora", "dim_species");
        let table = Table::from_rows("dim_species", &["species_id", "scientific_name"], &[&["0", "Rosa"]]).unwrap();

        let mut first = CsvTableStore::new(dir.path());
        first.put(&id, table.clone()).unwrap();
        assert!(dir.path().join("cncflora").join("dim_species.csv").is_file());

        let mut second = CsvTableStore::new(dir.path());
        assert!(second.contains(&id));
        assert_eq!(second.get(&id).unwrap(), table);
    }

    #[test]
    fn test_missing_table_names_the_path() {
        let dir = tempdir().unwrap();
        let mut store = CsvTableStore::new(dir.path());
        let id = TableId::new("unified", "dim_species_master");
        assert!(!store.contains(&id));
        match store.get(&id) {
            Err(EtlError::MissingInput { path }) => assert!(path.ends_with("unified/dim_species_master.csv")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
