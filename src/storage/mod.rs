//! Table handoff between stages.
//!
//! Stages never talk to each other directly: each one `put`s the tables it
//! produces and `get`s the tables it consumes through a [`TableStore`]. The
//! CSV store persists everything under the processed directory and falls back
//! to disk for tables produced by an earlier process, which is what makes a
//! single stage rerunnable on its own.

use crate::error::Result;
use crate::table::Table;
use std::fmt;
use std::path::{Path, PathBuf};

pub mod csv_files;
pub mod csv_store;
pub mod in_memory;

pub use csv_store::CsvTableStore;
pub use in_memory::InMemoryTableStore;

/// Identifies one output table: the source sub-directory plus the table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct TableId {
    pub source: String,
    pub name: String,
}

impl TableId {
    pub fn new(source: &str, name: &str) -> Self {
        Self {
            source: source.to_string(),
            name: name.to_string(),
        }
    }

    /// Location of this table under a processed-data root
    pub fn path_under(&self, root: &Path) -> PathBuf {
        root.join(&self.source).join(format!("{}.csv", self.name))
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.name)
    }
}

/// Storage for the tables exchanged between stages
pub trait TableStore {
    /// Persist a table, replacing any previous version
    fn put(&mut self, id: &TableId, table: Table) -> Result<()>;

    /// Fetch a table; a table nobody produced is a missing-input error
    fn get(&mut self, id: &TableId) -> Result<Table>;

    /// Whether `get` would succeed
    fn contains(&self, id: &TableId) -> bool;

    /// Where the table lives, for diagnostics
    fn location(&self, id: &TableId) -> PathBuf {
        PathBuf::from(id.to_string())
    }
}
