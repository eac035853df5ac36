//! Dimension and bridge tables, and the builder that derives both from a
//! stream of atomic values.

use super::splitter::AtomicValue;
use crate::error::{EtlError, Result};
use crate::keys::{KeyGenerator, KeyPolicy};
use crate::table::Table;
use metrics::counter;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Output of a [`ValueNormalizer`]: the dedup value plus auxiliary columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub value: String,
    pub extras: Vec<String>,
}

impl Normalized {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            extras: Vec::new(),
        }
    }
}

/// Turns a raw atomic value into the value a dimension deduplicates on.
pub trait ValueNormalizer {
    /// Names of the auxiliary columns returned in [`Normalized::extras`]
    fn extra_columns(&self) -> Vec<String> {
        Vec::new()
    }

    /// `None` drops the value entirely
    fn normalize(&self, raw: &str) -> Option<Normalized>;
}

/// Keeps the trimmed value as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimNormalizer;

impl ValueNormalizer for TrimNormalizer {
    fn normalize(&self, raw: &str) -> Option<Normalized> {
        let value = raw.trim();
        (!value.is_empty()).then(|| Normalized::plain(value))
    }
}

/// Upper-cases and trims
#[derive(Debug, Clone, Copy, Default)]
pub struct UpperTrimNormalizer;

impl ValueNormalizer for UpperTrimNormalizer {
    fn normalize(&self, raw: &str) -> Option<Normalized> {
        let value = raw.trim().to_uppercase();
        (!value.is_empty()).then(|| Normalized::plain(value))
    }
}

/// One dimension row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionEntry {
    pub key: String,
    pub value: String,
    pub extras: Vec<String>,
}

/// Deduplicated values with one synthetic key each.
/// Value → key is injective; both columns are unique.
#[derive(Debug, Clone)]
pub struct Dimension {
    name: String,
    key_column: String,
    value_column: String,
    extra_columns: Vec<String>,
    entries: Vec<DimensionEntry>,
    by_value: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
}

impl Dimension {
    pub fn new(name: &str, key_column: &str, value_column: &str, extra_columns: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            key_column: key_column.to_string(),
            value_column: value_column.to_string(),
            extra_columns,
            entries: Vec::new(),
            by_value: HashMap::new(),
            by_key: HashMap::new(),
        }
    }

    /// Build a dimension directly from values (first-seen order, blanks skipped)
    pub fn from_values<I, S>(name: &str, key_column: &str, value_column: &str, values: I, policy: KeyPolicy) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dimension = Self::new(name, key_column, value_column, Vec::new());
        let mut keys = KeyGenerator::new(policy, name);
        for value in values {
            let value = value.as_ref().trim();
            if !value.is_empty() {
                dimension.insert(value, Vec::new(), &mut keys)?;
            }
        }
        Ok(dimension)
    }

    /// Build a dimension from the distinct non-null values of one column
    pub fn from_column(table: &Table, column: &str, name: &str, key_column: &str, value_column: &str, policy: KeyPolicy) -> Result<Self> {
        let values = table.column_values(column)?;
        Self::from_values(name, key_column, value_column, values.into_iter().flatten(), policy)
    }

    /// Rebuild a dimension persisted by [`to_table`](Self::to_table).
    /// Columns other than key and value become extras.
    pub fn from_table(table: &Table, name: &str, key_column: &str, value_column: &str) -> Result<Self> {
        let key_idx = table.require_column(key_column)?;
        let value_idx = table.require_column(value_column)?;
        let extra_idx: Vec<usize> = (0..table.columns().len())
            .filter(|&i| i != key_idx && i != value_idx)
            .collect();
        let extra_columns = extra_idx.iter().map(|&i| table.columns()[i].clone()).collect();

        let mut dimension = Self::new(name, key_column, value_column, extra_columns);
        for (row_no, row) in table.rows().iter().enumerate() {
            let (key, value) = match (&row[key_idx], &row[value_idx]) {
                (Some(k), Some(v)) => (k.clone(), v.clone()),
                _ => {
                    return Err(EtlError::SchemaMismatch(format!(
                        "dimension '{}' row {} has a null key or value",
                        name, row_no
                    )))
                }
            };
            let extras = extra_idx
                .iter()
                .map(|&i| row[i].clone().unwrap_or_default())
                .collect();
            dimension.push_entry(DimensionEntry { key, value, extras })?;
        }
        Ok(dimension)
    }

    /// Insert `value` if unseen and return its key. Extras are only recorded
    /// for the first occurrence.
    pub fn insert(&mut self, value: &str, extras: Vec<String>, keys: &mut KeyGenerator) -> Result<String> {
        if let Some(&idx) = self.by_value.get(value) {
            return Ok(self.entries[idx].key.clone());
        }
        let key = keys.next_key(value);
        self.push_entry(DimensionEntry {
            key: key.clone(),
            value: value.to_string(),
            extras,
        })?;
        Ok(key)
    }

    fn push_entry(&mut self, entry: DimensionEntry) -> Result<()> {
        if self.by_value.contains_key(&entry.value) {
            return Err(EtlError::SchemaMismatch(format!(
                "dimension '{}' has duplicate value '{}'",
                self.name, entry.value
            )));
        }
        if self.by_key.contains_key(&entry.key) {
            return Err(EtlError::SchemaMismatch(format!(
                "dimension '{}' has duplicate key '{}'",
                self.name, entry.key
            )));
        }
        let idx = self.entries.len();
        self.by_value.insert(entry.value.clone(), idx);
        self.by_key.insert(entry.key.clone(), idx);
        self.entries.push(entry);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn value_column(&self) -> &str {
        &self.value_column
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    pub fn entries(&self) -> &[DimensionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.value.as_str())
    }

    pub fn key_for(&self, value: &str) -> Option<&str> {
        self.by_value.get(value).map(|&i| self.entries[i].key.as_str())
    }

    pub fn entry_by_key(&self, key: &str) -> Option<&DimensionEntry> {
        self.by_key.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Columns: key, value, then extras
    pub fn to_table(&self) -> Result<Table> {
        let mut columns = vec![self.key_column.clone(), self.value_column.clone()];
        columns.extend(self.extra_columns.iter().cloned());
        let mut table = Table::new(self.name.clone(), columns);
        for entry in &self.entries {
            let mut row = vec![Some(entry.key.clone()), Some(entry.value.clone())];
            row.extend(entry.extras.iter().map(|e| Some(e.clone())));
            table.push_row(row)?;
        }
        Ok(table)
    }
}

/// One `(record, key[, tag])` link
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BridgeRow {
    pub record_id: String,
    pub key: String,
    pub tag: Option<String>,
}

/// Distinct record ↔ dimension-key links, in first-seen order
#[derive(Debug, Clone)]
pub struct Bridge {
    record_column: String,
    key_column: String,
    tag_column: Option<String>,
    rows: Vec<BridgeRow>,
    seen: HashSet<BridgeRow>,
}

impl Bridge {
    pub fn new(record_column: &str, key_column: &str) -> Self {
        Self {
            record_column: record_column.to_string(),
            key_column: key_column.to_string(),
            tag_column: None,
            rows: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn with_tag_column(mut self, tag_column: &str) -> Self {
        self.tag_column = Some(tag_column.to_string());
        self
    }

    /// Add a link; returns false if it was already present
    pub fn push(&mut self, row: BridgeRow) -> bool {
        if self.seen.contains(&row) {
            return false;
        }
        self.seen.insert(row.clone());
        self.rows.push(row);
        true
    }

    pub fn link(&mut self, record_id: &str, key: &str, tag: Option<&str>) -> bool {
        self.push(BridgeRow {
            record_id: record_id.to_string(),
            key: key.to_string(),
            tag: tag.map(str::to_string),
        })
    }

    pub fn rows(&self) -> &[BridgeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn record_column(&self) -> &str {
        &self.record_column
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn tag_column(&self) -> Option<&str> {
        self.tag_column.as_deref()
    }

    /// Keys that have no row in `dimension`
    pub fn dangling_keys<'a>(&'a self, dimension: &Dimension) -> Vec<&'a str> {
        self.rows
            .iter()
            .filter(|r| !dimension.contains_key(&r.key))
            .map(|r| r.key.as_str())
            .collect()
    }

    /// Record ids not present in `record_ids`
    pub fn unknown_records<'a>(&'a self, record_ids: &HashSet<&str>) -> Vec<&'a str> {
        self.rows
            .iter()
            .filter(|r| !record_ids.contains(r.record_id.as_str()))
            .map(|r| r.record_id.as_str())
            .collect()
    }

    /// Columns: record, key, then the tag column if any
    pub fn to_table(&self, name: &str) -> Result<Table> {
        let mut columns = vec![self.record_column.clone(), self.key_column.clone()];
        if let Some(tag) = &self.tag_column {
            columns.push(tag.clone());
        }
        let mut table = Table::new(name, columns);
        for row in &self.rows {
            let mut cells = vec![Some(row.record_id.clone()), Some(row.key.clone())];
            if self.tag_column.is_some() {
                cells.push(row.tag.clone());
            }
            table.push_row(cells)?;
        }
        Ok(table)
    }

    /// Rebuild a bridge from a persisted table
    pub fn from_table(table: &Table, record_column: &str, key_column: &str, tag_column: Option<&str>) -> Result<Self> {
        let rec_idx = table.require_column(record_column)?;
        let key_idx = table.require_column(key_column)?;
        let tag_idx = tag_column.map(|c| table.require_column(c)).transpose()?;
        let mut bridge = Bridge::new(record_column, key_column);
        if let Some(tag) = tag_column {
            bridge = bridge.with_tag_column(tag);
        }
        for row in table.rows() {
            if let (Some(record_id), Some(key)) = (&row[rec_idx], &row[key_idx]) {
                bridge.link(record_id, key, tag_idx.and_then(|i| row[i].as_deref()));
            }
        }
        Ok(bridge)
    }
}

/// A dimension and the bridge that references it
#[derive(Debug, Clone)]
pub struct DimensionModel {
    pub dimension: Dimension,
    pub bridge: Bridge,
    /// Normalized values that absorbed more than one distinct raw spelling
    pub collisions: usize,
}

/// Deduplicates atomic values into a [`Dimension`] and links records through a [`Bridge`].
#[derive(Debug, Clone)]
pub struct DimensionBuilder {
    name: String,
    key_column: String,
    value_column: String,
    record_column: String,
    tag_column: Option<String>,
    policy: KeyPolicy,
}

impl DimensionBuilder {
    /// Defaults: value column `name`, key column `name_id`, record column `record_id`
    pub fn new(name: &str, policy: KeyPolicy) -> Self {
        Self {
            name: name.to_string(),
            key_column: format!("{}_id", name),
            value_column: name.to_string(),
            record_column: "record_id".to_string(),
            tag_column: None,
            policy,
        }
    }

    pub fn key_column(mut self, column: &str) -> Self {
        self.key_column = column.to_string();
        self
    }

    pub fn value_column(mut self, column: &str) -> Self {
        self.value_column = column.to_string();
        self
    }

    pub fn record_column(mut self, column: &str) -> Self {
        self.record_column = column.to_string();
        self
    }

    pub fn tag_column(mut self, column: &str) -> Self {
        self.tag_column = Some(column.to_string());
        self
    }

    pub fn build(&self, atoms: &[AtomicValue], normalizer: &dyn ValueNormalizer) -> Result<DimensionModel> {
        let mut dimension = Dimension::new(&self.name, &self.key_column, &self.value_column, normalizer.extra_columns());
        let mut bridge = Bridge::new(&self.record_column, &self.key_column);
        if let Some(tag) = &self.tag_column {
            bridge = bridge.with_tag_column(tag);
        }
        let mut keys = KeyGenerator::new(self.policy, &self.name);
        let mut spellings: HashMap<String, HashSet<&str>> = HashMap::new();

        for atom in atoms {
            let normalized = match normalizer.normalize(&atom.value) {
                Some(n) if !n.value.is_empty() => n,
                _ => continue,
            };
            spellings
                .entry(normalized.value.clone())
                .or_default()
                .insert(atom.value.as_str());
            let key = dimension.insert(&normalized.value, normalized.extras, &mut keys)?;
            bridge.push(BridgeRow {
                record_id: atom.record_id.clone(),
                key,
                tag: atom.tag.clone(),
            });
        }

        let mut collisions = 0;
        for (value, raws) in &spellings {
            if raws.len() > 1 {
                collisions += 1;
                debug!("'{}' absorbed {} raw spellings in dimension '{}'", value, raws.len(), self.name);
            }
        }
        if collisions > 0 {
            warn!(
                "⚠️ {} values in dimension '{}' merged distinct raw spellings",
                collisions, self.name
            );
            counter!("etl_normalization_collisions_total", "dimension" => self.name.clone()).increment(collisions as u64);
        }

        info!(
            "✅ Built dimension '{}' with {} values and {} bridge rows",
            self.name,
            dimension.len(),
            bridge.len()
        );
        Ok(DimensionModel {
            dimension,
            bridge,
            collisions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::splitter::{Delimiter, MultiValueSplitter};
    use std::collections::BTreeSet;

    fn keyword_atoms() -> Vec<AtomicValue> {
        let table = Table::from_rows(
            "articles",
            &["eid", "author_keywords"],
            &[
                &["e1", "Ipê; Tabebuia; conservation"],
                &["e2", "tabebuia ;Conservation"],
                &["e3", "nao_informado"],
                &["e4", ""],
            ],
        )
        .unwrap();
        MultiValueSplitter::new(Delimiter::pattern(r"\s*;\s*").unwrap())
            .with_sentinel("nao_informado")
            .split_column(&table, "eid", "author_keywords")
            .unwrap()
    }

    #[test]
    fn test_dimension_values_and_keys_are_unique() {
        let model = DimensionBuilder::new("keyword", KeyPolicy::Sequential)
            .record_column("article_id")
            .build(&keyword_atoms(), &UpperTrimNormalizer)
            .unwrap();
        let dim = &model.dimension;
        let values: Vec<&str> = dim.values().collect();
        assert_eq!(values, vec!["IPÊ", "TABEBUIA", "CONSERVATION"]);
        let keys: HashSet<&str> = dim.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys.len(), dim.len());
        assert_eq!(dim.key_for("TABEBUIA"), Some("1"));
        assert_eq!(model.collisions, 2);
    }

    #[test]
    fn test_bridge_referential_closure_and_round_trip() {
        let atoms = keyword_atoms();
        let model = DimensionBuilder::new("keyword", KeyPolicy::Random)
            .build(&atoms, &UpperTrimNormalizer)
            .unwrap();
        assert!(model.bridge.dangling_keys(&model.dimension).is_empty());
        let records: HashSet<&str> = ["e1", "e2", "e3", "e4"].into_iter().collect();
        assert!(model.bridge.unknown_records(&records).is_empty());

        // Joining back reconstructs each record's distinct normalized values
        for record in ["e1", "e2"] {
            let rebuilt: BTreeSet<String> = model
                .bridge
                .rows()
                .iter()
                .filter(|r| r.record_id == record)
                .map(|r| model.dimension.entry_by_key(&r.key).unwrap().value.clone())
                .collect();
            let expected: BTreeSet<String> = atoms
                .iter()
                .filter(|a| a.record_id == record)
                .map(|a| a.value.to_uppercase())
                .collect();
            assert_eq!(rebuilt, expected);
        }
        assert!(model.bridge.rows().iter().all(|r| r.record_id != "e3"));
    }

    #[test]
    fn test_bridge_rows_are_distinct() {
        let atoms = vec![
            AtomicValue { record_id: "r".into(), position: 0, value: "a".into(), tag: None },
            AtomicValue { record_id: "r".into(), position: 1, value: "A".into(), tag: None },
        ];
        let model = DimensionBuilder::new("x", KeyPolicy::Sequential)
            .build(&atoms, &UpperTrimNormalizer)
            .unwrap();
        assert_eq!(model.dimension.len(), 1);
        assert_eq!(model.bridge.len(), 1);
    }

    #[test]
    fn test_tagged_bridge_keeps_tag_in_identity() {
        let atoms = vec![
            AtomicValue { record_id: "p".into(), position: 0, value: "ACME".into(), tag: Some("inventor".into()) },
            AtomicValue { record_id: "p".into(), position: 0, value: "ACME".into(), tag: Some("applicant".into()) },
        ];
        let model = DimensionBuilder::new("party", KeyPolicy::Sequential)
            .tag_column("role")
            .build(&atoms, &TrimNormalizer)
            .unwrap();
        assert_eq!(model.bridge.len(), 2);
        let table = model.bridge.to_table("bridge_patent_parties").unwrap();
        assert_eq!(table.columns(), &["record_id".to_string(), "party_id".to_string(), "role".to_string()]);
    }

    #[test]
    fn test_dimension_table_round_trip_through_from_table() {
        let dim = Dimension::from_values("group", "group_id", "group_name", ["Angiosperms", "Ferns", "Angiosperms", " "], KeyPolicy::Sequential).unwrap();
        assert_eq!(dim.len(), 2);
        let back = Dimension::from_table(&dim.to_table().unwrap(), "group", "group_id", "group_name").unwrap();
        assert_eq!(back.entries(), dim.entries());
    }

    #[test]
    fn test_from_table_rejects_duplicate_values() {
        let table = Table::from_rows("d", &["id", "v"], &[&["0", "A"], &["1", "A"]]).unwrap();
        assert!(matches!(Dimension::from_table(&table, "d", "id", "v"), Err(EtlError::SchemaMismatch(_))));
    }
}
