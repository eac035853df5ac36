use super::{split_and_build, Stage, StageResult};
use crate::config::{Config, EspacenetConfig, ModelConfig};
use crate::constants::{country_name, ESPACENET_STAGE, SPECIES_MASTER_TABLE, UNIFIED_DIR, UNIFY_STAGE};
use crate::error::{EtlError, Result};
use crate::keys::KeyPolicy;
use crate::pipeline::processing::cleaning::{drop_unnamed_columns, fill_nulls_in, parse_year};
use crate::pipeline::processing::columns::normalize_table_columns;
use crate::pipeline::processing::dimension::{
    Bridge, Dimension, DimensionBuilder, DimensionModel, Normalized, TrimNormalizer, ValueNormalizer,
};
use crate::pipeline::processing::splitter::{AtomicValue, Delimiter, MultiValueSplitter};
use crate::storage::csv_files::{list_csv_files, read_and_concat, read_table};
use crate::storage::{TableId, TableStore};
use crate::table::Table;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const RECORD_ID: &str = "publication_number";

const INVENTORS: &str = "inventors";
const APPLICANTS: &str = "applicants";
const IPC: &str = "ipc";

/// Columns whose nulls become the "not informed" marker
const FILLED_COLUMNS: &[&str] = &[INVENTORS, APPLICANTS, IPC, "cpc", "publication_date"];

/// Multi-valued columns kept out of the fact table
const MULTI_VALUED_COLUMNS: &[&str] = &[
    INVENTORS,
    APPLICANTS,
    IPC,
    "cpc",
    "earliest_priority",
    "publication_date",
    "earliest_publication",
];

/// Date column → year bridge table
const YEAR_BRIDGES: &[(&str, &str)] = &[
    ("earliest_priority", "bridge_patent_priority_year"),
    ("publication_date", "bridge_patent_publication_year"),
    ("earliest_publication", "bridge_patent_first_publication_year"),
];

static COUNTRY_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([A-Z]{2})\]").unwrap());

/// Patent exports linked to parties, countries, IPC codes, species and years
pub struct EspacenetStage {
    input_dir: PathBuf,
    manual_lookup: PathBuf,
    config: EspacenetConfig,
    model: ModelConfig,
}

impl EspacenetStage {
    pub fn new(config: &Config) -> Self {
        Self {
            input_dir: config.espacenet_input_dir(),
            manual_lookup: config.espacenet_manual_lookup(),
            config: config.espacenet.clone(),
            model: config.model.clone(),
        }
    }
}

/// Keeps country codes present in the embedded code table, adding the country name
#[derive(Debug, Clone, Copy, Default)]
pub struct CountryCodeNormalizer;

impl ValueNormalizer for CountryCodeNormalizer {
    fn extra_columns(&self) -> Vec<String> {
        vec!["country_name".to_string()]
    }

    fn normalize(&self, raw: &str) -> Option<Normalized> {
        let code = raw.trim().to_uppercase();
        let name = country_name(&code)?;
        Some(Normalized {
            value: code,
            extras: vec![name.to_string()],
        })
    }
}

/// Upper-cases IPC codes and strips dashes and spaces
#[derive(Debug, Clone, Copy, Default)]
pub struct IpcNormalizer;

impl ValueNormalizer for IpcNormalizer {
    fn normalize(&self, raw: &str) -> Option<Normalized> {
        let code: String = raw
            .trim()
            .to_uppercase()
            .chars()
            .filter(|c| *c != '-' && *c != ' ')
            .collect();
        (!code.is_empty()).then(|| Normalized::plain(code))
    }
}

/// Read every `*.csv` directly inside `dir` into one table
pub fn load_records(dir: &Path, delimiter: char) -> Result<Table> {
    let files = list_csv_files(dir, false)?;
    let table = read_and_concat(dir, &files, "espacenet_records", delimiter)?;
    info!("📥 Loaded {} Espacenet rows from {} files", table.len(), files.len());
    Ok(table)
}

/// Drop spreadsheet index columns, normalize labels, drop rows without a
/// publication number, remove duplicate rows and fill the multi-valued columns.
pub fn clean_records(mut table: Table, not_informed: &str) -> Result<Table> {
    let unnamed = drop_unnamed_columns(&mut table);
    if unnamed > 0 {
        info!("🧹 Dropped {} unnamed Espacenet columns", unnamed);
    }
    normalize_table_columns(&mut table)?;
    let id_idx = table.require_column(RECORD_ID)?;

    let mut records = table.filter_rows(|row| row[id_idx].as_deref().map_or(false, |v| !v.trim().is_empty()));
    let without_id = table.len() - records.len();
    if without_id > 0 {
        warn!("⚠️ Dropped {} Espacenet rows without a {}", without_id, RECORD_ID);
    }

    let removed = records.dedup_rows();
    if removed > 0 {
        info!("🧹 Removed {} duplicate Espacenet rows", removed);
    }
    let repeated = records.duplicated_values(RECORD_ID)?;
    if repeated > 0 {
        warn!("⚠️ {} Espacenet rows repeat a '{}' with different content", repeated, RECORD_ID);
    }
    fill_nulls_in(&mut records, FILLED_COLUMNS, not_informed)?;
    records.set_name("patents");
    Ok(records)
}

/// Split inventors and applicants on `,`, tagging each atom with its role
fn party_atoms(records: &Table, splitter: &MultiValueSplitter) -> Result<Vec<AtomicValue>> {
    let mut atoms = Vec::new();
    let mut found = false;
    for (column, role) in [(INVENTORS, "inventor"), (APPLICANTS, "applicant")] {
        if records.has_column(column) {
            found = true;
            atoms.extend(splitter.split_column_tagged(records, RECORD_ID, column, role)?);
        }
    }
    if !found {
        return Err(EtlError::missing_column(records.name(), INVENTORS));
    }
    Ok(atoms)
}

pub fn build_party_model(records: &Table, not_informed: &str, policy: KeyPolicy) -> Result<DimensionModel> {
    let splitter = MultiValueSplitter::new(Delimiter::literal(",")).with_sentinel(not_informed);
    let atoms = party_atoms(records, &splitter)?;
    DimensionBuilder::new("party", policy)
        .value_column("party_name")
        .record_column(RECORD_ID)
        .tag_column("role")
        .build(&atoms, &TrimNormalizer)
}

/// Country codes come from the publication-number prefix and from `[XX]`
/// markers inside party strings. Only codes in the embedded table are kept,
/// so the dimension holds just the countries actually observed.
pub fn build_country_model(records: &Table, not_informed: &str, policy: KeyPolicy) -> Result<DimensionModel> {
    let mut atoms = Vec::new();
    for id in records.column_values(RECORD_ID)?.into_iter().flatten() {
        let prefix: String = id.trim().chars().take(2).collect();
        atoms.push(AtomicValue {
            record_id: id.to_string(),
            position: 0,
            value: prefix,
            tag: Some("Publication".to_string()),
        });
    }

    let splitter = MultiValueSplitter::new(Delimiter::literal(",")).with_sentinel(not_informed);
    for party in party_atoms(records, &splitter).unwrap_or_default() {
        if let Some(code) = COUNTRY_MARKER.captures(&party.value).and_then(|c| c.get(1)) {
            let origin = match party.tag.as_deref() {
                Some("inventor") => "Inventor",
                _ => "Applicant",
            };
            atoms.push(AtomicValue {
                record_id: party.record_id.clone(),
                position: party.position,
                value: code.as_str().to_string(),
                tag: Some(origin.to_string()),
            });
        }
    }

    DimensionBuilder::new("country", policy)
        .value_column("country_code")
        .record_column(RECORD_ID)
        .tag_column("origin")
        .build(&atoms, &CountryCodeNormalizer)
}

pub fn build_ipc_model(records: &Table, not_informed: &str, policy: KeyPolicy) -> Result<DimensionModel> {
    split_and_build(
        records,
        RECORD_ID,
        IPC,
        &MultiValueSplitter::new(Delimiter::literal(",")).with_sentinel(not_informed),
        DimensionBuilder::new("ipc", policy)
            .value_column("ipc_code")
            .record_column(RECORD_ID),
        &IpcNormalizer,
    )
}

/// Link patents to master species through the curated lookup file. The file's
/// first three columns are publication number, abstract and scientific name.
/// Rows naming a species absent from the master dimension, or a patent absent
/// from `records`, are dropped.
pub fn link_species(lookup: &Table, master: &Dimension, records: &Table) -> Result<Bridge> {
    if lookup.columns().len() < 3 {
        return Err(EtlError::SchemaMismatch(format!(
            "species lookup '{}' needs 3 columns (publication number, abstract, scientific name), found {}",
            lookup.name(),
            lookup.columns().len()
        )));
    }
    let patents: HashSet<&str> = records.column_values(RECORD_ID)?.into_iter().flatten().collect();

    let mut bridge = Bridge::new(RECORD_ID, master.key_column());
    let mut unmatched = 0;
    let mut unknown_patents = 0;
    for row in lookup.rows() {
        let (publication, name) = match (row[0].as_deref(), row[2].as_deref()) {
            (Some(p), Some(n)) => (p.trim(), n.trim()),
            _ => continue,
        };
        if !patents.contains(publication) {
            unknown_patents += 1;
            continue;
        }
        match master.key_for(name) {
            Some(key) => {
                bridge.link(publication, key, None);
            }
            None => unmatched += 1,
        }
    }
    if unmatched > 0 {
        info!("{} lookup rows name species missing from the master dimension", unmatched);
    }
    if unknown_patents > 0 {
        warn!("⚠️ {} lookup rows name patents missing from the Espacenet exports", unknown_patents);
    }
    Ok(bridge)
}

/// Distinct `(publication_number, year)` pairs from a comma-separated date column
pub fn year_bridge(records: &Table, column: &str) -> Result<Bridge> {
    let splitter = MultiValueSplitter::new(Delimiter::literal(","));
    let atoms = splitter.split_column(records, RECORD_ID, column)?;
    let mut bridge = Bridge::new(RECORD_ID, "year");
    for atom in atoms {
        if let Some(year) = parse_year(&atom.value) {
            bridge.link(&atom.record_id, &year.to_string(), None);
        }
    }
    Ok(bridge)
}

impl Stage for EspacenetStage {
    fn name(&self) -> &'static str {
        ESPACENET_STAGE
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![UNIFY_STAGE]
    }

    fn inputs(&self) -> Vec<TableId> {
        vec![TableId::new(UNIFIED_DIR, SPECIES_MASTER_TABLE)]
    }

    fn execute(&self, store: &mut dyn TableStore) -> Result<StageResult> {
        info!("🧪 Processing Espacenet exports from {}", self.input_dir.display());
        let mut result = StageResult::new(ESPACENET_STAGE);
        let not_informed = self.config.not_informed.as_str();
        let policy = self.model.key_policy;

        let records = clean_records(load_records(&self.input_dir, self.config.delimiter)?, not_informed)?;

        if let Some(model) = result.optional("parties", build_party_model(&records, not_informed, policy))? {
            result.save_model(store, ESPACENET_STAGE, &model, "dim_parties", "bridge_patent_parties")?;
        }
        if let Some(model) = result.optional("countries", build_country_model(&records, not_informed, policy))? {
            result.save_model(store, ESPACENET_STAGE, &model, "dim_countries", "bridge_patent_countries")?;
        }
        if let Some(model) = result.optional("ipc", build_ipc_model(&records, not_informed, policy))? {
            result.save_model(store, ESPACENET_STAGE, &model, "dim_ipc", "bridge_patent_ipc")?;
        }

        let master_table = store.get(&TableId::new(UNIFIED_DIR, SPECIES_MASTER_TABLE))?;
        let master = Dimension::from_table(&master_table, "species_master", "species_id", "scientific_name")?;
        let lookup = read_table(&self.manual_lookup, "species_lookup", self.config.manual_lookup_delimiter)?;
        let species = link_species(&lookup, &master, &records)?;
        result.save(
            store,
            TableId::new(ESPACENET_STAGE, "bridge_patent_species"),
            species.to_table("bridge_patent_species")?,
        )?;

        for (column, table) in YEAR_BRIDGES {
            if let Some(bridge) = result.optional(column, year_bridge(&records, column))? {
                result.save(store, TableId::new(ESPACENET_STAGE, table), bridge.to_table(table)?)?;
            }
        }

        let mut fact = records;
        fact.drop_columns(MULTI_VALUED_COLUMNS);
        let patent_count = fact.len();
        result.save(store, TableId::new(ESPACENET_STAGE, "fact_patents"), fact)?;

        result.message = format!(
            "{} patents, {} species links, {} tables",
            patent_count,
            species.len(),
            result.tables.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Table {
        Table::from_rows(
            "patents",
            &[RECORD_ID, INVENTORS, APPLICANTS, IPC, "publication_date"],
            &[
                &["BR123", "SILVA JOAO [BR], SMITH JOHN [US]", "ACME [US]", "A61K-36/00, a01n 65/00", "2019-05-02"],
                &["XX999", "", "ACME [US]", "A61K36/00", "2020-01-01, 2019-12-31"],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_publication_prefix_countries() {
        let table = Table::from_rows("patents", &[RECORD_ID, INVENTORS, APPLICANTS], &[&["BR1", "", ""], &["US2", "", ""]]).unwrap();
        let model = build_country_model(&table, "NAO INFORMADO", KeyPolicy::Sequential).unwrap();
        assert_eq!(model.dimension.len(), 2);
        assert_eq!(model.bridge.len(), 2);
        let dim = model.dimension.to_table().unwrap();
        assert!(dim.rows().iter().all(|r| r.iter().all(|c| c.is_some())));
        let bridge = model.bridge.to_table("bridge_patent_countries").unwrap();
        assert!(bridge.rows().iter().all(|r| r.iter().all(|c| c.is_some())));
    }

    #[test]
    fn test_country_markers_and_unknown_prefix() {
        let mut table = records();
        fill_nulls_in(&mut table, FILLED_COLUMNS, "NAO INFORMADO").unwrap();
        let model = build_country_model(&table, "NAO INFORMADO", KeyPolicy::Sequential).unwrap();
        let codes: Vec<&str> = model.dimension.values().collect();
        assert_eq!(codes, vec!["BR", "US"]);
        assert_eq!(model.dimension.entries()[0].extras, vec!["Brasil".to_string()]);
        let origins: Vec<(&str, Option<&str>)> = model
            .bridge
            .rows()
            .iter()
            .map(|r| (r.record_id.as_str(), r.tag.as_deref()))
            .collect();
        assert!(origins.contains(&("BR123", Some("Publication"))));
        assert!(origins.contains(&("BR123", Some("Inventor"))));
        assert!(origins.contains(&("XX999", Some("Applicant"))));
        assert!(!origins.contains(&("XX999", Some("Publication"))));
    }

    #[test]
    fn test_parties_tag_roles() {
        let mut table = records();
        fill_nulls_in(&mut table, FILLED_COLUMNS, "NAO INFORMADO").unwrap();
        let model = build_party_model(&table, "NAO INFORMADO", KeyPolicy::Sequential).unwrap();
        let names: Vec<&str> = model.dimension.values().collect();
        assert_eq!(names, vec!["SILVA JOAO [BR]", "SMITH JOHN [US]", "ACME [US]"]);
        assert_eq!(model.bridge.len(), 4);
        assert_eq!(model.bridge.tag_column(), Some("role"));
    }

    #[test]
    fn test_ipc_codes_are_normalized() {
        let model = build_ipc_model(&records(), "NAO INFORMADO", KeyPolicy::Sequential).unwrap();
        let codes: Vec<&str> = model.dimension.values().collect();
        assert_eq!(codes, vec!["A61K36/00", "A01N65/00"]);
        assert_eq!(model.bridge.len(), 3);
    }

    #[test]
    fn test_year_bridge_parses_each_date() {
        let bridge = year_bridge(&records(), "publication_date").unwrap();
        let years: Vec<(&str, &str)> = bridge.rows().iter().map(|r| (r.record_id.as_str(), r.key.as_str())).collect();
        assert_eq!(years, vec![("BR123", "2019"), ("XX999", "2020"), ("XX999", "2019")]);
        assert!(year_bridge(&records(), "earliest_priority").unwrap_err().is_missing_column());
    }

    #[test]
    fn test_species_lookup_is_an_inner_join() {
        let master = Dimension::from_values("species_master", "species_id", "scientific_name", ["Tabebuia"], KeyPolicy::Sequential).unwrap();
        let lookup = Table::from_rows(
            "lookup",
            &["Publication number", "Abstract", "Nome"],
            &[&["BR123", "text", "Tabebuia"], &["US1", "text", "Unknown"], &["US2", "", ""]],
        )
        .unwrap();
        let patents = Table::from_rows("patents", &[RECORD_ID], &[&["BR123"], &["US1"], &["US2"]]).unwrap();
        let bridge = link_species(&lookup, &master, &patents).unwrap();
        assert_eq!(bridge.len(), 1);
        assert_eq!(bridge.rows()[0].record_id, "BR123");

        let narrow = Table::from_rows("lookup", &["a", "b"], &[&["1", "2"]]).unwrap();
        assert!(matches!(link_species(&narrow, &master, &patents), Err(EtlError::SchemaMismatch(_))));
    }

    #[test]
    fn test_species_lookup_ignores_patents_not_loaded() {
        let master = Dimension::from_values("species_master", "species_id", "scientific_name", ["Tabebuia"], KeyPolicy::Sequential).unwrap();
        let lookup = Table::from_rows(
            "lookup",
            &["publication_number", "abstract", "scientific_name"],
            &[&["NOT_A_PATENT", "x", "Tabebuia"], &["BR1", "x", "Tabebuia"]],
        )
        .unwrap();
        let patents = Table::from_rows("patents", &[RECORD_ID], &[&["BR1"]]).unwrap();
        let bridge = link_species(&lookup, &master, &patents).unwrap();

        let ids: HashSet<&str> = ["BR1"].into_iter().collect();
        assert!(bridge.unknown_records(&ids).is_empty());
        assert_eq!(bridge.len(), 1);
    }

    #[test]
    fn test_clean_records_removes_duplicate_rows() {
        let raw = Table::from_rows(
            "raw",
            &["Publication number", "Inventors"],
            &[&["BR1", "X [BR]"], &["BR1", "X [BR]"], &["BR1", "Y [US]"], &["US2", ""]],
        )
        .unwrap();
        let cleaned = clean_records(raw, "NAO INFORMADO").unwrap();
        assert_eq!(cleaned.column_values(RECORD_ID).unwrap(), vec![Some("BR1"), Some("BR1"), Some("US2")]);
        assert_eq!(cleaned.duplicated_values(RECORD_ID).unwrap(), 1);
    }

    #[test]
    fn test_overlapping_exports_load_each_patent_once() {
        let dir = tempfile::tempdir().unwrap();
        let export = "Publication number;Inventors;Applicants\nBR1;SILVA JOAO [BR];ACME [US]\n";
        std::fs::write(dir.path().join("a.csv"), export).unwrap();
        std::fs::write(dir.path().join("b.csv"), export).unwrap();

        let records = clean_records(load_records(dir.path(), ';').unwrap(), "NAO INFORMADO").unwrap();
        assert_eq!(records.column_values(RECORD_ID).unwrap(), vec![Some("BR1")]);
    }

    #[test]
    fn test_clean_records_drops_unnamed_and_idless_rows() {
        let raw = Table::from_rows(
            "raw",
            &["Unnamed: 0", "Publication number", "Inventors"],
            &[&["0", "BR1", ""], &["1", "", "X"]],
        )
        .unwrap();
        let cleaned = clean_records(raw, "NAO INFORMADO").unwrap();
        assert_eq!(cleaned.columns(), &[RECORD_ID.to_string(), INVENTORS.to_string()]);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.cell(0, 1), Some("NAO INFORMADO"));
    }
}
