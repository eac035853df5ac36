use super::{split_and_build, Stage, StageResult};
use crate::config::{Config, ModelConfig, ScopusConfig};
use crate::constants::{CLEAN_RECORDS_TABLE, SCOPUS_STAGE};
use crate::error::Result;
use crate::pipeline::processing::affiliation::AffiliationNormalizer;
use crate::pipeline::processing::authors::build_author_model;
use crate::pipeline::processing::cleaning::{coerce_integer, drop_sparse_columns, fill_nulls};
use crate::pipeline::processing::columns::normalize_table_columns;
use crate::pipeline::processing::dimension::{DimensionBuilder, UpperTrimNormalizer};
use crate::pipeline::processing::fact::FactAssembler;
use crate::pipeline::processing::splitter::{Delimiter, MultiValueSplitter};
use crate::storage::csv_files::{list_csv_files, read_and_concat};
use crate::storage::{TableId, TableStore};
use crate::table::Table;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Record identifier of a Scopus export
pub const RECORD_ID: &str = "eid";
/// Record identifier as written in the Scopus bridges and fact table
pub const ARTICLE_ID: &str = "article_id";

const INTEGER_COLUMNS: &[&str] = &["year", "volume", "issue", "page_start", "page_end", "page_count", "cited_by"];

const FACT_COLUMNS: &[&str] = &[
    ARTICLE_ID,
    "title",
    "year",
    "source_title",
    "volume",
    "issue",
    "art_no",
    "page_start",
    "page_end",
    "page_count",
    "cited_by",
    "doi",
    "link",
    "language_of_original_document",
    "document_type",
    "publication_stage",
    "open_access",
    "source",
];

/// Bibliographic exports: authors, affiliations, keywords and articles
pub struct ScopusStage {
    input_dir: PathBuf,
    config: ScopusConfig,
    model: ModelConfig,
}

impl ScopusStage {
    pub fn new(config: &Config) -> Self {
        Self {
            input_dir: config.scopus_input_dir(),
            config: config.scopus.clone(),
            model: config.model.clone(),
        }
    }
}

/// Read every `*.csv` below `dir` (recursively) into one table
pub fn load_records(dir: &Path, delimiter: char) -> Result<Table> {
    let files = list_csv_files(dir, true)?;
    let table = read_and_concat(dir, &files, "scopus_records", delimiter)?;
    info!("📥 Loaded {} Scopus rows from {} files", table.len(), files.len());
    Ok(table)
}

/// Normalize labels, drop sparse columns, fill nulls, coerce the numeric
/// columns and remove duplicate rows.
pub fn clean_records(mut table: Table, config: &ScopusConfig) -> Result<Table> {
    normalize_table_columns(&mut table)?;
    table.require_column(RECORD_ID)?;

    drop_sparse_columns(&mut table, config.missing_threshold_pct);
    fill_nulls(&mut table, &config.not_informed)?;
    for column in INTEGER_COLUMNS {
        coerce_integer(&mut table, column);
    }

    let removed = table.dedup_rows();
    if removed > 0 {
        info!("🧹 Removed {} duplicate Scopus rows", removed);
    }
    let repeated = table.duplicated_values(RECORD_ID)?;
    if repeated > 0 {
        warn!("⚠️ {} Scopus rows repeat an '{}' with different content", repeated, RECORD_ID);
    }
    table.set_name(CLEAN_RECORDS_TABLE);
    Ok(table)
}

impl Stage for ScopusStage {
    fn name(&self) -> &'static str {
        SCOPUS_STAGE
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }

    fn execute(&self, store: &mut dyn TableStore) -> Result<StageResult> {
        info!("📚 Processing Scopus exports from {}", self.input_dir.display());
        let mut result = StageResult::new(SCOPUS_STAGE);
        let records = clean_records(load_records(&self.input_dir, self.config.delimiter)?, &self.config)?;
        let sentinel = self.config.not_informed.as_str();
        let policy = self.model.key_policy;

        let authors = result.optional("authors", build_author_model(&records, RECORD_ID, ARTICLE_ID, policy, sentinel))?;
        if let Some(model) = authors {
            result.save_model(store, SCOPUS_STAGE, &model, "dim_authors", "bridge_article_authors")?;
        }

        let affiliations = result.optional(
            "affiliations",
            split_and_build(
                &records,
                RECORD_ID,
                "affiliations",
                &MultiValueSplitter::new(Delimiter::literal(";")).with_sentinel(sentinel),
                DimensionBuilder::new("affiliation", policy)
                    .value_column("normalized_name")
                    .record_column(ARTICLE_ID),
                &AffiliationNormalizer,
            ),
        )?;
        if let Some(model) = affiliations {
            result.save_model(store, SCOPUS_STAGE, &model, "dim_affiliations", "bridge_article_affiliations")?;
        }

        let keyword_splitter = MultiValueSplitter::new(Delimiter::pattern(r"\s*;\s*")?).with_sentinel(sentinel);
        for (column, entity, dim_table, bridge_table) in [
            ("author_keywords", "keyword", "dim_keywords", "bridge_article_keywords"),
            ("index_keywords", "index_keyword", "dim_index_keywords", "bridge_article_index_keywords"),
        ] {
            let built = split_and_build(
                &records,
                RECORD_ID,
                column,
                &keyword_splitter,
                DimensionBuilder::new(entity, policy).record_column(ARTICLE_ID),
                &UpperTrimNormalizer,
            );
            if let Some(model) = result.optional(entity, built)? {
                result.save_model(store, SCOPUS_STAGE, &model, dim_table, bridge_table)?;
            }
        }

        let mut articles = records.clone();
        articles.rename_column(RECORD_ID, ARTICLE_ID);
        let fact = FactAssembler::new(self.model.projection).assemble(&articles, "fact_articles", FACT_COLUMNS)?;
        result.save(store, TableId::new(SCOPUS_STAGE, "fact_articles"), fact)?;

        let article_count = records.len();
        result.save(store, TableId::new(SCOPUS_STAGE, CLEAN_RECORDS_TABLE), records)?;

        result.message = format!(
            "{} articles, {} tables, {} models skipped",
            article_count,
            result.tables.len(),
            result.skipped_models.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> Table {
        Table::from_rows(
            "raw",
            &["EID", "Title", "Year", "Cited by", "Mostly Empty"],
            &[
                &["e1", "Ipê study", "2019", "", ""],
                &["e2", "", "2020.0", "3", ""],
                &["e1", "Ipê study", "2019", "", ""],
                &["e3", "Rosa", "n/a", "1", "x"],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_clean_records_applies_every_rule() {
        let cleaned = clean_records(raw(), &ScopusConfig::default()).unwrap();
        assert_eq!(
            cleaned.columns(),
            &["eid".to_string(), "title".to_string(), "year".to_string(), "cited_by".to_string()]
        );
        assert_eq!(cleaned.len(), 3);
        assert_eq!(cleaned.column_values("year").unwrap(), vec![Some("2019"), Some("2020"), Some("0")]);
        assert_eq!(cleaned.column_values("cited_by").unwrap(), vec![Some("0"), Some("3"), Some("1")]);
        assert_eq!(cleaned.cell(1, 1), Some("nao_informado"));
    }

    #[test]
    fn test_clean_records_requires_record_id() {
        let table = Table::from_rows("raw", &["Title"], &[&["x"]]).unwrap();
        assert!(clean_records(table, &ScopusConfig::default()).unwrap_err().is_missing_column());
    }
}
