use super::{split_and_build, Stage, StageResult};
use crate::config::{CncfloraConfig, Config, ModelConfig};
use crate::constants::{CNCFLORA_STAGE, SPECIES_TABLE};
use crate::error::Result;
use crate::keys::{KeyGenerator, KeyPolicy};
use crate::pipeline::processing::cleaning::{add_row_ids, coerce_integer, fill_nulls};
use crate::pipeline::processing::columns::normalize_table_columns;
use crate::pipeline::processing::dimension::{Dimension, DimensionBuilder, TrimNormalizer};
use crate::pipeline::processing::fact::{denormalize, FactAssembler};
use crate::pipeline::processing::splitter::{Delimiter, MultiValueSplitter};
use crate::storage::csv_files::{read_table, read_table_with_columns};
use crate::storage::{TableId, TableStore};
use crate::table::Table;
use std::path::PathBuf;
use tracing::info;

pub const RECORD_ID: &str = "assessment_id";

const SPECIES_COLUMN: &str = "nome_avaliado_entrada_sistema_cncflora";
const GROUP_COLUMN: &str = "grupo";
const RISK_COLUMN: &str = "categoria_de_risco_de_extincao";
const ACTIONS_COLUMN: &str = "classificacao_acoes_de_conservacao_iucn___acoes_de_conservacao";
const THREATS_COLUMN: &str = "classificacao_de_ameacas_sistema_iucn___ameacas_cadastradas";
const DATE_COLUMN: &str = "data_avaliacao";

/// Columns of the headerless species terms file
pub const TERMS_COLUMNS: [&str; 2] = ["scientific_name", "taxonomic_group"];

const FACT_COLUMNS: &[&str] = &[
    RECORD_ID,
    "species_id",
    "group_id",
    "risk_category_id",
    DATE_COLUMN,
    "reavaliacao",
    "historico_de_avaliacoes",
];

/// Red-list assessments plus the species reference list
pub struct CncfloraStage {
    input_dir: PathBuf,
    config: CncfloraConfig,
    model: ModelConfig,
}

impl CncfloraStage {
    pub fn new(config: &Config) -> Self {
        Self {
            input_dir: config.cncflora_input_dir(),
            config: config.cncflora.clone(),
            model: config.model.clone(),
        }
    }
}

/// Normalize labels, number the assessments, drop the popular name, fill
/// nulls and coerce the assessment date to an integer.
pub fn clean_assessments(mut table: Table, sentinel: &str) -> Result<Table> {
    normalize_table_columns(&mut table)?;
    add_row_ids(&mut table, RECORD_ID)?;
    table.drop_columns(&["nome_popular"]);
    fill_nulls(&mut table, sentinel)?;
    coerce_integer(&mut table, DATE_COLUMN);
    table.set_name("assessments");
    Ok(table)
}

/// One row per distinct scientific name, keeping the first taxonomic group seen
pub fn build_species_dimension(terms: &Table, policy: KeyPolicy) -> Result<Dimension> {
    let pairs = terms.column_pairs(TERMS_COLUMNS[0], TERMS_COLUMNS[1])?;
    let mut dimension = Dimension::new("species", "species_id", TERMS_COLUMNS[0], vec![TERMS_COLUMNS[1].to_string()]);
    let mut keys = KeyGenerator::new(policy, "species");
    for (name, group) in pairs {
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n,
            _ => continue,
        };
        let group = group.map(|g| g.trim().to_string()).unwrap_or_default();
        dimension.insert(name, vec![group], &mut keys)?;
    }
    Ok(dimension)
}

impl Stage for CncfloraStage {
    fn name(&self) -> &'static str {
        CNCFLORA_STAGE
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }

    fn execute(&self, store: &mut dyn TableStore) -> Result<StageResult> {
        info!("🌿 Processing CNCFlora red list from {}", self.input_dir.display());
        let mut result = StageResult::new(CNCFLORA_STAGE);
        let policy = self.model.key_policy;
        let sentinel = self.config.not_informed.as_str();

        let red_list = read_table(&self.input_dir.join(&self.config.red_list_file), "red_list", self.config.delimiter)?;
        let terms = read_table_with_columns(
            &self.input_dir.join(&self.config.terms_file),
            "terms",
            self.config.delimiter,
            &TERMS_COLUMNS,
        )?;
        info!("📥 Loaded {} assessments and {} species terms", red_list.len(), terms.len());

        let assessments = clean_assessments(red_list, sentinel)?;

        let splitter = MultiValueSplitter::new(Delimiter::literal(&self.config.value_delimiter)).with_sentinel(sentinel);
        for (column, entity, dim_table, bridge_table) in [
            (ACTIONS_COLUMN, "conservation_action", "dim_conservation_actions", "bridge_assessment_actions"),
            (THREATS_COLUMN, "threat", "dim_threats", "bridge_assessment_threats"),
        ] {
            let built = split_and_build(
                &assessments,
                RECORD_ID,
                column,
                &splitter,
                DimensionBuilder::new(entity, policy).record_column(RECORD_ID),
                &TrimNormalizer,
            );
            if let Some(model) = result.optional(entity, built)? {
                result.save_model(store, CNCFLORA_STAGE, &model, dim_table, bridge_table)?;
            }
        }

        let groups = result.optional(
            "group",
            Dimension::from_column(&assessments, GROUP_COLUMN, "group", "group_id", "group_name", policy),
        )?;
        let risk_categories = result.optional(
            "risk_category",
            Dimension::from_column(&assessments, RISK_COLUMN, "risk_category", "risk_category_id", "risk_category", policy),
        )?;
        let species = build_species_dimension(&terms, policy)?;

        let mut assembler = FactAssembler::new(self.model.projection).join(SPECIES_COLUMN, &species);
        if let Some(groups) = &groups {
            assembler = assembler.join(GROUP_COLUMN, groups);
        }
        if let Some(risk_categories) = &risk_categories {
            assembler = assembler.join(RISK_COLUMN, risk_categories);
        }
        let fact = assembler.assemble(&assessments, "fact_assessments", FACT_COLUMNS)?;

        let mut wide_dimensions = Vec::new();
        wide_dimensions.extend(groups.as_ref());
        wide_dimensions.extend(risk_categories.as_ref());
        wide_dimensions.push(&species);
        let wide = denormalize(&fact, "fact_assessments_wide", &wide_dimensions)?;

        let assessment_count = fact.len();
        result.save(store, TableId::new(CNCFLORA_STAGE, "fact_assessments"), fact)?;
        result.save(store, TableId::new(CNCFLORA_STAGE, "fact_assessments_wide"), wide)?;
        if let Some(groups) = &groups {
            result.save(store, TableId::new(CNCFLORA_STAGE, "dim_groups"), groups.to_table()?)?;
        }
        if let Some(risk_categories) = &risk_categories {
            result.save(store, TableId::new(CNCFLORA_STAGE, "dim_risk_categories"), risk_categories.to_table()?)?;
        }
        result.save(store, TableId::new(CNCFLORA_STAGE, SPECIES_TABLE), species.to_table()?)?;

        result.message = format!(
            "{} assessments, {} species, {} tables",
            assessment_count,
            species.len(),
            result.tables.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_assessments() {
        let raw = Table::from_rows(
            "red_list",
            &["Grupo", "Nome popular", "Data avaliação"],
            &[&["Angiospermas", "ipê", "2012"], &["", "", ""]],
        )
        .unwrap();
        let cleaned = clean_assessments(raw, "NAO INFORMADO").unwrap();
        assert_eq!(
            cleaned.columns(),
            &["assessment_id".to_string(), "grupo".to_string(), "data_avaliacao".to_string()]
        );
        assert_eq!(cleaned.cell(1, 0), Some("1"));
        assert_eq!(cleaned.cell(1, 1), Some("NAO INFORMADO"));
        assert_eq!(cleaned.cell(1, 2), Some("0"));
    }

    #[test]
    fn test_species_dimension_dedups_names() {
        let terms = Table::from_rows(
            "terms",
            &TERMS_COLUMNS,
            &[&["Paubrasilia echinata", "Angiospermas"], &["Paubrasilia echinata", "Outro"], &["", "x"]],
        )
        .unwrap();
        let species = build_species_dimension(&terms, KeyPolicy::Sequential).unwrap();
        assert_eq!(species.len(), 1);
        assert_eq!(species.entries()[0].extras, vec!["Angiospermas".to_string()]);
    }
}
