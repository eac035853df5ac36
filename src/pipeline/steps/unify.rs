use super::{Stage, StageResult};
use crate::config::Config;
use crate::constants::{
    CLEAN_RECORDS_TABLE, CNCFLORA_STAGE, SCOPUS_STAGE, SPECIES_MASTER_TABLE, SPECIES_TABLE,
    UNIFIED_DIR, UNIFY_STAGE,
};
use crate::error::Result;
use crate::keys::KeyPolicy;
use crate::pipeline::processing::dimension::{Bridge, Dimension};
use crate::pipeline::processing::unify::{unify, Side, TextMiner, UnifiedDimension};
use crate::pipeline::steps::scopus::{ARTICLE_ID, RECORD_ID};
use crate::storage::{TableId, TableStore};
use crate::table::Table;
use tracing::info;

const TITLE_COLUMN: &str = "title";
const ABSTRACT_COLUMN: &str = "abstract";

/// Links articles to species mentioned in their title or abstract and builds
/// the master species dimension shared by every source.
pub struct UnifyStage {
    policy: KeyPolicy,
    not_informed: String,
}

impl UnifyStage {
    pub fn new(config: &Config) -> Self {
        Self {
            policy: config.model.key_policy,
            not_informed: config.scopus.not_informed.clone(),
        }
    }
}

fn column_or_nulls<'t>(records: &'t Table, column: &str) -> Vec<Option<&'t str>> {
    records
        .column_values(column)
        .unwrap_or_else(|_| vec![None; records.len()])
}

fn informed<'t>(value: Option<&'t str>, not_informed: &str) -> &'t str {
    value.filter(|v| *v != not_informed).unwrap_or("")
}

/// `title + " " + abstract` per article; absent or "not informed" parts count as empty
pub fn article_texts(records: &Table, not_informed: &str) -> Result<Vec<(String, String)>> {
    let ids = records.column_values(RECORD_ID)?;
    let titles = column_or_nulls(records, TITLE_COLUMN);
    let abstracts = column_or_nulls(records, ABSTRACT_COLUMN);

    Ok(ids
        .into_iter()
        .zip(titles.into_iter().zip(abstracts))
        .filter_map(|(id, (title, abs))| {
            let text = format!("{} {}", informed(title, not_informed), informed(abs, not_informed));
            id.map(|id| (id.to_string(), text))
        })
        .collect())
}

/// Mine article texts against the reference species and fold the species
/// found into the master dimension.
pub fn unify_species(reference: &Dimension, texts: &[(String, String)], policy: KeyPolicy) -> Result<(UnifiedDimension, Bridge)> {
    let miner = TextMiner::new(reference.values())?;
    info!("🔎 Searching {} articles for {} species names", texts.len(), miner.vocabulary_size());

    let found: Vec<(&str, Vec<&str>)> = texts
        .iter()
        .map(|(id, text)| (id.as_str(), miner.find(text)))
        .collect();

    let found_dimension = Dimension::from_values(
        "species_found",
        reference.key_column(),
        reference.value_column(),
        found.iter().flat_map(|(_, names)| names.iter().copied()),
        policy,
    )?;

    let mut local = Bridge::new(ARTICLE_ID, found_dimension.key_column());
    for (article, names) in &found {
        for name in names {
            if let Some(key) = found_dimension.key_for(name) {
                local.link(article, key, None);
            }
        }
    }

    let unified = unify("species_master", reference.key_column(), reference, &found_dimension, policy)?;
    let bridge = unified.rekey_bridge(&local, Side::Second)?;
    info!(
        "🌱 {} distinct species mentioned across {} article links",
        found_dimension.len(),
        bridge.len()
    );
    Ok((unified, bridge))
}

impl Stage for UnifyStage {
    fn name(&self) -> &'static str {
        UNIFY_STAGE
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![SCOPUS_STAGE, CNCFLORA_STAGE]
    }

    fn inputs(&self) -> Vec<TableId> {
        vec![
            TableId::new(SCOPUS_STAGE, CLEAN_RECORDS_TABLE),
            TableId::new(CNCFLORA_STAGE, SPECIES_TABLE),
        ]
    }

    fn execute(&self, store: &mut dyn TableStore) -> Result<StageResult> {
        let mut result = StageResult::new(UNIFY_STAGE);
        let records = store.get(&TableId::new(SCOPUS_STAGE, CLEAN_RECORDS_TABLE))?;
        let species_table = store.get(&TableId::new(CNCFLORA_STAGE, SPECIES_TABLE))?;
        let reference = Dimension::from_table(&species_table, "species", "species_id", "scientific_name")?;

        if !records.has_column(TITLE_COLUMN) && !records.has_column(ABSTRACT_COLUMN) {
            result.warn("Scopus records have neither title nor abstract; no species can be found");
        }
        let texts = article_texts(&records, &self.not_informed)?;
        let (unified, bridge) = unify_species(&reference, &texts, self.policy)?;

        result.save(store, TableId::new(UNIFIED_DIR, SPECIES_MASTER_TABLE), unified.master.to_table()?)?;
        result.save(store, TableId::new(UNIFIED_DIR, "bridge_article_species"), bridge.to_table("bridge_article_species")?)?;

        result.message = format!(
            "{} species in master, {} article links",
            unified.master.len(),
            bridge.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Dimension {
        Dimension::from_values(
            "species",
            "species_id",
            "scientific_name",
            ["Rosa canina", "Tabebuia"],
            KeyPolicy::Sequential,
        )
        .unwrap()
    }

    #[test]
    fn test_article_texts_skip_sentinel() {
        let records = Table::from_rows(
            "clean_records",
            &["eid", "title"],
            &[&["e1", "Rosa canina study"], &["e2", "nao_informado"]],
        )
        .unwrap();
        let texts = article_texts(&records, "nao_informado").unwrap();
        assert_eq!(texts[0], ("e1".to_string(), "Rosa canina study ".to_string()));
        assert_eq!(texts[1].1.trim(), "");
    }

    #[test]
    fn test_unify_species_links_articles_to_master_keys() {
        let texts = vec![
            ("e1".to_string(), "ROSA CANINA in the wild".to_string()),
            ("e2".to_string(), "nothing here".to_string()),
            ("e3".to_string(), "Tabebuia and rosa canina".to_string()),
        ];
        let (unified, bridge) = unify_species(&reference(), &texts, KeyPolicy::Sequential).unwrap();
        assert_eq!(unified.master.len(), 2);
        assert!(bridge.dangling_keys(&unified.master).is_empty());
        let links: Vec<(&str, &str)> = bridge
            .rows()
            .iter()
            .map(|r| (r.record_id.as_str(), unified.master.entry_by_key(&r.key).unwrap().value.as_str()))
            .collect();
        assert_eq!(links, vec![("e1", "Rosa canina"), ("e3", "Tabebuia"), ("e3", "Rosa canina")]);
        assert_eq!(bridge.record_column(), "article_id");
    }
}
