//! Author identity reconciliation across three parallel multi-valued columns.
//!
//! Scopus exports carry, per article, a list of display names (`authors`),
//! a list of structured full names suffixed with the author id
//! (`author_full_names`, e.g. `Silva, João (57190001)`) and the list of author
//! ids (`authors_id`). The lists are usually, but not always, the same length.
//!
//! The id list drives the result. Each id is matched to the full-name entry
//! carrying the same embedded id; failing that, to the full-name entry at the
//! same position provided it carries no conflicting id. The display name comes
//! from the matched entry's position. The reported name is the structured full
//! name when present, else the display name.

use super::dimension::{Bridge, BridgeRow, Dimension, DimensionModel};
use super::splitter::{AtomicValue, Delimiter, MultiValueSplitter};
use crate::error::Result;
use crate::keys::{KeyGenerator, KeyPolicy};
use crate::table::Table;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info};

static EMBEDDED_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d+)\)").unwrap());
static TRAILING_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(\d+\)$").unwrap());
static ANY_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(\d+\)").unwrap());

pub const AUTHORS_COLUMN: &str = "authors";
pub const AUTHOR_IDS_COLUMN: &str = "authors_id";
pub const AUTHOR_FULL_NAMES_COLUMN: &str = "author_full_names";

/// One author occurrence after alignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedAuthor {
    pub record_id: String,
    pub author_id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
struct FullName {
    position: usize,
    embedded_id: Option<String>,
    name: String,
}

fn parse_full_name(atom: &AtomicValue) -> FullName {
    let embedded_id = EMBEDDED_ID
        .captures(&atom.value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let name = TRAILING_ID.replace(&atom.value, "").trim().to_string();
    FullName {
        position: atom.position,
        embedded_id,
        name,
    }
}

/// Align the three author columns of every record.
pub fn align_authors(records: &Table, record_column: &str, sentinel: &str) -> Result<Vec<AlignedAuthor>> {
    records.require_columns(&[record_column, AUTHORS_COLUMN, AUTHOR_IDS_COLUMN, AUTHOR_FULL_NAMES_COLUMN])?;

    let splitter = MultiValueSplitter::new(Delimiter::pattern(r"\s*;\s*")?).with_sentinel(sentinel);

    // Display names lose their "(id)" markers before splitting
    let mut cleaned = records.clone();
    cleaned.map_column(AUTHORS_COLUMN, |v| v.map(|s| ANY_ID.replace_all(s, "").into_owned()))?;
    let display = splitter.split_column(&cleaned, record_column, AUTHORS_COLUMN)?;
    let full = splitter.split_column(records, record_column, AUTHOR_FULL_NAMES_COLUMN)?;
    let ids = splitter.split_column(records, record_column, AUTHOR_IDS_COLUMN)?;

    let mut display_at: HashMap<(&str, usize), &str> = HashMap::new();
    for atom in &display {
        display_at.insert((atom.record_id.as_str(), atom.position), atom.value.as_str());
    }

    let parsed: Vec<(&str, FullName)> = full.iter().map(|a| (a.record_id.as_str(), parse_full_name(a))).collect();
    let mut full_at: HashMap<(&str, usize), &FullName> = HashMap::new();
    let mut full_by_id: HashMap<(&str, &str), &FullName> = HashMap::new();
    for (record_id, full_name) in &parsed {
        let record_id: &str = record_id;
        full_at.insert((record_id, full_name.position), full_name);
        if let Some(id) = &full_name.embedded_id {
            full_by_id.entry((record_id, id.as_str())).or_insert(full_name);
        }
    }

    let mut aligned = Vec::with_capacity(ids.len());
    for id_atom in &ids {
        let record_id = id_atom.record_id.as_str();
        let author_id = id_atom.value.as_str();

        let matched = full_by_id.get(&(record_id, author_id)).copied().or_else(|| {
            full_at
                .get(&(record_id, id_atom.position))
                .copied()
                .filter(|f| f.embedded_id.as_deref().map_or(true, |e| e == author_id))
        });

        let display_position = matched.map_or(id_atom.position, |f| f.position);
        let display_name = display_at.get(&(record_id, display_position)).copied();

        let name = matched
            .map(|f| f.name.as_str())
            .filter(|n| !n.is_empty())
            .or(display_name)
            .map(|n| n.to_uppercase());

        if name.is_none() {
            debug!("No name found for author {} on record {}", author_id, record_id);
        }
        aligned.push(AlignedAuthor {
            record_id: record_id.to_string(),
            author_id: author_id.to_string(),
            name,
        });
    }
    Ok(aligned)
}

/// Build the author dimension (one row per external author id, named after
/// its first occurrence) and the record → author bridge.
pub fn build_author_model(records: &Table, record_column: &str, bridge_record_column: &str, policy: KeyPolicy, sentinel: &str) -> Result<DimensionModel> {
    let aligned = align_authors(records, record_column, sentinel)?;

    let mut dimension = Dimension::new("author", "author_id", "scopus_author_id", vec!["full_name".to_string()]);
    let mut bridge = Bridge::new(bridge_record_column, "author_id");
    let mut keys = KeyGenerator::new(policy, "author");

    for author in &aligned {
        let key = dimension.insert(
            &author.author_id,
            vec![author.name.clone().unwrap_or_default()],
            &mut keys,
        )?;
        bridge.push(BridgeRow {
            record_id: author.record_id.clone(),
            key,
            tag: None,
        });
    }

    info!(
        "✅ Built author dimension with {} authors and {} links",
        dimension.len(),
        bridge.len()
    );
    Ok(DimensionModel {
        dimension,
        bridge,
        collisions: 0,
    })
}
