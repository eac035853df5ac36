use crate::error::Result;
use crate::table::Table;
use std::collections::BTreeMap;
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

/// Two or more raw labels that normalize to the same canonical label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCollision {
    pub label: String,
    pub raw_labels: Vec<String>,
}

/// Canonical labels in input order, plus any collisions found
#[derive(Debug, Clone)]
pub struct NormalizedLabels {
    pub labels: Vec<String>,
    pub collisions: Vec<LabelCollision>,
}

/// Strip accents and fold to ASCII: NFKD-decompose and keep ASCII code points only
pub fn fold_to_ascii(text: &str) -> String {
    text.nfkd().filter(|c| c.is_ascii()).collect()
}

/// Map one raw column label to `[a-z0-9_]*`.
///
/// Accents are stripped, letters lowercased, whitespace, `-` and `/` become
/// `_`, and every other character is dropped.
pub fn normalize_label(raw: &str) -> String {
    fold_to_ascii(raw)
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() || c == '-' || c == '/' => Some('_'),
            'a'..='z' | '0'..='9' | '_' => Some(c),
            _ => None,
        })
        .collect()
}

/// Normalize a whole header. Collisions are returned rather than resolved.
pub fn normalize_labels<S: AsRef<str>>(raw: &[S]) -> NormalizedLabels {
    let labels: Vec<String> = raw.iter().map(|r| normalize_label(r.as_ref())).collect();

    let mut by_label: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (label, raw_label) in labels.iter().zip(raw) {
        by_label
            .entry(label.as_str())
            .or_default()
            .push(raw_label.as_ref().to_string());
    }
    let collisions = by_label
        .into_iter()
        .filter(|(_, raws)| raws.len() > 1)
        .map(|(label, raw_labels)| LabelCollision {
            label: label.to_string(),
            raw_labels,
        })
        .collect();

    NormalizedLabels { labels, collisions }
}

/// Rename every column of `table` to its canonical label, warning on collisions.
pub fn normalize_table_columns(table: &mut Table) -> Result<Vec<LabelCollision>> {
    let normalized = normalize_labels(table.columns());
    for collision in &normalized.collisions {
        warn!(
            "⚠️ Columns {:?} of '{}' all normalize to '{}'",
            collision.raw_labels,
            table.name(),
            collision.label
        );
    }
    table.set_columns(normalized.labels)?;
    Ok(normalized.collisions)
}
