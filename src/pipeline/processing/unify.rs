//! Merging dimensions that describe the same entity, and finding dimension
//! values inside free text.

use super::dimension::{Bridge, BridgeRow, Dimension};
use crate::error::{EtlError, Result};
use crate::keys::{KeyGenerator, KeyPolicy};
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Which input of [`unify`] a key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

/// The master dimension plus the old-key → master-key mappings of both inputs
#[derive(Debug, Clone)]
pub struct UnifiedDimension {
    pub master: Dimension,
    first_keys: HashMap<String, String>,
    second_keys: HashMap<String, String>,
}

impl UnifiedDimension {
    pub fn rekey(&self, side: Side, key: &str) -> Option<&str> {
        let mapping = match side {
            Side::First => &self.first_keys,
            Side::Second => &self.second_keys,
        };
        mapping.get(key).map(String::as_str)
    }

    /// Rewrite a bridge built against one input so it references the master keys
    pub fn rekey_bridge(&self, bridge: &Bridge, side: Side) -> Result<Bridge> {
        let mut rekeyed = Bridge::new(bridge.record_column(), self.master.key_column());
        if let Some(tag) = bridge.tag_column() {
            rekeyed = rekeyed.with_tag_column(tag);
        }
        for row in bridge.rows() {
            let key = self.rekey(side, &row.key).ok_or_else(|| EtlError::DanglingKey {
                dimension: self.master.name().to_string(),
                key: row.key.clone(),
            })?;
            rekeyed.push(BridgeRow {
                record_id: row.record_id.clone(),
                key: key.to_string(),
                tag: row.tag.clone(),
            });
        }
        Ok(rekeyed)
    }
}

/// Union two dimensions over the same value column. Values of `first` come
/// first, in order; values only in `second` follow in their order. Master
/// keys are freshly generated, so neither input's keys survive.
///
/// The master keeps `first`'s extra columns; rows that only exist in
/// `second` take those extras from `second` by column name when it has them.
pub fn unify(name: &str, key_column: &str, first: &Dimension, second: &Dimension, policy: KeyPolicy) -> Result<UnifiedDimension> {
    if first.value_column() != second.value_column() {
        return Err(EtlError::SchemaMismatch(format!(
            "cannot unify '{}' ({}) with '{}' ({})",
            first.name(),
            first.value_column(),
            second.name(),
            second.value_column()
        )));
    }

    let extra_columns = first.extra_columns().to_vec();
    let second_extra_idx: Vec<Option<usize>> = extra_columns
        .iter()
        .map(|c| second.extra_columns().iter().position(|s| s == c))
        .collect();

    let mut master = Dimension::new(name, key_column, first.value_column(), extra_columns);
    let mut keys = KeyGenerator::new(policy, name);
    let mut first_keys = HashMap::with_capacity(first.len());
    let mut second_keys = HashMap::with_capacity(second.len());

    for entry in first.entries() {
        let key = master.insert(&entry.value, entry.extras.clone(), &mut keys)?;
        first_keys.insert(entry.key.clone(), key);
    }
    let mut added = 0;
    for entry in second.entries() {
        if master.key_for(&entry.value).is_none() {
            added += 1;
        }
        let extras = second_extra_idx
            .iter()
            .map(|idx| idx.and_then(|i| entry.extras.get(i).cloned()).unwrap_or_default())
            .collect();
        let key = master.insert(&entry.value, extras, &mut keys)?;
        second_keys.insert(entry.key.clone(), key);
    }

    info!(
        "🔗 Unified '{}' ({}) and '{}' ({}) into '{}' with {} values ({} new from the second)",
        first.name(),
        first.len(),
        second.name(),
        second.len(),
        name,
        master.len(),
        added
    );
    Ok(UnifiedDimension {
        master,
        first_keys,
        second_keys,
    })
}

/// Finds whole-word, case-insensitive occurrences of a fixed vocabulary in text.
///
/// Every match resolves to the vocabulary entry's canonical spelling through
/// the capture group that matched. Longer entries are tried first so that
/// `Rosa canina` wins over `Rosa`.
#[derive(Debug, Clone)]
pub struct TextMiner {
    pattern: Option<Regex>,
    /// Canonical terms; term `i` is capture group `i + 1`
    terms: Vec<String>,
}

impl TextMiner {
    pub fn new<I, S>(vocabulary: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut canonical: HashMap<String, String> = HashMap::new();
        for term in vocabulary {
            let term = term.as_ref().trim();
            if !term.is_empty() {
                canonical
                    .entry(term.to_lowercase())
                    .or_insert_with(|| term.to_string());
            }
        }

        let mut terms: Vec<String> = canonical.into_values().collect();
        if terms.is_empty() {
            return Ok(Self { pattern: None, terms });
        }

        terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
        let alternation = terms
            .iter()
            .map(|t| format!("({})", regex::escape(t)))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&format!(r"\b(?:{})\b", alternation))
            .case_insensitive(true)
            .size_limit(256 * 1024 * 1024)
            .dfa_size_limit(64 * 1024 * 1024)
            .build()?;
        debug!("Text miner compiled with {} terms", terms.len());

        Ok(Self {
            pattern: Some(pattern),
            terms,
        })
    }

    pub fn vocabulary_size(&self) -> usize {
        self.terms.len()
    }

    /// Distinct canonical terms found in `text`, in order of first appearance
    pub fn find(&self, text: &str) -> Vec<&str> {
        let pattern = match &self.pattern {
            Some(p) => p,
            None => return Vec::new(),
        };
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for caps in pattern.captures_iter(text) {
            let matched = caps
                .iter()
                .skip(1)
                .position(|group| group.is_some())
                .and_then(|i| self.terms.get(i));
            if let Some(term) = matched {
                if seen.insert(term.as_str()) {
                    found.push(term.as_str());
                }
            }
        }
        found
    }

    /// Link every `(record_id, text)` to the dimension entries found in its text
    pub fn mine<'t, I>(&self, texts: I, dimension: &Dimension, record_column: &str) -> Bridge
    where
        I: IntoIterator<Item = (&'t str, &'t str)>,
    {
        let mut bridge = Bridge::new(record_column, dimension.key_column());
        for (record_id, text) in texts {
            for term in self.find(text) {
                if let Some(key) = dimension.key_for(term) {
                    bridge.link(record_id, key, None);
                }
            }
        }
        bridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn species(values: &[&str]) -> Dimension {
        Dimension::from_values("species", "species_id", "scientific_name", values.iter().copied(), KeyPolicy::Sequential).unwrap()
    }

    #[test]
    fn test_unify_overlapping_dimensions() {
        let first = species(&["Rosa canina", "Tabebuia"]);
        let second = species(&["Tabebuia", "Ipomoea"]);
        let unified = unify("species_master", "species_id", &first, &second, KeyPolicy::Sequential).unwrap();
        let values: Vec<&str> = unified.master.values().collect();
        assert_eq!(values, vec!["Rosa canina", "Tabebuia", "Ipomoea"]);

        // Shared value maps both old keys to the same master key
        let t_first = unified.rekey(Side::First, first.key_for("Tabebuia").unwrap()).unwrap();
        let t_second = unified.rekey(Side::Second, second.key_for("Tabebuia").unwrap()).unwrap();
        assert_eq!(t_first, t_second);
        assert_eq!(unified.master.key_for("Tabebuia"), Some(t_first));
    }

    #[test]
    fn test_unify_rejects_different_value_columns() {
        let first = species(&["A"]);
        let other = Dimension::from_values("threat", "threat_id", "threat", ["A"], KeyPolicy::Sequential).unwrap();
        let err = unify("m", "id", &first, &other, KeyPolicy::Sequential).unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatch(_)));
    }

    #[test]
    fn test_rekey_bridge_and_dangling_key() {
        let first = species(&["Rosa"]);
        let second = species(&["Ipomoea"]);
        let unified = unify("m", "species_id", &first, &second, KeyPolicy::Sequential).unwrap();

        let mut bridge = Bridge::new("article_id", "species_id");
        bridge.link("e1", second.key_for("Ipomoea").unwrap(), None);
        let rekeyed = unified.rekey_bridge(&bridge, Side::Second).unwrap();
        assert_eq!(rekeyed.rows()[0].key, unified.master.key_for("Ipomoea").unwrap());
        assert!(rekeyed.dangling_keys(&unified.master).is_empty());

        bridge.link("e2", "999", None);
        let err = unified.rekey_bridge(&bridge, Side::Second).unwrap_err();
        assert!(matches!(err, EtlError::DanglingKey { .. }));
    }

    #[test]
    fn test_miner_whole_word_case_insensitive() {
        let dim = species(&["Rosa canina", "Tabebuia"]);
        let miner = TextMiner::new(dim.values()).unwrap();
        let texts = [
            ("e1", "Study of ROSA CANINA in gardens"),
            ("e2", "Tabebuias are not matched"),
            ("e3", "tabebuia and Rosa canina together"),
        ];
        let bridge = miner.mine(texts.iter().map(|(a, b)| (*a, *b)), &dim, "article_id");
        let links: Vec<(&str, &str)> = bridge
            .rows()
            .iter()
            .map(|r| (r.record_id.as_str(), dim.entry_by_key(&r.key).unwrap().value.as_str()))
            .collect();
        assert_eq!(
            links,
            vec![("e1", "Rosa canina"), ("e3", "Tabebuia"), ("e3", "Rosa canina")]
        );
    }

    #[test]
    fn test_longest_term_wins() {
        let miner = TextMiner::new(["Rosa", "Rosa canina"]).unwrap();
        assert_eq!(miner.find("a rosa canina hedge"), vec!["Rosa canina"]);
        assert_eq!(miner.find("a rosa hedge"), vec!["Rosa"]);
    }

    #[test]
    fn test_shorter_term_does_not_match_inside_a_word() {
        let dim = species(&["Tabe"]);
        let miner = TextMiner::new(dim.values()).unwrap();
        let bridge = miner.mine([("e1", "Found in Tabebuia forests")], &dim, "article_id");
        assert!(bridge.is_empty());

        let dim = species(&["Tabebuia"]);
        let miner = TextMiner::new(dim.values()).unwrap();
        let bridge = miner.mine([("e1", "Found in Tabebuia forests")], &dim, "article_id");
        assert_eq!(bridge.len(), 1);
        assert_eq!(bridge.rows()[0].key, dim.key_for("Tabebuia").unwrap());
    }

    #[test]
    fn test_case_folded_match_resolves_to_canonical_term() {
        // U+017F LATIN SMALL LETTER LONG S folds to 's'
        let miner = TextMiner::new(["Rosa"]).unwrap();
        assert_eq!(miner.find("a ro\u{17f}a hedge"), vec!["Rosa"]);
    }

    #[test]
    fn test_unify_value_set_is_order_independent() {
        let a = species(&["Rosa canina", "Tabebuia", "Paubrasilia echinata"]);
        let b = species(&["Tabebuia", "Ipomoea"]);
        let ab = unify("m", "species_id", &a, &b, KeyPolicy::Sequential).unwrap();
        let ba = unify("m", "species_id", &b, &a, KeyPolicy::Sequential).unwrap();
        let ab_values: HashSet<&str> = ab.master.values().collect();
        let ba_values: HashSet<&str> = ba.master.values().collect();
        assert_eq!(ab_values, ba_values);
        assert_eq!(ab_values.len(), 4);
    }

    #[test]
    fn test_empty_vocabulary_finds_nothing() {
        let miner = TextMiner::new(Vec::<String>::new()).unwrap();
        assert_eq!(miner.vocabulary_size(), 0);
        assert!(miner.find("anything").is_empty());
    }
}
