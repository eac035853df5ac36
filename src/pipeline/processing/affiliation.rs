//! Affiliation strings: `"<institution>, <address...>"`.

use super::columns::fold_to_ascii;
use super::dimension::{Normalized, ValueNormalizer};
use crate::constants::{AFFILIATION_NOT_INFORMED, NO_ACRONYM};
use once_cell::sync::Lazy;
use regex::Regex;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[.,;:"()]"#).unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static ACRONYM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2,6}\b").unwrap());
static PARENTHESIZED_ACRONYM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([A-Z.]+)\)").unwrap());

/// Components of one parsed affiliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affiliation {
    pub normalized_name: String,
    pub acronym: String,
    pub address: String,
}

/// Accent-stripped, upper-cased institution name without punctuation
pub fn normalize_institution(name: &str) -> String {
    let folded = fold_to_ascii(name).to_uppercase();
    let stripped = PUNCTUATION.replace_all(&folded, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Last standalone run of 2–6 capitals, else the last parenthesized
/// capitals-and-dots group with the dots removed.
pub fn extract_acronym(name: &str) -> Option<String> {
    if let Some(m) = ACRONYM.find_iter(name).last() {
        return Some(m.as_str().to_string());
    }
    PARENTHESIZED_ACRONYM
        .captures_iter(name)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace('.', ""))
        .filter(|a| !a.is_empty())
}

/// Split at the first comma into institution and address.
/// Returns `None` when the institution normalizes to nothing.
pub fn parse_affiliation(raw: &str) -> Option<Affiliation> {
    let (name, address) = match raw.split_once(',') {
        Some((name, address)) => (name.trim(), address.trim()),
        None => (raw.trim(), ""),
    };
    let normalized_name = normalize_institution(name);
    if normalized_name.is_empty() {
        return None;
    }
    Some(Affiliation {
        normalized_name,
        acronym: extract_acronym(name).unwrap_or_else(|| NO_ACRONYM.to_string()),
        address: if address.is_empty() {
            AFFILIATION_NOT_INFORMED.to_string()
        } else {
            address.to_string()
        },
    })
}

/// Dedups affiliations on the normalized institution name
#[derive(Debug, Clone, Copy, Default)]
pub struct AffiliationNormalizer;

impl ValueNormalizer for AffiliationNormalizer {
    fn extra_columns(&self) -> Vec<String> {
        vec!["acronym".to_string(), "address".to_string(), "full_text".to_string()]
    }

    fn normalize(&self, raw: &str) -> Option<Normalized> {
        let raw = raw.trim();
        let parsed = parse_affiliation(raw)?;
        Some(Normalized {
            value: parsed.normalized_name,
            extras: vec![parsed.acronym, parsed.address, raw.to_string()],
        })
    }
}
