use crate::error::Result;
use crate::table::Table;
use regex::Regex;

/// How a raw field separates its atomic values
#[derive(Debug, Clone)]
pub enum Delimiter {
    Literal(String),
    Pattern(Regex),
}

impl Delimiter {
    pub fn literal(s: &str) -> Self {
        Delimiter::Literal(s.to_string())
    }

    pub fn pattern(re: &str) -> Result<Self> {
        Ok(Delimiter::Pattern(Regex::new(re)?))
    }

    fn split<'a>(&self, field: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::Literal(d) => field.split(d.as_str()).collect(),
            Delimiter::Pattern(re) => re.split(field).collect(),
        }
    }
}

/// One decoded value of a multi-valued field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicValue {
    pub record_id: String,
    /// Index of the token in the raw split, so parallel columns line up
    pub position: usize,
    pub value: String,
    /// Optional attribute carried through to the bridge (party role, country origin)
    pub tag: Option<String>,
}

/// Splits multi-valued fields into [`AtomicValue`]s
#[derive(Debug, Clone)]
pub struct MultiValueSplitter {
    delimiter: Delimiter,
    sentinel: Option<String>,
}

impl MultiValueSplitter {
    pub fn new(delimiter: Delimiter) -> Self {
        Self {
            delimiter,
            sentinel: None,
        }
    }

    /// Fields equal to `sentinel` are treated as "not informed" and skipped
    pub fn with_sentinel(mut self, sentinel: &str) -> Self {
        self.sentinel = Some(sentinel.to_string());
        self
    }

    /// Split one field. Null and sentinel fields yield nothing; tokens that
    /// are empty after trimming are dropped but still consume a position.
    pub fn split_field(&self, record_id: &str, field: Option<&str>) -> Vec<AtomicValue> {
        let field = match field {
            Some(f) => f,
            None => return Vec::new(),
        };
        if self.sentinel.as_deref() == Some(field) {
            return Vec::new();
        }
        self.delimiter
            .split(field)
            .into_iter()
            .enumerate()
            .filter_map(|(position, token)| {
                let value = token.trim();
                if value.is_empty() {
                    None
                } else {
                    Some(AtomicValue {
                        record_id: record_id.to_string(),
                        position,
                        value: value.to_string(),
                        tag: None,
                    })
                }
            })
            .collect()
    }

    /// Split a sequence of `(record_id, field)` pairs. Records without an id are skipped.
    pub fn split_pairs<'a, I>(&self, pairs: I) -> Vec<AtomicValue>
    where
        I: IntoIterator<Item = (Option<&'a str>, Option<&'a str>)>,
    {
        pairs
            .into_iter()
            .filter_map(|(id, field)| id.map(|id| (id, field)))
            .flat_map(|(id, field)| self.split_field(id, field))
            .collect()
    }

    /// Split `value_column` of `table`, keyed by `id_column`.
    /// A missing column is reported as [`crate::error::EtlError::MissingColumn`].
    pub fn split_column(&self, table: &Table, id_column: &str, value_column: &str) -> Result<Vec<AtomicValue>> {
        let pairs = table.column_pairs(id_column, value_column)?;
        Ok(self.split_pairs(pairs))
    }

    /// Like [`split_column`](Self::split_column) but stamps every atom with `tag`
    pub fn split_column_tagged(
        &self,
        table: &Table,
        id_column: &str,
        value_column: &str,
        tag: &str,
    ) -> Result<Vec<AtomicValue>> {
        let mut atoms = self.split_column(table, id_column, value_column)?;
        for atom in &mut atoms {
            atom.tag = Some(tag.to_string());
        }
        Ok(atoms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(atoms: &[AtomicValue]) -> Vec<&str> {
        atoms.iter().map(|a| a.value.as_str()).collect()
    }

    #[test]
    fn test_trailing_empty_token_dropped_and_trimmed() {
        let splitter = MultiValueSplitter::new(Delimiter::literal(";"));
        let atoms = splitter.split_field("r1", Some("Rosa; Tabebuia ; "));
        assert_eq!(values(&atoms), vec!["Rosa", "Tabebuia"]);
        assert_eq!(atoms[0].position, 0);
        assert_eq!(atoms[1].position, 1);
        assert!(atoms.iter().all(|a| a.record_id == "r1"));
    }

    #[test]
    fn test_sentinel_and_null_are_skipped() {
        let splitter = MultiValueSplitter::new(Delimiter::literal("|")).with_sentinel("NAO INFORMADO");
        assert!(splitter.split_field("r1", Some("NAO INFORMADO")).is_empty());
        assert!(splitter.split_field("r1", None).is_empty());
        assert_eq!(values(&splitter.split_field("r1", Some("Fire|Logging"))), vec!["Fire", "Logging"]);
    }

    #[test]
    fn test_pattern_delimiter() {
        let splitter = MultiValueSplitter::new(Delimiter::pattern(r"\s*;\s*").unwrap());
        let atoms = splitter.split_field("e1", Some("Silva J.;Souza M.  ;  Lima A."));
        assert_eq!(values(&atoms), vec!["Silva J.", "Souza M.", "Lima A."]);
    }

    #[test]
    fn test_empty_middle_token_keeps_positions() {
        let splitter = MultiValueSplitter::new(Delimiter::literal(","));
        let atoms = splitter.split_field("p1", Some("A,,C"));
        assert_eq!(values(&atoms), vec!["A", "C"]);
        assert_eq!(atoms[1].position, 2);
    }

    #[test]
    fn test_split_column_and_tags() {
        let table = Table::from_rows(
            "records",
            &["id", "parties"],
            &[&["p1", "ACME [US], Foo [BR]"], &["p2", ""], &["", "Orphan"]],
        )
        .unwrap();
        let splitter = MultiValueSplitter::new(Delimiter::literal(","));
        let atoms = splitter.split_column_tagged(&table, "id", "parties", "applicant").unwrap();
        assert_eq!(values(&atoms), vec!["ACME [US]", "Foo [BR]"]);
        assert!(atoms.iter().all(|a| a.tag.as_deref() == Some("applicant")));

        let err = splitter.split_column(&table, "id", "missing").unwrap_err();
        assert!(err.is_missing_column());
    }
}
