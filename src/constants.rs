/// Stage names used on the command line, in logs and in the run report.
pub const SCOPUS_STAGE: &str = "scopus";
pub const CNCFLORA_STAGE: &str = "cncflora";
pub const UNIFY_STAGE: &str = "unify";
pub const ESPACENET_STAGE: &str = "espacenet";

/// Fixed execution order. `unify` needs both leaf sources and `espacenet`
/// needs the master species dimension produced by `unify`.
pub const STAGE_ORDER: [&str; 4] = [SCOPUS_STAGE, CNCFLORA_STAGE, UNIFY_STAGE, ESPACENET_STAGE];

/// Output sub-directory for the unified tables
pub const UNIFIED_DIR: &str = "unified";

// Tables handed from one stage to the next
pub const CLEAN_RECORDS_TABLE: &str = "clean_records";
pub const SPECIES_TABLE: &str = "dim_species";
pub const SPECIES_MASTER_TABLE: &str = "dim_species_master";

// "Not informed" markers written into empty cells during cleaning
pub const SCOPUS_NOT_INFORMED: &str = "nao_informado";
pub const CNCFLORA_NOT_INFORMED: &str = "NAO INFORMADO";
pub const ESPACENET_NOT_INFORMED: &str = "NAO INFORMADO";

// Affiliation parser fallbacks
pub const AFFILIATION_NOT_INFORMED: &str = "NAO_INFORMADO";
pub const NO_ACRONYM: &str = "SEM SIGLA";

/// Name of the execution summary written next to the processed tables
pub const RUN_REPORT_FILE: &str = "run_report.json";

/// Patent office / country codes recognised in publication numbers and party strings.
pub const COUNTRY_CODES: &[(&str, &str)] = &[
    ("AR", "Argentina"),
    ("AT", "Áustria"),
    ("AU", "Austrália"),
    ("BR", "Brasil"),
    ("CA", "Canadá"),
    ("CH", "Suíça"),
    ("CN", "China"),
    ("DE", "Alemanha"),
    ("DK", "Dinamarca"),
    ("EP", "Organização Europeia de Patentes (OPE/EPO)"),
    ("ES", "Espanha"),
    ("FR", "França"),
    ("GB", "Reino Unido"),
    ("IL", "Israel"),
    ("IN", "India"),
    ("JP", "Japão"),
    ("KR", "Coreia do Sul"),
    ("RU", "Federação Russa"),
    ("US", "Estados Unidos da América"),
    ("WO", "Organização Mundial da Propriedade Intelectual (OMPI/WIPO)"),
    ("ZA", "África do Sul"),
];

/// Look up the display name for a country code
pub fn country_name(code: &str) -> Option<&'static str> {
    COUNTRY_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

