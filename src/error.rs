use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing input file: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("Column '{column}' not found in table '{table}'")]
    MissingColumn { table: String, column: String },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Key '{key}' has no row in dimension '{dimension}'")]
    DanglingKey { dimension: String, key: String },

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<EtlError>,
    },
}

impl EtlError {
    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        EtlError::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// True for the conditions a model builder treats as "skip this model".
    pub fn is_missing_column(&self) -> bool {
        matches!(self, EtlError::MissingColumn { .. })
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
