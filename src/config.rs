use crate::constants;
use crate::error::{EtlError, Result};
use crate::keys::KeyPolicy;
use crate::pipeline::processing::fact::ProjectionMode;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "observatory.toml";

/// Top-level pipeline configuration. Every field has a default, so an empty
/// or absent file yields the built-in layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub scopus: ScopusConfig,
    pub cncflora: CncfloraConfig,
    pub espacenet: EspacenetConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScopusConfig {
    /// Directory under `raw_dir`, searched recursively for `*.csv`
    pub input_dir: PathBuf,
    pub delimiter: char,
    pub not_informed: String,
    /// Columns missing in more than this percentage of rows are dropped
    pub missing_threshold_pct: f64,
}

impl Default for ScopusConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("scopus_input"),
            delimiter: ',',
            not_informed: constants::SCOPUS_NOT_INFORMED.to_string(),
            missing_threshold_pct: 60.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CncfloraConfig {
    pub input_dir: PathBuf,
    pub red_list_file: String,
    pub terms_file: String,
    pub delimiter: char,
    /// Separator inside the multi-valued action/threat columns
    pub value_delimiter: String,
    pub not_informed: String,
}

impl Default for CncfloraConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("cncflora"),
            red_list_file: "lista_vermelha_cnc_flora.csv".to_string(),
            terms_file: "termos_plantas.txt".to_string(),
            delimiter: ',',
            value_delimiter: "|".to_string(),
            not_informed: constants::CNCFLORA_NOT_INFORMED.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EspacenetConfig {
    /// Directory under `raw_dir` holding the exported `*.csv` files (not recursive)
    pub input_dir: PathBuf,
    pub delimiter: char,
    /// Manually curated `publication_number, abstract, scientific_name` file under `raw_dir`
    pub manual_lookup_file: String,
    pub manual_lookup_delimiter: char,
    pub not_informed: String,
}

impl Default for EspacenetConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("espacenet_input"),
            delimiter: ';',
            manual_lookup_file: "espacenet_resumo_plantas.csv".to_string(),
            manual_lookup_delimiter: ',',
            not_informed: constants::ESPACENET_NOT_INFORMED.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub key_policy: KeyPolicy,
    pub projection: ProjectionMode,
}

impl Config {
    /// Load configuration from `path`. An explicitly requested file must
    /// exist; the default path silently falls back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !config_path.exists() {
            if explicit {
                return Err(EtlError::Config(format!(
                    "Config file '{}' does not exist",
                    config_path.display()
                )));
            }
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        }

        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every split or read meaningless
    pub fn validate(&self) -> Result<()> {
        let delimiters = [
            ("scopus.delimiter", self.scopus.delimiter),
            ("cncflora.delimiter", self.cncflora.delimiter),
            ("espacenet.delimiter", self.espacenet.delimiter),
            ("espacenet.manual_lookup_delimiter", self.espacenet.manual_lookup_delimiter),
        ];
        for (name, delimiter) in delimiters {
            if !delimiter.is_ascii() || delimiter.is_ascii_alphanumeric() {
                return Err(EtlError::Config(format!(
                    "{} must be a single ASCII punctuation or whitespace character, got '{}'",
                    name, delimiter
                )));
            }
        }
        if self.cncflora.value_delimiter.is_empty() {
            return Err(EtlError::Config("cncflora.value_delimiter must not be empty".to_string()));
        }
        if !(0.0..=100.0).contains(&self.scopus.missing_threshold_pct) {
            return Err(EtlError::Config(format!(
                "scopus.missing_threshold_pct must be within 0..=100, got {}",
                self.scopus.missing_threshold_pct
            )));
        }
        Ok(())
    }

    pub fn scopus_input_dir(&self) -> PathBuf {
        self.paths.raw_dir.join(&self.scopus.input_dir)
    }

    pub fn cncflora_input_dir(&self) -> PathBuf {
        self.paths.raw_dir.join(&self.cncflora.input_dir)
    }

    pub fn espacenet_input_dir(&self) -> PathBuf {
        self.paths.raw_dir.join(&self.espacenet.input_dir)
    }

    pub fn espacenet_manual_lookup(&self) -> PathBuf {
        self.paths.raw_dir.join(&self.espacenet.manual_lookup_file)
    }

    /// Build a configuration rooted at a data directory (`<root>/raw`, `<root>/processed`).
    pub fn rooted_at(root: &Path) -> Self {
        let mut config = Config::default();
        config.paths.raw_dir = root.join("raw");
        config.paths.processed_dir = root.join("processed");
        config.paths.log_dir = root.join("logs");
        config
    }
}
