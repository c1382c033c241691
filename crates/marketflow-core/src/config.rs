//! Configuration schema (marketflow.toml)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use crate::table::{is_valid_identifier, LoadMethod};

/// Polling schedule for `marketflow schedule`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between two runs
    pub run_seconds: u64,

    /// Seconds between two checks for a due run
    pub poll_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_seconds: 3600,
            poll_seconds: 5,
        }
    }
}

/// Run log settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Folder receiving one log file per run
    #[serde(default)]
    pub log_folder_path: Option<PathBuf>,
}

/// Supported warehouse backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseKind {
    /// Embedded SQLite database
    Sqlite,

    /// PostgreSQL or compatible server
    Postgres,
}

impl Default for WarehouseKind {
    fn default() -> Self {
        Self::Sqlite
    }
}

/// Warehouse connection settings
///
/// Credentials are never stored here; they are supplied separately as
/// `ConnectionParams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Warehouse type
    #[serde(rename = "type", default)]
    pub kind: WarehouseKind,

    /// Database file for SQLite (`:memory:` for a transient database)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Use TLS for PostgreSQL connections
    #[serde(default)]
    pub tls: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            kind: WarehouseKind::Sqlite,
            path: Some(PathBuf::from("marketflow.db")),
            tls: false,
        }
    }
}

/// Run metadata store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Table receiving one row per run
    #[serde(default = "default_metadata_table")]
    pub table: String,

    /// Separate warehouse for run metadata (defaults to the main one)
    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,
}

fn default_metadata_table() -> String {
    "pipeline_logs".to_string()
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            table: default_metadata_table(),
            warehouse: None,
        }
    }
}

/// Kinds of raw sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Fixer currency exchange rates
    Fixer,

    /// MarketStack end-of-day stock prices
    MarketStack,
}

/// One raw source extracted and loaded during the raw phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique source name
    pub name: String,

    /// Source kind
    pub kind: SourceKind,

    /// Target raw table (defaults to the kind's standard table)
    #[serde(default)]
    pub table: Option<String>,

    /// Conflict policy for the raw load
    #[serde(default = "default_load_method")]
    pub load_method: LoadMethod,

    /// Symbols requested from the API
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Endpoint override (defaults to the provider's public API)
    #[serde(default)]
    pub url: Option<String>,
}

fn default_load_method() -> LoadMethod {
    LoadMethod::Upsert
}

/// Location of the query templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Directory holding `<name>.sql` templates
    pub dir: PathBuf,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("sql"),
        }
    }
}

/// One transform step of the DAG
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Unique transform name; also the template name
    pub name: String,

    /// Output table (defaults to the transform name)
    #[serde(default)]
    pub table: Option<String>,

    /// Names of transforms that must run first
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TransformConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Output table name
    pub fn target_table(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, recorded with every run
    pub name: String,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub warehouse: WarehouseConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub templates: TemplateConfig,

    #[serde(default)]
    pub transforms: Vec<TransformConfig>,

    /// Static template parameters
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl PipelineConfig {
    /// Minimal configuration with no sources or transforms
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schedule: ScheduleConfig::default(),
            logging: LoggingConfig::default(),
            warehouse: WarehouseConfig::default(),
            metadata: MetadataConfig::default(),
            sources: Vec::new(),
            templates: TemplateConfig::default(),
            transforms: Vec::new(),
            vars: BTreeMap::new(),
            project_root: PathBuf::from("."),
        }
    }

    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut config: PipelineConfig = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.project_root = PathBuf::from(".");
        config.validate()?;
        Ok(config)
    }

    /// Check names and uniqueness constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("pipeline name must not be empty".to_string()));
        }

        let mut sources = HashSet::new();
        for source in &self.sources {
            if !sources.insert(source.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate source '{}'", source.name)));
            }
            if let Some(table) = &source.table {
                Self::check_identifier("source table", table)?;
            }
        }

        let mut transforms = HashSet::new();
        for transform in &self.transforms {
            if !transforms.insert(transform.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate transform '{}'",
                    transform.name
                )));
            }
            Self::check_identifier("transform table", transform.target_table())?;
        }

        Self::check_identifier("metadata table", &self.metadata.table)?;

        Ok(())
    }

    fn check_identifier(what: &str, name: &str) -> Result<(), ConfigError> {
        if is_valid_identifier(name) {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!("{} '{}' is not a valid identifier", what, name)))
        }
    }

    /// Resolve a possibly relative path against the project root
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Template directory resolved against the project root
    pub fn template_dir(&self) -> PathBuf {
        self.resolve_path(&self.templates.dir)
    }

    /// Configuration snapshot stored with each run record
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Connection parameters for a server-based warehouse
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ConnectionParams {
    /// libpq-style key/value connection string
    pub fn to_connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name = "market_pipeline"

[schedule]
run_seconds = 60
poll_seconds = 2

[warehouse]
type = "sqlite"
path = ":memory:"

[[sources]]
name = "fixer"
kind = "fixer"
symbols = ["USD", "CNY"]

[[sources]]
name = "stocks"
kind = "market_stack"
load_method = "overwrite"

[[transforms]]
name = "stock_prices_in_currencies"

[[transforms]]
name = "aggregated_stock_profiles"
depends_on = ["stock_prices_in_currencies"]

[vars]
base_currency = "EUR"
"#;

    #[test]
    fn parse_sample() {
        let config = PipelineConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.name, "market_pipeline");
        assert_eq!(config.schedule.run_seconds, 60);
        assert_eq!(config.warehouse.kind, WarehouseKind::Sqlite);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].load_method, LoadMethod::Upsert);
        assert_eq!(config.sources[1].load_method, LoadMethod::Overwrite);
        assert_eq!(config.sources[1].kind, SourceKind::MarketStack);
        assert_eq!(config.transforms[1].depends_on, vec!["stock_prices_in_currencies"]);
        assert_eq!(config.transforms[0].target_table(), "stock_prices_in_currencies");
        assert_eq!(config.vars["base_currency"], serde_json::json!("EUR"));
        assert_eq!(config.metadata.table, "pipeline_logs");
    }

    #[test]
    fn unknown_load_method_rejected() {
        let toml = r#"
name = "p"
[[sources]]
name = "fixer"
kind = "fixer"
load_method = "merge"
"#;
        assert!(matches!(PipelineConfig::from_toml(toml), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn duplicate_transform_rejected() {
        let toml = r#"
name = "p"
[[transforms]]
name = "a"
[[transforms]]
name = "a"
"#;
        assert!(matches!(PipelineConfig::from_toml(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bad_table_identifier_rejected() {
        let toml = r#"
name = "p"
[[transforms]]
name = "a"
table = "a; drop table b"
"#;
        assert!(matches!(PipelineConfig::from_toml(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_name_rejected() {
        assert!(PipelineConfig::from_toml("name = \"  \"").is_err());
    }

    #[test]
    fn password_is_redacted() {
        let params = ConnectionParams {
            host: "localhost".to_string(),
            port: 5432,
            database: "market".to_string(),
            user: "etl".to_string(),
            password: "secret".to_string(),
        };
        let debug = format!("{:?}", params);
        assert!(!debug.contains("secret"));
        assert!(params.to_connection_string().contains("password=secret"));
    }
}
