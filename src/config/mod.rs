//! Configuration management for querycsv
//!
//! Configuration is read from an optional TOML file and then overridden by
//! command-line arguments.
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values
//!
//! ```toml
//! [backend]
//! address = "http://localhost:9200"
//! index = "logs-*"
//!
//! [query]
//! text = "level:error"
//!
//! [export]
//! outfile = "errors.csv"
//! fields = ["@timestamp", "host", "message"]
//! workers = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Query selection
    #[serde(default)]
    pub query: QueryConfig,

    /// Export pipeline configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend address; the scheme selects Elasticsearch or MongoDB
    #[serde(default = "default_address")]
    pub address: String,

    /// Index (Elasticsearch) or `database.collection` (MongoDB)
    #[serde(default = "default_index")]
    pub index: String,

    /// Documents fetched per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// How long Elasticsearch keeps a scroll context alive between pages
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,

    /// Basic-auth username (Elasticsearch)
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password (Elasticsearch)
    #[serde(default)]
    pub password: Option<String>,
}

/// Query inputs, resolved by precedence: raw, then text, then match-all
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Raw backend query (JSON)
    #[serde(default)]
    pub raw: Option<String>,

    /// Free-text query (Lucene syntax for Elasticsearch, `$text` for MongoDB)
    #[serde(default)]
    pub text: Option<String>,
}

/// Export pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Destination CSV file
    #[serde(default = "default_outfile")]
    pub outfile: PathBuf,

    /// Fields to export, in column order
    #[serde(default)]
    pub fields: Vec<String>,

    /// Number of transformer workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the queue between workers and the writer
    #[serde(default = "default_row_buffer")]
    pub row_buffer: usize,

    /// Capacity of the queue between the source and the workers
    #[serde(default = "default_distributor_buffer")]
    pub distributor_buffer: usize,

    /// Text written for fields a document does not have
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    /// Column delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Show a progress bar
    #[serde(default = "default_progress")]
    pub progress: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_address() -> String {
    "http://localhost:9200".to_string()
}

fn default_index() -> String {
    "logs-*".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_timeout() -> u64 {
    30
}

fn default_scroll_keep_alive() -> String {
    "1m".to_string()
}

fn default_outfile() -> PathBuf {
    PathBuf::from("output.csv")
}

fn default_workers() -> usize {
    5
}

fn default_row_buffer() -> usize {
    5
}

fn default_distributor_buffer() -> usize {
    100
}

fn default_placeholder() -> String {
    "<nil>".to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_progress() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl BackendConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            index: default_index(),
            page_size: default_page_size(),
            timeout: default_timeout(),
            scroll_keep_alive: default_scroll_keep_alive(),
            username: None,
            password: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            outfile: default_outfile(),
            fields: Vec::new(),
            workers: default_workers(),
            row_buffer: default_row_buffer(),
            distributor_buffer: default_distributor_buffer(),
            placeholder: default_placeholder(),
            delimiter: default_delimiter(),
            progress: default_progress(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// An explicitly given path must exist. Without one the default path is
    /// tried and a missing file yields the default configuration.
    ///
    /// # Arguments
    /// * `path` - Optional path to the configuration file
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".querycsv")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.backend.address.trim().is_empty() {
            return Err(ConfigError::MissingField("backend.address".to_string()).into());
        }
        if self.backend.index.trim().is_empty() {
            return Err(ConfigError::MissingField("backend.index".to_string()).into());
        }
        if self.export.fields.is_empty() {
            return Err(ConfigError::MissingField("export.fields".to_string()).into());
        }

        let positive = [
            ("backend.page_size", self.backend.page_size as usize),
            ("backend.timeout", self.backend.timeout as usize),
            ("export.workers", self.export.workers),
            ("export.row_buffer", self.export.row_buffer),
            ("export.distributor_buffer", self.export.distributor_buffer),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "0"));
            }
        }

        let delimiter = self.export.delimiter;
        if matches!(delimiter, '"' | '\r' | '\n' | char::REPLACEMENT_CHARACTER) {
            return Err(invalid("export.delimiter", &delimiter.escape_default().to_string()));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str) -> crate::error::ExportError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_fields() -> Config {
        let mut config = Config::default();
        config.export.fields = vec!["host".to_string()];
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.address, "http://localhost:9200");
        assert_eq!(config.backend.index, "logs-*");
        assert_eq!(config.backend.page_size, 100);
        assert_eq!(config.export.workers, 5);
        assert_eq!(config.export.row_buffer, 5);
        assert_eq!(config.export.placeholder, "<nil>");
        assert_eq!(config.export.outfile, PathBuf::from("output.csv"));
        assert_eq!(config.backend.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [backend]
            address = "mongodb://db:27017"

            [export]
            fields = ["a", "b.c"]
            delimiter = ";"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.address, "mongodb://db:27017");
        assert_eq!(config.backend.index, "logs-*");
        assert_eq!(config.export.fields, vec!["a", "b.c"]);
        assert_eq!(config.export.delimiter, ';');
        assert_eq!(config.export.workers, 5);
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("[export]\nworkers = \"many\"").unwrap_err();
        assert!(matches!(err, crate::error::ExportError::Config(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let err = Config::load_from_file(Some(Path::new("/nonexistent/querycsv.toml"))).unwrap_err();
        assert!(matches!(err, crate::error::ExportError::Config(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[query]\ntext = \"level:error\"\n").unwrap();

        let config = Config::load_from_file(Some(&path)).unwrap();
        assert_eq!(config.query.text.as_deref(), Some("level:error"));
        assert_eq!(config.query.raw, None);
    }

    #[test]
    fn test_validate_requires_fields() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("export.fields"));
        assert!(with_fields().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = with_fields();
        config.export.workers = 0;
        assert!(config.validate().unwrap_err().to_string().contains("export.workers"));
    }

    #[test]
    fn test_validate_rejects_quote_delimiter() {
        let mut config = with_fields();
        config.export.delimiter = '"';
        assert!(config.validate().is_err());
        config.export.delimiter = '\t';
        assert!(config.validate().is_ok());
    }
}
