//! Command-line interface for querycsv
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and merging with arguments
//! - Field list resolution and final validation

use clap::Parser;
use std::path::PathBuf;

use crate::backend::sanitize_address;
use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, Result};
use crate::export::FieldList;

/// Export search results to CSV
#[derive(Parser, Debug)]
#[command(
    name = "querycsv",
    version,
    about = "Export search results to CSV",
    long_about = "Streams every document matching a query out of Elasticsearch or MongoDB and
writes the selected fields to a CSV file. The backend is chosen by the address scheme:
http(s):// for Elasticsearch, mongodb:// or mongodb+srv:// for MongoDB."
)]
pub struct CliArgs {
    /// Backend address
    ///
    /// Credentials embedded in the address are never printed.
    #[arg(short = 'e', long, alias = "eshost", value_name = "URL")]
    pub address: Option<String>,

    /// Index pattern (Elasticsearch) or database.collection (MongoDB)
    #[arg(short = 'i', long, value_name = "INDEX")]
    pub index: Option<String>,

    /// Raw query as JSON; takes precedence over --query
    #[arg(short = 'r', long = "rawquery", value_name = "JSON")]
    pub raw_query: Option<String>,

    /// Free-text query
    #[arg(short = 'q', long, value_name = "QUERY")]
    pub query: Option<String>,

    /// Output CSV file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub outfile: Option<PathBuf>,

    /// Comma separated list of fields; wins over --field
    #[arg(long, value_name = "LIST")]
    pub fields: Option<String>,

    /// Field to export (repeatable)
    #[arg(short = 'f', long = "field", value_name = "FIELD")]
    pub field: Vec<String>,

    /// Number of transformer workers
    #[arg(short = 'w', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Documents fetched per page
    #[arg(long, value_name = "N")]
    pub page_size: Option<u32>,

    /// Column delimiter (a single character, or "tab")
    #[arg(short = 'd', long, value_name = "CHAR")]
    pub delimiter: Option<String>,

    /// Text written for missing fields
    #[arg(long, value_name = "TEXT")]
    pub placeholder: Option<String>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Effective configuration (file, then arguments)
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and build the effective configuration
    ///
    /// # Returns
    /// * `Result<Self>` - Ready-to-run interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build the effective configuration for already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file, merge arguments and validate
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) -> Result<()> {
        Self::apply_backend_args(config, args);
        Self::apply_query_args(config, args);
        Self::apply_export_args(config, args)?;
        Self::apply_logging_args(config, args);
        Ok(())
    }

    fn apply_backend_args(config: &mut Config, args: &CliArgs) {
        if let Some(address) = &args.address {
            config.backend.address = address.clone();
        }
        if let Some(index) = &args.index {
            config.backend.index = index.clone();
        }
        if let Some(page_size) = args.page_size {
            config.backend.page_size = page_size;
        }
    }

    fn apply_query_args(config: &mut Config, args: &CliArgs) {
        if let Some(raw) = &args.raw_query {
            config.query.raw = Some(raw.clone());
        }
        if let Some(text) = &args.query {
            config.query.text = Some(text.clone());
        }
    }

    fn apply_export_args(config: &mut Config, args: &CliArgs) -> Result<()> {
        if let Some(fields) = Self::resolve_fields(args) {
            config.export.fields = fields.names().to_vec();
        }
        if let Some(outfile) = &args.outfile {
            config.export.outfile = outfile.clone();
        }
        if let Some(workers) = args.workers {
            config.export.workers = workers;
        }
        if let Some(delimiter) = &args.delimiter {
            config.export.delimiter = parse_delimiter(delimiter)?;
        }
        if let Some(placeholder) = &args.placeholder {
            config.export.placeholder = placeholder.clone();
        }
        if args.no_progress || args.quiet {
            config.export.progress = false;
        }
        Ok(())
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Fields named on the command line
    ///
    /// `--fields` wins over `-f` when both are given. Returns None when
    /// neither is, leaving the configured list in place.
    fn resolve_fields(args: &CliArgs) -> Option<FieldList> {
        if let Some(list) = &args.fields {
            return Some(FieldList::parse(list));
        }
        if args.field.is_empty() {
            return None;
        }
        Some(FieldList::new(
            args.field
                .iter()
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }

    /// Print what is about to be exported
    pub fn print_banner(&self) {
        if !self.args.quiet {
            println!(
                "Exporting {} from {}",
                self.config.backend.index,
                sanitize_address(&self.config.backend.address)
            );
            println!(
                "Fields: {} -> {}",
                self.config.export.fields.join(", "),
                self.config.export.outfile.display()
            );
        }
    }
}

/// Parse a delimiter argument: one character, or a name for tab
fn parse_delimiter(value: &str) -> Result<char> {
    match value {
        "tab" | "\\t" => return Ok('\t'),
        _ => {}
    }

    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ConfigError::InvalidValue {
            field: "export.delimiter".to_string(),
            value: value.to_string(),
        }
        .into()),
    }
}
