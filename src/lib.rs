//! querycsv library
//!
//! Streams paginated search results from Elasticsearch or MongoDB into CSV
//! through a bounded, cancellable pipeline.
//!
//! # Modules
//!
//! - `backend`: Search backends and query resolution
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `export`: The export pipeline and CSV output
//!
//! # Example
//!
//! ```no_run
//! use querycsv::{config::Config, export::run_export};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.backend.address = "http://localhost:9200".to_string();
//!     config.export.fields = vec!["host".to_string(), "message".to_string()];
//!
//!     let result = run_export(&config, CancellationToken::new()).await?;
//!     println!("Exported {} documents", result.documents_exported);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExportError, Result};
pub use export::{ExportCoordinator, ExportResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
