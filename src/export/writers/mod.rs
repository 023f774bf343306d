//! Format writers for export operations
//!
//! The sink drives a [`FormatWriter`]: one header, then rows, then a final
//! flush. Writers report plain I/O errors; the sink decides what a failure
//! means for the run.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::BufWriter;

use crate::export::record::{FieldList, Row};
use crate::error::{ConfigError, Result};

pub mod csv;

pub use csv::{CsvEncoder, CsvWriter};

/// Trait for writing rows to an output format
#[async_trait]
pub trait FormatWriter: Send {
    /// Write the header record
    async fn write_header(&mut self, fields: &FieldList) -> io::Result<()>;

    /// Write one row and make it visible to readers of the output
    async fn write_row(&mut self, row: &Row) -> io::Result<()>;

    /// Flush anything still buffered
    async fn finalize(&mut self) -> io::Result<()>;

    /// Bytes handed to the output so far
    fn bytes_written(&self) -> u64;
}

/// Create (or truncate) the output file behind a buffered writer
///
/// # Arguments
/// * `path` - File path to create
///
/// # Returns
/// * `Result<BufWriter<File>>` - Buffered writer or error
pub(crate) async fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    validate_path(path)?;
    let file = File::create(path).await?;
    Ok(BufWriter::new(file))
}

/// Check that the output's parent directory exists
fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ConfigError::InvalidValue {
                field: "export.outfile".to_string(),
                value: format!("{} (directory does not exist)", path.display()),
            }
            .into());
        }
    }

    Ok(())
}
