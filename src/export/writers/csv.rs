//! CSV writer for export operations
//!
//! Quoting follows RFC 4180: a value is wrapped in double quotes when it
//! contains the delimiter, a quote, CR or LF, or starts with whitespace, and
//! embedded quotes are doubled. Records end with `\n`.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use super::{FormatWriter, create_writer};
use crate::error::Result;
use crate::export::record::{FieldList, Row};

/// Encodes records as delimited text
#[derive(Debug, Clone, Copy)]
pub struct CsvEncoder {
    delimiter: char,
}

impl Default for CsvEncoder {
    fn default() -> Self {
        Self::new(',')
    }
}

impl CsvEncoder {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    /// Encode one record, including the line terminator
    pub fn encode_record<S: AsRef<str>>(&self, values: &[S]) -> String {
        let mut line = String::new();
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                line.push(self.delimiter);
            }
            self.push_value(&mut line, value.as_ref());
        }
        line.push('\n');
        line
    }

    fn push_value(&self, line: &mut String, value: &str) {
        if !self.needs_quotes(value) {
            line.push_str(value);
            return;
        }

        line.push('"');
        for c in value.chars() {
            if c == '"' {
                line.push('"');
            }
            line.push(c);
        }
        line.push('"');
    }

    fn needs_quotes(&self, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        value.contains(self.delimiter)
            || value.contains(['"', '\r', '\n'])
            || value.starts_with([' ', '\t'])
    }
}

/// Writer for CSV format
pub struct CsvWriter<W> {
    /// Underlying output
    writer: W,
    /// Record encoder
    encoder: CsvEncoder,
    /// Number of rows written
    written: u64,
    /// Bytes written, header included
    bytes: u64,
}

impl CsvWriter<BufWriter<File>> {
    /// Create a CSV writer on a new file
    ///
    /// # Arguments
    /// * `path` - Output file path
    /// * `delimiter` - Column delimiter
    ///
    /// # Returns
    /// * `Result<Self>` - New writer instance or error
    pub async fn create(path: &Path, delimiter: char) -> Result<Self> {
        let writer = create_writer(path).await?;
        debug!("Created CSV writer for: {}", path.display());
        Ok(Self::new(writer, CsvEncoder::new(delimiter)))
    }
}

impl<W> CsvWriter<W> {
    pub fn new(writer: W, encoder: CsvEncoder) -> Self {
        Self {
            writer,
            encoder,
            written: 0,
            bytes: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: AsyncWrite + Unpin + Send> CsvWriter<W> {
    async fn write_record<S: AsRef<str> + Sync>(&mut self, values: &[S]) -> io::Result<()> {
        let line = self.encoder.encode_record(values);
        self.writer.write_all(line.as_bytes()).await?;
        // Each record is flushed as soon as it is written so the file
        // always holds every row the pipeline has accepted.
        self.writer.flush().await?;
        self.bytes += line.len() as u64;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FormatWriter for CsvWriter<W> {
    async fn write_header(&mut self, fields: &FieldList) -> io::Result<()> {
        self.write_record(fields.names()).await?;
        debug!("Wrote CSV headers: {} fields", fields.len());
        Ok(())
    }

    async fn write_row(&mut self, row: &Row) -> io::Result<()> {
        self.write_record(row.values()).await?;
        self.written += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> io::Result<()> {
        self.writer.flush().await?;
        debug!(
            "Finalized CSV output ({} rows, {} bytes)",
            self.written, self.bytes
        );
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}
