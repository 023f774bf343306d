//! Error handling for export runs.
//!
//! Errors fall into the severities the pipeline cares about:
//! - connection and count failures abort a run before any stage starts
//! - page fetch failures and sink failures cancel a running pipeline
//! - malformed documents never become an [`ExportError`]; the transformer
//!   logs and skips them
//!
//! Backend error bodies are parsed into a structured [`ErrorInfo`] so the
//! message printed to the user names the server-side failure rather than a
//! raw HTTP status or driver dump.

pub mod kinds;
pub mod remote;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ConnectionError, ExportError, PipelineError, QueryError, Result,
};
pub use remote::ErrorInfo;
