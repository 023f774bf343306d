use std::{fmt, io};

use super::remote::ErrorInfo;

/// Crate-wide `Result` type using [`ExportError`] as the error.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export runs.
#[derive(Debug)]
pub enum ExportError {
    /// Backend connection errors.
    Connection(ConnectionError),

    /// Query construction or execution errors.
    Query(QueryError),

    /// Configuration errors.
    Config(ConfigError),

    /// Pipeline coordination errors.
    Pipeline(PipelineError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// HTTP transport errors.
    Http(reqwest::Error),

    /// JSON encoding/decoding errors.
    Json(serde_json::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Backend address has a scheme no backend understands.
    UnsupportedScheme(String),

    /// Backend address could not be parsed.
    InvalidAddress(String),

    /// Backend answered but reported itself unhealthy.
    HealthCheckFailed(String),
}

/// Query-specific errors.
#[derive(Debug)]
pub enum QueryError {
    /// Raw query text is not valid for the backend.
    InvalidQuery(String),

    /// Index or collection identifier is not usable.
    InvalidIndex(String),

    /// Backend rejected the request.
    Rejected { status: u16, info: ErrorInfo },

    /// Backend answered with a body we could not interpret.
    UnexpectedResponse(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/// Errors raised by the pipeline machinery itself rather than a backend.
#[derive(Debug)]
pub enum PipelineError {
    /// The run was cancelled from outside (e.g. Ctrl+C).
    Cancelled,

    /// A stage task panicked or was aborted.
    StageFailed(String),

    /// Writing, encoding or flushing the output failed.
    SinkFailed(io::Error),
}

impl ExportError {
    /// Whether this error only reports an external cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Pipeline(PipelineError::Cancelled))
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Connection(e) => write!(f, "Connection error: {e}"),
            ExportError::Query(e) => write!(f, "Query error: {e}"),
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Pipeline(e) => write!(f, "Pipeline error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::MongoDb(e) => {
                write!(f, "MongoDB error: {}", ErrorInfo::from_mongodb_error(e))
            }
            ExportError::Http(e) => write!(f, "HTTP error: {e}"),
            ExportError::Json(e) => write!(f, "JSON error: {e}"),
            ExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::UnsupportedScheme(address) => write!(
                f,
                "Unsupported backend address '{address}' (expected http://, https://, mongodb:// or mongodb+srv://)"
            ),
            ConnectionError::InvalidAddress(address) => {
                write!(f, "Invalid backend address: {address}")
            }
            ConnectionError::HealthCheckFailed(msg) => write!(f, "Health check failed: {msg}"),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidQuery(msg) => write!(f, "Invalid query: {msg}"),
            QueryError::InvalidIndex(index) => write!(f, "Invalid index: {index}"),
            QueryError::Rejected { status, info } => {
                write!(f, "Backend rejected request (HTTP {status}): {info}")
            }
            QueryError::UnexpectedResponse(msg) => write!(f, "Unexpected response: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Cancelled => write!(f, "Export cancelled"),
            PipelineError::StageFailed(msg) => write!(f, "Stage failed: {msg}"),
            PipelineError::SinkFailed(e) => write!(f, "Failed to write output: {e}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            ExportError::MongoDb(e) => Some(e),
            ExportError::Http(e) => Some(e),
            ExportError::Json(e) => Some(e),
            ExportError::Pipeline(PipelineError::SinkFailed(e)) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for ConnectionError {}
impl std::error::Error for QueryError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for PipelineError {}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<mongodb::error::Error> for ExportError {
    fn from(err: mongodb::error::Error) -> Self {
        ExportError::MongoDb(err)
    }
}

impl From<reqwest::Error> for ExportError {
    fn from(err: reqwest::Error) -> Self {
        ExportError::Http(err)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Json(err)
    }
}

impl From<ConnectionError> for ExportError {
    fn from(err: ConnectionError) -> Self {
        ExportError::Connection(err)
    }
}

impl From<QueryError> for ExportError {
    fn from(err: QueryError) -> Self {
        ExportError::Query(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<PipelineError> for ExportError {
    fn from(err: PipelineError) -> Self {
        ExportError::Pipeline(err)
    }
}

impl From<String> for ExportError {
    fn from(msg: String) -> Self {
        ExportError::Generic(msg)
    }
}

impl From<&str> for ExportError {
    fn from(msg: &str) -> Self {
        ExportError::Generic(msg.to_owned())
    }
}
