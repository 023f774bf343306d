use std::fmt;

use serde::Deserialize;

/// Structured error information extracted from a backend failure.
///
/// Elasticsearch reports failures as a JSON body, MongoDB through typed
/// driver errors; both are reduced to this shape before being shown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub(crate) error_type: Option<String>,
    pub(crate) code: Option<i32>,
    pub(crate) name: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) index: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ElasticErrorBody {
    error: ElasticErrorField,
    #[serde(default)]
    status: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ElasticErrorField {
    Detailed(ElasticErrorCause),
    Message(String),
}

#[derive(Debug, Deserialize)]
struct ElasticErrorCause {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    index: Option<String>,
    #[serde(default)]
    caused_by: Option<Box<ElasticErrorCause>>,
}

/// Longest raw body kept when a response cannot be parsed.
const MAX_RAW_BODY: usize = 512;

impl ErrorInfo {
    /// Parse an Elasticsearch error response body.
    ///
    /// Falls back to the (truncated) raw body when it is not the usual
    /// `{"error": {...}, "status": N}` envelope.
    pub fn from_elastic_body(body: &str) -> Self {
        let Ok(parsed) = serde_json::from_str::<ElasticErrorBody>(body) else {
            return Self {
                message: Some(truncate(body.trim(), MAX_RAW_BODY)),
                ..Self::default()
            };
        };

        let mut info = ErrorInfo {
            code: parsed.status,
            ..Self::default()
        };

        match parsed.error {
            ElasticErrorField::Message(message) => info.message = Some(message),
            ElasticErrorField::Detailed(cause) => {
                info.error_type = cause.error_type.clone();
                info.index = cause.index.clone();
                // The innermost cause usually carries the useful reason
                // (e.g. a query parse failure wrapped in search_phase_execution).
                let mut deepest = &cause;
                while let Some(next) = deepest.caused_by.as_deref() {
                    deepest = next;
                }
                info.message = deepest.reason.clone().or_else(|| cause.reason.clone());
                if !std::ptr::eq(deepest, &cause) {
                    info.name = deepest.error_type.clone();
                }
            }
        }

        info
    }

    /// Extract structured information from a MongoDB driver error.
    pub fn from_mongodb_error(error: &mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        let mut info = ErrorInfo::default();

        match error.kind.as_ref() {
            ErrorKind::Command(command_error) => {
                info.error_type = Some("mongo.command_error".to_string());
                info.code = Some(command_error.code);
                info.name = Some(command_error.code_name.clone()).filter(|n| !n.is_empty());
                info.message = Some(command_error.message.clone());
            }
            ErrorKind::Authentication { message, .. } => {
                info.error_type = Some("mongo.authentication_error".to_string());
                info.message = Some(message.clone());
            }
            ErrorKind::InvalidArgument { message, .. } => {
                info.error_type = Some("mongo.invalid_argument".to_string());
                info.message = Some(message.clone());
            }
            ErrorKind::ServerSelection { message, .. } => {
                info.error_type = Some("mongo.server_selection_error".to_string());
                info.message = Some(message.clone());
            }
            _ => info.message = Some(error.to_string()),
        }

        info
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error_type) = &self.error_type {
            write!(f, "[{error_type}] ")?;
        }
        match &self.message {
            Some(message) => write!(f, "{message}")?,
            None => write!(f, "unknown error")?,
        }
        match (&self.name, self.code) {
            (Some(name), Some(code)) => write!(f, " ({name}, code {code})")?,
            (Some(name), None) => write!(f, " ({name})")?,
            (None, Some(code)) => write!(f, " (code {code})")?,
            (None, None) => {}
        }
        if let Some(index) = &self.index {
            write!(f, " [index: {index}]")?;
        }
        Ok(())
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_not_found() {
        let body = r#"{
            "error": {
                "root_cause": [{"type": "index_not_found_exception", "reason": "no such index [logs-x]"}],
                "type": "index_not_found_exception",
                "reason": "no such index [logs-x]",
                "index": "logs-x"
            },
            "status": 404
        }"#;

        let info = ErrorInfo::from_elastic_body(body);
        assert_eq!(info.error_type.as_deref(), Some("index_not_found_exception"));
        assert_eq!(info.code, Some(404));
        assert_eq!(info.index.as_deref(), Some("logs-x"));
        assert_eq!(
            info.to_string(),
            "[index_not_found_exception] no such index [logs-x] (code 404) [index: logs-x]"
        );
    }

    #[test]
    fn test_parse_nested_cause() {
        let body = r#"{
            "error": {
                "type": "search_phase_execution_exception",
                "reason": "all shards failed",
                "caused_by": {"type": "query_shard_exception", "reason": "Failed to parse query [a:(]"}
            },
            "status": 400
        }"#;

        let info = ErrorInfo::from_elastic_body(body);
        assert_eq!(info.message.as_deref(), Some("Failed to parse query [a:(]"));
        assert_eq!(info.name.as_deref(), Some("query_shard_exception"));
    }

    #[test]
    fn test_parse_string_error() {
        let info = ErrorInfo::from_elastic_body(r#"{"error": "IndexMissingException[[x] missing]", "status": 404}"#);
        assert_eq!(info.message.as_deref(), Some("IndexMissingException[[x] missing]"));
        assert_eq!(info.error_type, None);
    }

    #[test]
    fn test_unparseable_body_is_truncated() {
        let body = "x".repeat(2000);
        let info = ErrorInfo::from_elastic_body(&body);
        let message = info.message.unwrap();
        assert!(message.ends_with("..."));
        assert_eq!(message.len(), MAX_RAW_BODY + 3);
    }
}
