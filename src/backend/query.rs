//! Query selection shared by all backends

use bson::{Bson, Document, doc};
use serde_json::{Value, json};

use crate::error::{QueryError, Result};

/// The query a run exports, before translation into a backend's dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySpec {
    /// A backend-native query given as JSON (an Elasticsearch query clause or
    /// a MongoDB filter document)
    Raw(Value),
    /// Free-text search
    Text(String),
    /// Every document
    MatchAll,
}

impl QuerySpec {
    /// Pick the query from the configured inputs
    ///
    /// A raw query wins over free text, which wins over match-all. Blank
    /// inputs count as absent.
    pub fn resolve(raw: Option<&str>, text: Option<&str>) -> Result<Self> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());
        let text = text.map(str::trim).filter(|s| !s.is_empty());

        if let Some(raw) = raw {
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| QueryError::InvalidQuery(format!("raw query is not JSON: {e}")))?;
            if !value.is_object() {
                return Err(
                    QueryError::InvalidQuery("raw query must be a JSON object".to_string()).into(),
                );
            }
            return Ok(QuerySpec::Raw(value));
        }

        Ok(match text {
            Some(text) => QuerySpec::Text(text.to_string()),
            None => QuerySpec::MatchAll,
        })
    }

    /// Elasticsearch query clause
    pub fn to_elastic(&self) -> Value {
        match self {
            QuerySpec::Raw(value) => value.clone(),
            QuerySpec::Text(text) => json!({ "query_string": { "query": text } }),
            QuerySpec::MatchAll => json!({ "match_all": {} }),
        }
    }

    /// MongoDB filter document
    ///
    /// Raw queries are read as extended JSON, so `{"_id": {"$oid": "..."}}`
    /// and `{"$date": ...}` work as they do in the shell.
    pub fn to_mongo_filter(&self) -> Result<Document> {
        match self {
            QuerySpec::Raw(value) => match Bson::try_from(value.clone()) {
                Ok(Bson::Document(filter)) => Ok(filter),
                Ok(other) => Err(QueryError::InvalidQuery(format!(
                    "filter must be a document, got {:?}",
                    other.element_type()
                ))
                .into()),
                Err(e) => Err(QueryError::InvalidQuery(e.to_string()).into()),
            },
            QuerySpec::Text(text) => Ok(doc! { "$text": { "$search": text.as_str() } }),
            QuerySpec::MatchAll => Ok(Document::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_takes_precedence() {
        let spec = QuerySpec::resolve(Some(r#"{"term": {"host": "a"}}"#), Some("level:error")).unwrap();
        assert_eq!(spec, QuerySpec::Raw(json!({"term": {"host": "a"}})));
    }

    #[test]
    fn test_text_over_match_all() {
        let spec = QuerySpec::resolve(None, Some("level:error")).unwrap();
        assert_eq!(spec, QuerySpec::Text("level:error".to_string()));

        let spec = QuerySpec::resolve(Some("   "), Some("level:error")).unwrap();
        assert_eq!(spec, QuerySpec::Text("level:error".to_string()));
    }

    #[test]
    fn test_default_is_match_all() {
        assert_eq!(QuerySpec::resolve(None, None).unwrap(), QuerySpec::MatchAll);
        assert_eq!(QuerySpec::resolve(Some(""), Some("")).unwrap(), QuerySpec::MatchAll);
    }

    #[test]
    fn test_invalid_raw_query() {
        assert!(QuerySpec::resolve(Some("{not json"), None).is_err());
        assert!(QuerySpec::resolve(Some("[1, 2]"), None).is_err());
    }

    #[test]
    fn test_elastic_translation() {
        assert_eq!(QuerySpec::MatchAll.to_elastic(), json!({"match_all": {}}));
        assert_eq!(
            QuerySpec::Text("host:web-1".to_string()).to_elastic(),
            json!({"query_string": {"query": "host:web-1"}})
        );
    }

    #[test]
    fn test_mongo_translation() {
        assert_eq!(QuerySpec::MatchAll.to_mongo_filter().unwrap(), Document::new());
        assert_eq!(
            QuerySpec::Text("disk full".to_string()).to_mongo_filter().unwrap(),
            doc! { "$text": { "$search": "disk full" } }
        );

        let raw = QuerySpec::Raw(json!({"status": "active", "age": {"$gt": 30}}));
        let filter = raw.to_mongo_filter().unwrap();
        assert_eq!(filter.get_str("status").unwrap(), "active");
        assert!(filter.get_document("age").unwrap().contains_key("$gt"));
    }
}
