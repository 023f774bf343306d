//! Field lists, rows, and the projection from documents to rows

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::backend::RawDocument;

/// Ordered, immutable list of exported field names
///
/// Cloning shares the underlying list, so every stage of a run sees the same
/// columns in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldList(Arc<[String]>);

impl FieldList {
    pub fn new(fields: Vec<String>) -> Self {
        Self(fields.into())
    }

    /// Parse a comma separated list, ignoring blank entries
    pub fn parse(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One output record; always holds exactly one value per field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row(Vec<String>);

impl Row {
    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Projects decoded documents onto a [`FieldList`]
#[derive(Debug, Clone)]
pub struct Projector {
    fields: FieldList,
    placeholder: String,
}

impl Projector {
    /// # Arguments
    /// * `fields` - Columns to produce
    /// * `placeholder` - Text for fields a document lacks (or holds null for)
    pub fn new(fields: FieldList, placeholder: impl Into<String>) -> Self {
        Self {
            fields,
            placeholder: placeholder.into(),
        }
    }

    /// Decode a raw document and project it
    ///
    /// Every call decodes into a new map, so nothing from one document can
    /// show up in the row of the next.
    pub fn project_raw(&self, raw: &RawDocument) -> Result<Row, serde_json::Error> {
        let document: Map<String, Value> = serde_json::from_str(raw.as_str())?;
        Ok(self.project(&document))
    }

    /// Project a decoded document
    pub fn project(&self, document: &Map<String, Value>) -> Row {
        Row(self
            .fields
            .names()
            .iter()
            .map(|field| self.render(lookup(document, field)))
            .collect())
    }

    fn render(&self, value: Option<&Value>) -> String {
        match value {
            None | Some(Value::Null) => self.placeholder.clone(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(nested) => nested.to_string(),
        }
    }
}

/// Find a field by exact key, then as a dotted path through nested objects
fn lookup<'a>(document: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    if let Some(value) = document.get(field) {
        return Some(value);
    }

    let mut path = field.split('.');
    let first = document.get(path.next()?)?;
    path.try_fold(first, |value, key| value.as_object()?.get(key))
}
