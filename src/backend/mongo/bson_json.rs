//! BSON to JSON conversion for exported documents
//!
//! Values are mapped to the JSON a CSV reader expects to see, not to
//! extended JSON: ObjectIds become their hex string, dates RFC 3339 strings,
//! binary data base64.

use base64::Engine;
use bson::{Binary, Bson, DateTime, Document};
use serde_json::{Map, Number, Value};

/// Convert a BSON document into a JSON object
pub fn document_to_json(doc: &Document) -> Map<String, Value> {
    doc.iter()
        .map(|(key, value)| (key.clone(), bson_to_json(value)))
        .collect()
}

/// Convert a single BSON value
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::String(s) => Value::String(s.clone()),
        Bson::Int32(n) => Value::Number((*n).into()),
        Bson::Int64(n) => Value::Number((*n).into()),
        Bson::Double(f) => Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(datetime_to_iso_string(dt)),
        Bson::Decimal128(d) => Value::String(d.to_string()),
        Bson::Array(arr) => Value::Array(arr.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(document_to_json(doc)),
        Bson::Binary(bin) => Value::String(binary_to_base64(bin)),
        Bson::RegularExpression(regex) => {
            Value::String(format!("/{}/{}", regex.pattern, regex.options))
        }
        Bson::Timestamp(ts) => Value::String(format!("Timestamp({}, {})", ts.time, ts.increment)),
        Bson::Symbol(s) => Value::String(s.clone()),
        Bson::JavaScriptCode(code) => Value::String(code.clone()),
        Bson::MinKey => Value::String("MinKey".to_string()),
        Bson::MaxKey => Value::String("MaxKey".to_string()),
        other => Value::String(format!("{other:?}")),
    }
}

fn datetime_to_iso_string(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string()
        .unwrap_or_else(|_| dt.timestamp_millis().to_string())
}

fn binary_to_base64(bin: &Binary) -> String {
    base64::engine::general_purpose::STANDARD.encode(&bin.bytes)
}
