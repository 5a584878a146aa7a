//! Core data types shared by the store, the inspector, and the pipeline.
//!
//! Documents travel through the core as [`serde_json::Value`] objects in
//! relaxed extended-JSON form, so store adapters only need to convert their
//! native document type once at the boundary.

use serde::Serialize;
use serde_json::Value;

/// A document as seen by the core: a JSON object, possibly carrying
/// extended-JSON wrappers such as `{"$date": ...}` or `{"$oid": ...}`.
pub type Document = Value;

/// Field names of the lead document schema under inspection.
pub mod fields {
    pub const ID: &str = "_id";
    pub const SESSION_ID: &str = "sessionId";
    pub const LEAD_ANALYSED: &str = "leadAnalysed";
    pub const MESSAGE_LENGTH: &str = "messageLength";
    pub const ANALYSED_AT: &str = "analysedAt";
    pub const OUTPUT: &str = "output";
    pub const MESSAGES: &str = "messages";

    /// Sub-fields expected inside an analysed `output` object.
    pub const OUTPUT_SUBFIELDS: [&str; 5] = ["intent", "qualified", "confidence", "signals", "summary"];
}

/// Query filter understood by every [`StoreHandle`](crate::store::StoreHandle).
///
/// Equality is exact and type-sensitive: `Eq("leadAnalysed", true)` does not
/// match a document whose `leadAnalysed` is the string `"true"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    /// Matches every document.
    All,
    /// Matches documents whose top-level `field` equals `value`.
    Eq { field: String, value: Value },
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    /// Evaluate the filter against a document held in memory.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { field, value } => doc.get(field) == Some(value),
        }
    }
}

/// Runtime type tag of a JSON value, aware of the extended-JSON wrappers
/// that store adapters emit for dates and object ids.
pub fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(map) => {
            if map.len() == 1 {
                if map.contains_key("$date") {
                    return "datetime";
                }
                if map.contains_key("$oid") {
                    return "objectId";
                }
                if map.contains_key("$numberLong") {
                    return "int";
                }
                if map.contains_key("$numberDecimal") {
                    return "decimal";
                }
            }
            "object"
        }
    }
}
