//! Schema inspection of a single lead document.
//!
//! [`classify`] decodes each interesting field of a sample document exactly
//! once into a tagged variant, so later consumers (the findings, the verdict,
//! the report) never look at raw JSON shapes again:
//!
//! | Field | Decoded as |
//! |-------|------------|
//! | `leadAnalysed` | [`LeadAnalysed`]: boolean, string-encoded (drift), missing, other |
//! | `output` | [`OutputShape`]: analysed, pending, malformed |
//! | `analysedAt` | [`AnalysedAt`]: timestamp, null, missing, unparsed |
//! | `messages` | [`MessagesSummary`]: length, first type, content preview |

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::{fields, type_tag, Document};

/// Maximum number of characters kept from the first message's content.
pub const PREVIEW_CHARS: usize = 80;

/// Decoded `leadAnalysed` flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LeadAnalysed {
    Boolean(bool),
    /// Stored as a string such as `"true"` instead of a boolean.
    StringEncoded(String),
    Missing,
    /// Any other runtime type: the stored value and its type tag.
    OtherType { tag: String, value: Value },
}

impl LeadAnalysed {
    pub fn decode(doc: &Document) -> Self {
        match doc.get(fields::LEAD_ANALYSED) {
            None => LeadAnalysed::Missing,
            Some(Value::Bool(b)) => LeadAnalysed::Boolean(*b),
            Some(Value::String(s)) => LeadAnalysed::StringEncoded(s.clone()),
            Some(other) => LeadAnalysed::OtherType {
                tag: type_tag(other).to_string(),
                value: other.clone(),
            },
        }
    }

    /// Runtime type tag of the stored value.
    pub fn type_tag(&self) -> &str {
        match self {
            LeadAnalysed::Boolean(_) => "bool",
            LeadAnalysed::StringEncoded(_) => "string",
            LeadAnalysed::Missing => "missing",
            LeadAnalysed::OtherType { tag, .. } => tag,
        }
    }

    /// Only a real boolean `true` counts as analysed.
    pub fn is_true(&self) -> bool {
        matches!(self, LeadAnalysed::Boolean(true))
    }

    pub fn is_drifted(&self) -> bool {
        matches!(self, LeadAnalysed::StringEncoded(_))
    }
}

/// Sub-fields extracted from an analysed `output` object. Each one is
/// individually optional.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutput {
    /// All keys present on the object.
    pub keys: Vec<String>,
    pub intent: Option<Value>,
    pub qualified: Option<Value>,
    pub confidence: Option<Value>,
    pub signals: Option<Value>,
    pub summary: Option<Value>,
}

impl AnalysisOutput {
    fn from_map(map: &serde_json::Map<String, Value>) -> Self {
        let get = |name: &str| map.get(name).cloned();
        Self {
            keys: map.keys().cloned().collect(),
            intent: get("intent"),
            qualified: get("qualified"),
            confidence: get("confidence"),
            signals: get("signals"),
            summary: get("summary"),
        }
    }

    /// `(name, value)` pairs for the five expected sub-fields, in schema order.
    pub fn subfields(&self) -> [(&'static str, Option<&Value>); 5] {
        [
            ("intent", self.intent.as_ref()),
            ("qualified", self.qualified.as_ref()),
            ("confidence", self.confidence.as_ref()),
            ("signals", self.signals.as_ref()),
            ("summary", self.summary.as_ref()),
        ]
    }

    pub fn missing_subfields(&self) -> Vec<&'static str> {
        self.subfields()
            .into_iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| name)
            .collect()
    }
}

/// Why an `output` is considered not yet analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    EmptySequence,
    EmptyObject,
    Absent,
}

/// Decoded `output` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OutputShape {
    /// Non-empty object.
    Analysed(AnalysisOutput),
    Pending(PendingReason),
    /// Anything else, carrying the raw type tag. A non-empty array lands
    /// here with tag `"array"`.
    Malformed(String),
}

/// Flat classification of `output`, as shown in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    ObjectWithSubfields,
    ObjectEmpty,
    EmptySequence,
    NonEmptySequence,
    OtherScalar,
    Absent,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::ObjectWithSubfields => "object-with-subfields",
            OutputKind::ObjectEmpty => "object-empty",
            OutputKind::EmptySequence => "empty-sequence",
            OutputKind::NonEmptySequence => "non-empty-sequence",
            OutputKind::OtherScalar => "other-scalar",
            OutputKind::Absent => "absent",
        }
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OutputShape {
    pub fn decode(doc: &Document) -> Self {
        let Some(value) = doc.get(fields::OUTPUT) else {
            return OutputShape::Pending(PendingReason::Absent);
        };
        match value {
            Value::Array(items) if items.is_empty() => {
                OutputShape::Pending(PendingReason::EmptySequence)
            }
            Value::Object(map) if map.is_empty() => {
                OutputShape::Pending(PendingReason::EmptyObject)
            }
            // Extended-JSON wrappers ($date, $oid, ...) are scalars in disguise.
            Value::Object(map) if type_tag(value) == "object" => {
                OutputShape::Analysed(AnalysisOutput::from_map(map))
            }
            other => OutputShape::Malformed(type_tag(other).to_string()),
        }
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            OutputShape::Analysed(_) => OutputKind::ObjectWithSubfields,
            OutputShape::Pending(PendingReason::EmptyObject) => OutputKind::ObjectEmpty,
            OutputShape::Pending(PendingReason::EmptySequence) => OutputKind::EmptySequence,
            OutputShape::Pending(PendingReason::Absent) => OutputKind::Absent,
            OutputShape::Malformed(tag) if tag == "array" => OutputKind::NonEmptySequence,
            OutputShape::Malformed(_) => OutputKind::OtherScalar,
        }
    }

    pub fn is_analysed(&self) -> bool {
        matches!(self, OutputShape::Analysed(_))
    }

    pub fn analysis(&self) -> Option<&AnalysisOutput> {
        match self {
            OutputShape::Analysed(a) => Some(a),
            _ => None,
        }
    }
}

/// Decoded `analysedAt` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnalysedAt {
    Timestamp(DateTime<Utc>),
    Null,
    Missing,
    /// Present but not a recognizable timestamp; carries the type tag.
    Unparsed(String),
}

impl AnalysedAt {
    pub fn decode(doc: &Document) -> Self {
        let Some(value) = doc.get(fields::ANALYSED_AT) else {
            return AnalysedAt::Missing;
        };
        match value {
            Value::Null => AnalysedAt::Null,
            Value::String(s) => parse_rfc3339(s)
                .map(AnalysedAt::Timestamp)
                .unwrap_or_else(|| AnalysedAt::Unparsed("string".to_string())),
            Value::Object(map) => map
                .get("$date")
                .and_then(parse_ext_date)
                .map(AnalysedAt::Timestamp)
                .unwrap_or_else(|| AnalysedAt::Unparsed(type_tag(value).to_string())),
            other => AnalysedAt::Unparsed(type_tag(other).to_string()),
        }
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Relaxed extended JSON: `{"$date": "<rfc3339>"}` in range, otherwise
/// `{"$date": {"$numberLong": "<millis>"}}`.
fn parse_ext_date(inner: &Value) -> Option<DateTime<Utc>> {
    match inner {
        Value::String(s) => parse_rfc3339(s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(m) => m
            .get("$numberLong")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Summary of the `messages` sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessagesSummary {
    /// Type tag of the stored field (`"missing"` when absent).
    pub type_tag: String,
    pub count: usize,
    pub first_type: Option<String>,
    /// First [`PREVIEW_CHARS`] characters of `messages[0].data.content`.
    pub first_preview: Option<String>,
    pub preview_truncated: bool,
}

impl MessagesSummary {
    pub fn decode(doc: &Document) -> Self {
        let Some(value) = doc.get(fields::MESSAGES) else {
            return Self {
                type_tag: "missing".to_string(),
                ..Self::default()
            };
        };
        let mut summary = Self {
            type_tag: type_tag(value).to_string(),
            ..Self::default()
        };
        let Value::Array(items) = value else {
            return summary;
        };
        summary.count = items.len();

        if let Some(first) = items.first() {
            summary.first_type = first.get("type").map(display_value);
            if let Some(Value::Object(data)) = first.get("data") {
                if let Some(content) = data.get("content") {
                    let text = display_value(content);
                    summary.preview_truncated = text.chars().count() > PREVIEW_CHARS;
                    summary.first_preview = Some(text.chars().take(PREVIEW_CHARS).collect());
                }
            }
        }
        summary
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Everything [`classify`] learned from one sample document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleReport {
    /// Present field names mapped to their runtime type tags.
    pub fields: BTreeMap<String, String>,
    pub session_id: Option<Value>,
    pub lead_analysed: LeadAnalysed,
    pub message_length: Option<Value>,
    pub analysed_at: AnalysedAt,
    pub output: OutputShape,
    pub messages: MessagesSummary,
}

impl SampleReport {
    /// `leadAnalysed` is boolean `true` but `output` carries no analysis.
    pub fn violates_invariant(&self) -> bool {
        self.lead_analysed.is_true() && !self.output.is_analysed()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

/// Classify a sample document against the expected lead document schema.
///
/// Never fails: missing or oddly typed fields are recorded, not rejected.
pub fn classify(doc: &Document) -> SampleReport {
    let field_types = doc
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), type_tag(v).to_string()))
                .collect()
        })
        .unwrap_or_default();

    SampleReport {
        fields: field_types,
        session_id: doc.get(fields::SESSION_ID).cloned(),
        lead_analysed: LeadAnalysed::decode(doc),
        message_length: doc.get(fields::MESSAGE_LENGTH).cloned(),
        analysed_at: AnalysedAt::decode(doc),
        output: OutputShape::decode(doc),
        messages: MessagesSummary::decode(doc),
    }
}
