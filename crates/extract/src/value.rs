use serde::Serialize;
use serde_json::Value as Json;

/// A tagged union over the closed [`schema::FieldType`] set.
///
/// Extraction, transformation, and type coercion all operate on this type;
/// only the final record (a name → `FieldValue` map) crosses into the
/// result envelope as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<FieldValue>),
    Json(Json),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// The string representation used as input to every string-oriented
    /// transform, mirroring Python's implicit `str(value)` coercion.
    pub fn to_display_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{:.1}", f)
                } else {
                    f.to_string()
                }
            }
            FieldValue::String(s) => s.clone(),
            FieldValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(FieldValue::to_display_string).collect();
                format!("[{}]", rendered.join(", "))
            }
            FieldValue::Json(v) => v.to_string(),
        }
    }

    /// Whether this value is "falsy" in the sense the reference
    /// implementation uses when deciding whether to run `validation_regex`
    /// at all (`if field.validation_regex and value:`).
    pub fn is_falsy(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Bool(b) => !b,
            FieldValue::Integer(i) => *i == 0,
            FieldValue::Float(f) => *f == 0.0,
            FieldValue::String(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Json(v) => v.is_null(),
        }
    }
}

impl From<Json> for FieldValue {
    fn from(value: Json) -> Self {
        match value {
            Json::Null => FieldValue::Null,
            Json::Bool(b) => FieldValue::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => FieldValue::String(s),
            other => FieldValue::Json(other),
        }
    }
}

impl From<&Json> for FieldValue {
    fn from(value: &Json) -> Self {
        FieldValue::from(value.clone())
    }
}

/// An ordered field-name → value map: one extracted record.
pub type Record = indexmap::IndexMap<String, FieldValue>;
