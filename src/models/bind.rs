//! Bind value models.
//!
//! Binds are positional: the n-th value fills the n-th placeholder of the
//! statement. Only values travel as parameters; identifiers and predicate
//! text are part of the statement itself.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// Type of a value the database populates during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutKind {
    Integer,
    Float,
    Text,
    Timestamp,
}

impl OutKind {
    /// Get the type name of this output slot for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
        }
    }
}

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    /// Structured value, bound as the backend's JSON type (text on SQLite)
    Json(JsonValue),
    /// Output slot populated by the database. Only valid for stored procedures.
    Out(OutKind),
}

impl BindValue {
    /// Create an output slot marker.
    pub fn out(kind: OutKind) -> Self {
        Self::Out(kind)
    }

    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this is an output slot rather than an input value.
    pub fn is_out(&self) -> bool {
        matches!(self, Self::Out(_))
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Json(_) => "json",
            Self::Out(_) => "out",
        }
    }
}

impl From<bool> for BindValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for BindValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for BindValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for BindValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for BindValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Scalars map onto their natural bind type; arrays and objects stay JSON.
impl From<JsonValue> for BindValue {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            JsonValue::String(s) => Self::Text(s),
            other => Self::Json(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_value_types() {
        assert!(BindValue::Null.is_null());
        assert!(!BindValue::Bool(true).is_null());
        assert_eq!(BindValue::Int(42).type_name(), "int");
        assert_eq!(BindValue::from("hello").type_name(), "text");
        assert!(BindValue::out(OutKind::Integer).is_out());
        assert_eq!(OutKind::Timestamp.type_name(), "timestamp");
    }

    #[test]
    fn test_option_maps_none_to_null() {
        assert_eq!(BindValue::from(None::<i64>), BindValue::Null);
        assert_eq!(BindValue::from(Some(7i64)), BindValue::Int(7));
    }

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(BindValue::from(serde_json::json!(3)), BindValue::Int(3));
        assert_eq!(BindValue::from(serde_json::json!(2.5)), BindValue::Float(2.5));
        assert_eq!(
            BindValue::from(serde_json::json!("x")),
            BindValue::Text("x".to_string())
        );
        assert_eq!(BindValue::from(serde_json::json!(null)), BindValue::Null);
        assert!(matches!(
            BindValue::from(serde_json::json!({"a": 1})),
            BindValue::Json(_)
        ));
    }
}
