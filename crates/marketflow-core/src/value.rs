//! Scalar values and column types

use serde::{Deserialize, Serialize};

/// Declared type of a table column
///
/// Warehouse adapters map these to their own SQL types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Text/varchar
    Text,

    /// 64-bit signed integer
    Integer,

    /// Double precision floating point
    Float,

    /// Boolean
    Boolean,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

/// A single cell value inside a record batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// Convert a JSON value into a scalar
    ///
    /// Arrays and objects are not scalars and yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }

    /// Coerce this value into the representation expected by a column type
    ///
    /// Null is accepted by every column type. Integers widen into float
    /// columns, integral floats narrow into integer columns. Anything else
    /// is a mismatch and returns `None`.
    pub fn coerce_to(&self, column_type: ColumnType) -> Option<ScalarValue> {
        match (self, column_type) {
            (Self::Null, _) => Some(Self::Null),
            (Self::Text(_), ColumnType::Text) => Some(self.clone()),
            (Self::Bool(_), ColumnType::Boolean) => Some(self.clone()),
            (Self::Int(_), ColumnType::Integer) => Some(self.clone()),
            (Self::Float(_), ColumnType::Float) => Some(self.clone()),
            (Self::Int(i), ColumnType::Float) => Some(Self::Float(*i as f64)),
            (Self::Float(f), ColumnType::Integer) if f.fract() == 0.0 && f.is_finite() => {
                Some(Self::Int(*f as i64))
            }
            _ => None,
        }
    }

    /// Stable textual key used to compare primary-key values
    pub(crate) fn key_repr(&self) -> String {
        match self {
            Self::Null => "n:".to_string(),
            Self::Bool(b) => format!("b:{}", b),
            Self::Int(i) => format!("i:{}", i),
            Self::Float(f) => format!("f:{}", f.to_bits()),
            Self::Text(s) => format!("t:{}", s),
        }
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_conversion() {
        assert_eq!(ScalarValue::from_json(&serde_json::json!(1)), Some(ScalarValue::Int(1)));
        assert_eq!(ScalarValue::from_json(&serde_json::json!(1.08)), Some(ScalarValue::Float(1.08)));
        assert_eq!(ScalarValue::from_json(&serde_json::json!("EUR")), Some(ScalarValue::from("EUR")));
        assert_eq!(ScalarValue::from_json(&serde_json::json!(null)), Some(ScalarValue::Null));
        assert_eq!(ScalarValue::from_json(&serde_json::json!([1, 2])), None);
    }

    #[test]
    fn coercion_rules() {
        assert_eq!(ScalarValue::Int(3).coerce_to(ColumnType::Float), Some(ScalarValue::Float(3.0)));
        assert_eq!(ScalarValue::Float(4.0).coerce_to(ColumnType::Integer), Some(ScalarValue::Int(4)));
        assert_eq!(ScalarValue::Float(4.5).coerce_to(ColumnType::Integer), None);
        assert_eq!(ScalarValue::Null.coerce_to(ColumnType::Boolean), Some(ScalarValue::Null));
        assert_eq!(ScalarValue::from("x").coerce_to(ColumnType::Float), None);
    }

    #[test]
    fn untagged_serde() {
        let values: Vec<ScalarValue> = serde_json::from_str(r#"[null, true, 7, 2.5, "a"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ScalarValue::Null,
                ScalarValue::Bool(true),
                ScalarValue::Int(7),
                ScalarValue::Float(2.5),
                ScalarValue::from("a"),
            ]
        );
    }

    #[test]
    fn option_conversion() {
        assert_eq!(ScalarValue::from(None::<f64>), ScalarValue::Null);
        assert_eq!(ScalarValue::from(Some(2i64)), ScalarValue::Int(2));
    }
}
