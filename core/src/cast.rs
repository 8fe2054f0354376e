//! Typed coercion of loosely typed request values.
//!
//! HTTP path segments and query strings arrive as text. Request adapters use
//! [`ScalarType`] to turn `"42"` into `42` before a message is built.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use thiserror::Error;

/// A value could not be coerced to the requested scalar type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot cast {value} to {target}")]
pub struct CastError {
    /// Rendered input value.
    pub value: String,
    /// Requested type.
    pub target: ScalarType,
}

/// Scalar types a request value can be cast to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// UTF-8 text.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// `true` / `false`.
    Boolean,
}

impl ScalarType {
    /// Lowercase name used in API documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
        }
    }

    /// Cast `value` to this type.
    ///
    /// `null` passes through untouched. Arrays are cast element-wise.
    ///
    /// # Errors
    ///
    /// Returns [`CastError`] when the value cannot represent this type.
    ///
    /// # Example
    ///
    /// ```
    /// use cqea_core::ScalarType;
    /// use serde_json::json;
    ///
    /// assert_eq!(ScalarType::Integer.cast(&json!("42")).unwrap(), json!(42));
    /// assert_eq!(ScalarType::Boolean.cast(&json!("yes")).unwrap(), json!(true));
    /// assert!(ScalarType::Integer.cast(&json!("forty-two")).is_err());
    /// ```
    pub fn cast(self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Array(items) => items
                .iter()
                .map(|item| self.cast(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => self.cast_scalar(value).ok_or_else(|| CastError {
                value: value.to_string(),
                target: self,
            }),
        }
    }

    fn cast_scalar(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::String, Value::String(_)) => Some(value.clone()),
            (Self::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (Self::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

            (Self::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
            (Self::Integer, Value::Number(n)) => n
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .and_then(|f| format!("{f:.0}").parse::<i64>().ok())
                .map(Value::from),
            (Self::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),

            (Self::Float, Value::Number(n)) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
            (Self::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),

            (Self::Boolean, Value::Bool(_)) => Some(value.clone()),
            (Self::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
                _ => None,
            },

            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_from_string() {
        assert_eq!(ScalarType::Integer.cast(&json!("42")).unwrap(), json!(42));
        assert_eq!(ScalarType::Integer.cast(&json!(" -7 ")).unwrap(), json!(-7));
    }

    #[test]
    fn test_integer_from_integral_float() {
        assert_eq!(ScalarType::Integer.cast(&json!(3.0)).unwrap(), json!(3));
        assert!(ScalarType::Integer.cast(&json!(3.5)).is_err());
    }

    #[test]
    fn test_float_from_string() {
        assert_eq!(ScalarType::Float.cast(&json!("1.5")).unwrap(), json!(1.5));
    }

    #[test]
    fn test_string_from_number() {
        assert_eq!(ScalarType::String.cast(&json!(10)).unwrap(), json!("10"));
    }

    #[test]
    fn test_boolean_variants() {
        assert_eq!(ScalarType::Boolean.cast(&json!("TRUE")).unwrap(), json!(true));
        assert_eq!(ScalarType::Boolean.cast(&json!("0")).unwrap(), json!(false));
        assert!(ScalarType::Boolean.cast(&json!("maybe")).is_err());
    }

    #[test]
    fn test_null_and_arrays() {
        assert_eq!(ScalarType::Integer.cast(&Value::Null).unwrap(), Value::Null);
        assert_eq!(
            ScalarType::Integer.cast(&json!(["1", "2"])).unwrap(),
            json!([1, 2])
        );
    }

    #[test]
    fn test_cast_error_message() {
        let err = ScalarType::Integer.cast(&json!("abc")).unwrap_err();
        assert_eq!(err.to_string(), "cannot cast \"abc\" to integer");
    }

    #[test]
    fn test_objects_are_rejected() {
        assert!(ScalarType::String.cast(&json!({"a": 1})).is_err());
    }
}
