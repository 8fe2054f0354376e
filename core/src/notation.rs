//! Query notation parsing contract.
//!
//! A notation parser turns a flat request payload (typically a query string
//! already validated into a model) into filter, ordering and pagination
//! clauses for a query message. The clause language itself belongs to the
//! application; this module only fixes the seam and ships
//! [`TypedNotation`], a parser that coerces typed fields and passes the
//! rest through.

use crate::cast::{CastError, ScalarType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Type a query field is filtered as.
pub type FilterType = ScalarType;

/// Field name → declared filter type.
pub type TypesMap = BTreeMap<String, FilterType>;

/// Per-field filter metadata declared by a query model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterParam {
    /// Model field the filter applies to.
    pub field: String,
    /// Type the field's values are filtered as.
    pub filter_type: FilterType,
}

impl FilterParam {
    /// Declare `field` as a filter of type `filter_type`.
    #[must_use]
    pub fn new(field: impl Into<String>, filter_type: FilterType) -> Self {
        Self {
            field: field.into(),
            filter_type,
        }
    }
}

/// Errors raised while parsing a query payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotationError {
    /// A typed field did not hold a value of its type.
    #[error("invalid value for '{field}': {source}")]
    InvalidValue {
        /// Offending field.
        field: String,
        /// Underlying cast failure.
        #[source]
        source: CastError,
    },

    /// The payload does not follow the notation.
    #[error("malformed notation: {0}")]
    Malformed(String),
}

/// Translates a flat payload into `(field, clause)` pairs.
pub trait NotationParser: Send + Sync {
    /// Parse `payload` using the declared field types.
    ///
    /// Fields absent from `types` are passed through untyped.
    ///
    /// # Errors
    ///
    /// Returns [`NotationError`] when the payload cannot be parsed.
    fn parse(
        &self,
        payload: Map<String, Value>,
        types: &TypesMap,
    ) -> Result<Vec<(String, Value)>, NotationError>;
}

impl<F> NotationParser for F
where
    F: Fn(Map<String, Value>, &TypesMap) -> Result<Vec<(String, Value)>, NotationError>
        + Send
        + Sync,
{
    fn parse(
        &self,
        payload: Map<String, Value>,
        types: &TypesMap,
    ) -> Result<Vec<(String, Value)>, NotationError> {
        self(payload, types)
    }
}

/// Minimal parser: casts typed fields, keeps the others verbatim.
///
/// Clauses are flat: a field holding a nested object is malformed.
///
/// # Example
///
/// ```
/// use cqea_core::{NotationParser, ScalarType, TypedNotation, TypesMap};
/// use serde_json::json;
///
/// let mut types = TypesMap::new();
/// types.insert("age".into(), ScalarType::Integer);
///
/// let payload = json!({"age": "30", "name": "ada"});
/// let clauses = TypedNotation
///     .parse(payload.as_object().unwrap().clone(), &types)
///     .unwrap();
///
/// assert_eq!(clauses, vec![("age".into(), json!(30)), ("name".into(), json!("ada"))]);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct TypedNotation;

impl NotationParser for TypedNotation {
    fn parse(
        &self,
        payload: Map<String, Value>,
        types: &TypesMap,
    ) -> Result<Vec<(String, Value)>, NotationError> {
        payload
            .into_iter()
            .map(|(field, value)| match types.get(&field) {
                _ if value.is_object() => Err(NotationError::Malformed(format!(
                    "'{field}' holds a nested object"
                ))),
                Some(scalar) => match scalar.cast(&value) {
                    Ok(value) => Ok((field, value)),
                    Err(source) => Err(NotationError::InvalidValue { field, source }),
                },
                None => Ok((field, value)),
            })
            .collect()
    }
}
