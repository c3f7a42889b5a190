use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use super::error::ErrorKind;
use crate::schema::FieldType;

/// A filter condition exactly as a client submitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFilterCondition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: JsonValue,
}

impl RawFilterCondition {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: JsonValue) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Number(f64),
    Bool(bool),
}

/// Largest integer magnitude an `f64` holds without rounding.
pub(crate) const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

impl Scalar {
    pub(crate) fn from_json(value: &JsonValue) -> Result<Self, ErrorKind> {
        match value {
            JsonValue::String(s) => Ok(Scalar::String(s.clone())),
            JsonValue::Number(n) => number_from_json(n).map(Scalar::Number),
            JsonValue::Bool(b) => Ok(Scalar::Bool(*b)),
            _ => Err(ErrorKind::InvalidValueShape),
        }
    }
}

/// Integers that would be rounded on conversion are refused rather than
/// silently changed.
fn number_from_json(n: &serde_json::Number) -> Result<f64, ErrorKind> {
    let magnitude = match (n.as_i64(), n.as_u64()) {
        (Some(i), _) => Some(i.unsigned_abs()),
        (None, Some(u)) => Some(u),
        (None, None) => None,
    };
    if magnitude.is_some_and(|m| m > MAX_SAFE_INTEGER) {
        return Err(ErrorKind::ValueOutOfRange);
    }
    n.as_f64().ok_or(ErrorKind::InvalidValueShape)
}

/// The value shapes a condition may carry. Null, objects and nested
/// arrays have no representation here.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl RawValue {
    pub fn from_json(value: &JsonValue) -> Result<Self, ErrorKind> {
        match value {
            JsonValue::Array(items) => items
                .iter()
                .map(Scalar::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(RawValue::List),
            other => Scalar::from_json(other).map(RawValue::Scalar),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    Contains,
    StartsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    Before,
    After,
    In,
    NotIn,
}

impl Operator {
    /// Matches a client token exactly; tokens are case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "equals" => Operator::Equals,
            "contains" => Operator::Contains,
            "startsWith" => Operator::StartsWith,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "between" => Operator::Between,
            "before" => Operator::Before,
            "after" => Operator::After,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            _ => return None,
        })
    }

    pub fn token(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Between => "between",
            Operator::Before => "before",
            Operator::After => "after",
            Operator::In => "in",
            Operator::NotIn => "notIn",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Number(f64),
    NumberRange(f64, f64),
    Date(DateTime<Utc>),
    DateRange(DateTime<Utc>, DateTime<Utc>),
    Boolean(bool),
    StringSet(Vec<String>),
}

/// A condition that passed validation against a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCondition {
    field: String,
    field_type: FieldType,
    operator: Operator,
    value: TypedValue,
}

impl ValidatedCondition {
    pub(crate) fn new(
        field: String,
        field_type: FieldType,
        operator: Operator,
        value: TypedValue,
    ) -> Self {
        Self {
            field,
            field_type,
            operator,
            value,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &TypedValue {
        &self.value
    }
}
