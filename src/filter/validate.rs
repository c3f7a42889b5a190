//! Per-type validation: which operators a field type accepts and how raw
//! client values are coerced into typed operands.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use super::condition::{Operator, RawValue, Scalar, TypedValue};
use super::error::ErrorKind;
use crate::schema::FieldType;

pub trait TypeValidator: Sync {
    fn field_type(&self) -> FieldType;

    /// Every operator this type can be compiled with.
    fn legal_operators(&self) -> &'static [Operator];

    fn coerce(&self, raw: &RawValue, operator: Operator) -> Result<TypedValue, ErrorKind>;
}

pub struct StringValidator;
pub struct NumberValidator;
pub struct DateValidator;
pub struct BooleanValidator;
pub struct MultiValuedValidator;

pub fn validator_for(field_type: FieldType) -> &'static dyn TypeValidator {
    match field_type {
        FieldType::String => &StringValidator,
        FieldType::Number => &NumberValidator,
        FieldType::Date => &DateValidator,
        FieldType::Boolean => &BooleanValidator,
        FieldType::MultiValued => &MultiValuedValidator,
    }
}

impl TypeValidator for StringValidator {
    fn field_type(&self) -> FieldType {
        FieldType::String
    }

    fn legal_operators(&self) -> &'static [Operator] {
        &[Operator::Equals, Operator::Contains, Operator::StartsWith]
    }

    fn coerce(&self, raw: &RawValue, operator: Operator) -> Result<TypedValue, ErrorKind> {
        match operator {
            Operator::Equals | Operator::Contains | Operator::StartsWith => {
                expect_string(raw).map(TypedValue::String)
            }
            _ => Err(ErrorKind::OperatorTypeMismatch),
        }
    }
}

impl TypeValidator for NumberValidator {
    fn field_type(&self) -> FieldType {
        FieldType::Number
    }

    fn legal_operators(&self) -> &'static [Operator] {
        &[
            Operator::Equals,
            Operator::Gt,
            Operator::Gte,
            Operator::Lt,
            Operator::Lte,
            Operator::Between,
        ]
    }

    fn coerce(&self, raw: &RawValue, operator: Operator) -> Result<TypedValue, ErrorKind> {
        match operator {
            Operator::Equals | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                match raw {
                    RawValue::Scalar(Scalar::Number(n)) => Ok(TypedValue::Number(*n)),
                    _ => Err(ErrorKind::InvalidValueShape),
                }
            }
            Operator::Between => {
                let (low, high) = match expect_pair(raw)? {
                    (Scalar::Number(low), Scalar::Number(high)) => (*low, *high),
                    _ => return Err(ErrorKind::InvalidValueShape),
                };
                if low > high {
                    return Err(ErrorKind::ValueOutOfRange);
                }
                Ok(TypedValue::NumberRange(low, high))
            }
            _ => Err(ErrorKind::OperatorTypeMismatch),
        }
    }
}

impl TypeValidator for DateValidator {
    fn field_type(&self) -> FieldType {
        FieldType::Date
    }

    fn legal_operators(&self) -> &'static [Operator] {
        &[
            Operator::Equals,
            Operator::Before,
            Operator::After,
            Operator::Between,
        ]
    }

    fn coerce(&self, raw: &RawValue, operator: Operator) -> Result<TypedValue, ErrorKind> {
        match operator {
            Operator::Equals | Operator::Before | Operator::After => match raw {
                RawValue::Scalar(scalar) => parse_date(scalar).map(TypedValue::Date),
                RawValue::List(_) => Err(ErrorKind::InvalidValueShape),
            },
            Operator::Between => {
                let (start, end) = expect_pair(raw)?;
                let start = parse_date(start)?;
                let end = parse_date(end)?;
                if start > end {
                    return Err(ErrorKind::ValueOutOfRange);
                }
                Ok(TypedValue::DateRange(start, end))
            }
            _ => Err(ErrorKind::OperatorTypeMismatch),
        }
    }
}

impl TypeValidator for BooleanValidator {
    fn field_type(&self) -> FieldType {
        FieldType::Boolean
    }

    fn legal_operators(&self) -> &'static [Operator] {
        &[Operator::Equals]
    }

    fn coerce(&self, raw: &RawValue, operator: Operator) -> Result<TypedValue, ErrorKind> {
        match operator {
            Operator::Equals => match raw {
                RawValue::Scalar(Scalar::Bool(b)) => Ok(TypedValue::Boolean(*b)),
                _ => Err(ErrorKind::InvalidValueShape),
            },
            _ => Err(ErrorKind::OperatorTypeMismatch),
        }
    }
}

impl TypeValidator for MultiValuedValidator {
    fn field_type(&self) -> FieldType {
        FieldType::MultiValued
    }

    fn legal_operators(&self) -> &'static [Operator] {
        &[Operator::In, Operator::NotIn]
    }

    fn coerce(&self, raw: &RawValue, operator: Operator) -> Result<TypedValue, ErrorKind> {
        match operator {
            Operator::In | Operator::NotIn => {
                let RawValue::List(items) = raw else {
                    return Err(ErrorKind::InvalidValueShape);
                };
                if items.is_empty() {
                    return Err(ErrorKind::InvalidValueShape);
                }
                items
                    .iter()
                    .map(|item| match item {
                        Scalar::String(s) => Ok(s.clone()),
                        _ => Err(ErrorKind::InvalidValueShape),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(TypedValue::StringSet)
            }
            _ => Err(ErrorKind::OperatorTypeMismatch),
        }
    }
}

fn expect_string(raw: &RawValue) -> Result<String, ErrorKind> {
    match raw {
        RawValue::Scalar(Scalar::String(s)) => Ok(s.clone()),
        _ => Err(ErrorKind::InvalidValueShape),
    }
}

fn expect_pair(raw: &RawValue) -> Result<(&Scalar, &Scalar), ErrorKind> {
    match raw {
        RawValue::List(items) => match items.as_slice() {
            [first, second] => Ok((first, second)),
            _ => Err(ErrorKind::InvalidValueShape),
        },
        RawValue::Scalar(_) => Err(ErrorKind::InvalidValueShape),
    }
}

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Strings are RFC 3339, a naive date-time (read as UTC) or a bare
/// `YYYY-MM-DD` (midnight UTC). Numbers are Unix epoch milliseconds.
pub(crate) fn parse_date(scalar: &Scalar) -> Result<DateTime<Utc>, ErrorKind> {
    match scalar {
        Scalar::String(s) => parse_date_str(s.trim()).ok_or(ErrorKind::InvalidValueShape),
        Scalar::Number(ms) => {
            if !ms.is_finite() || ms.fract() != 0.0 {
                return Err(ErrorKind::InvalidValueShape);
            }
            Utc.timestamp_millis_opt(*ms as i64)
                .single()
                .ok_or(ErrorKind::ValueOutOfRange)
        }
        Scalar::Bool(_) => Err(ErrorKind::InvalidValueShape),
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operator '{operator}' is not supported for {field_type} fields")]
pub struct UnsupportedOperator {
    pub field_type: FieldType,
    pub operator: Operator,
}

/// The operators each field type may be used with. Starts as every legal
/// operator per type and can only be narrowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorMatrix {
    allowed: BTreeMap<FieldType, BTreeSet<Operator>>,
}

impl Default for OperatorMatrix {
    fn default() -> Self {
        let allowed = FieldType::ALL
            .into_iter()
            .map(|ty| {
                let ops: BTreeSet<Operator> =
                    validator_for(ty).legal_operators().iter().copied().collect();
                (ty, ops)
            })
            .collect();
        Self { allowed }
    }
}

impl OperatorMatrix {
    pub fn allows(&self, field_type: FieldType, operator: Operator) -> bool {
        self.allowed
            .get(&field_type)
            .is_some_and(|ops| ops.contains(&operator))
    }

    pub fn operators(&self, field_type: FieldType) -> impl Iterator<Item = Operator> + '_ {
        self.allowed.get(&field_type).into_iter().flatten().copied()
    }

    pub fn restrict<I>(
        mut self,
        field_type: FieldType,
        operators: I,
    ) -> Result<Self, UnsupportedOperator>
    where
        I: IntoIterator<Item = Operator>,
    {
        let legal = validator_for(field_type).legal_operators();
        let mut ops = BTreeSet::new();
        for operator in operators {
            if !legal.contains(&operator) {
                return Err(UnsupportedOperator {
                    field_type,
                    operator,
                });
            }
            ops.insert(operator);
        }
        self.allowed.insert(field_type, ops);
        Ok(self)
    }
}
