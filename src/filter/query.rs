use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value as JsonValue};
use std::cmp::Ordering;
use std::fmt;

use super::condition::{Operator, Scalar, TypedValue, ValidatedCondition, MAX_SAFE_INTEGER};
use super::validate::parse_date;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    String(String),
    Number(f64),
    Date(DateTime<Utc>),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Operand),
    Contains(String),
    StartsWith(String),
    Gt(Operand),
    Gte(Operand),
    Lt(Operand),
    Lte(Operand),
    Between(Operand, Operand),
    In(Vec<String>),
    NotIn(Vec<String>),
}

impl Predicate {
    /// Lowers a validated (operator, value) pair. `None` means the value does
    /// not fit the operator.
    pub(crate) fn lower(operator: Operator, value: &TypedValue) -> Option<Self> {
        let predicate = match (operator, value) {
            (Operator::Contains, TypedValue::String(s)) => Predicate::Contains(s.clone()),
            (Operator::StartsWith, TypedValue::String(s)) => Predicate::StartsWith(s.clone()),
            (Operator::Between, TypedValue::NumberRange(low, high)) => {
                Predicate::Between(Operand::Number(*low), Operand::Number(*high))
            }
            (Operator::Between, TypedValue::DateRange(start, end)) => {
                Predicate::Between(Operand::Date(*start), Operand::Date(*end))
            }
            (Operator::In, TypedValue::StringSet(values)) => Predicate::In(values.clone()),
            (Operator::NotIn, TypedValue::StringSet(values)) => Predicate::NotIn(values.clone()),
            (operator, value) => {
                let operand = match value {
                    TypedValue::String(s) => Operand::String(s.clone()),
                    TypedValue::Number(n) => Operand::Number(*n),
                    TypedValue::Date(d) => Operand::Date(*d),
                    TypedValue::Boolean(b) => Operand::Boolean(*b),
                    _ => return None,
                };
                match operator {
                    Operator::Equals => Predicate::Eq(operand),
                    Operator::Gt | Operator::After => Predicate::Gt(operand),
                    Operator::Gte => Predicate::Gte(operand),
                    Operator::Lt | Operator::Before => Predicate::Lt(operand),
                    Operator::Lte => Predicate::Lte(operand),
                    _ => return None,
                }
            }
        };
        Some(predicate)
    }

    pub fn comparator(&self) -> &'static str {
        match self {
            Predicate::Eq(_) => "=",
            Predicate::Contains(_) => "contains",
            Predicate::StartsWith(_) => "startsWith",
            Predicate::Gt(_) => ">",
            Predicate::Gte(_) => ">=",
            Predicate::Lt(_) => "<",
            Predicate::Lte(_) => "<=",
            Predicate::Between(_, _) => "between",
            Predicate::In(_) => "in",
            Predicate::NotIn(_) => "not in",
        }
    }
}

/// One `(field, comparator, operand)` term of a compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    field: String,
    predicate: Predicate,
}

impl Fragment {
    pub(crate) fn new(field: String, predicate: Predicate) -> Self {
        Self { field, predicate }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn to_document(&self) -> JsonValue {
        let condition = match &self.predicate {
            Predicate::Eq(v) => single("$eq", operand_json(v)),
            Predicate::Contains(s) => single("$regex", JsonValue::String(regex::escape(s))),
            Predicate::StartsWith(s) => {
                single("$regex", JsonValue::String(format!("^{}", regex::escape(s))))
            }
            Predicate::Gt(v) => single("$gt", operand_json(v)),
            Predicate::Gte(v) => single("$gte", operand_json(v)),
            Predicate::Lt(v) => single("$lt", operand_json(v)),
            Predicate::Lte(v) => single("$lte", operand_json(v)),
            Predicate::Between(low, high) => {
                json!({ "$gte": operand_json(low), "$lte": operand_json(high) })
            }
            Predicate::In(values) => json!({ "$in": values }),
            Predicate::NotIn(values) => json!({ "$nin": values }),
        };
        single(&self.field, condition)
    }

    pub fn matches(&self, record: &JsonValue) -> bool {
        let actual = record.get(&self.field).filter(|v| !v.is_null());

        match &self.predicate {
            Predicate::NotIn(values) => !actual.is_some_and(|v| contains_any(v, values)),
            Predicate::In(values) => actual.is_some_and(|v| contains_any(v, values)),
            Predicate::Contains(needle) => actual
                .and_then(JsonValue::as_str)
                .is_some_and(|s| s.contains(needle.as_str())),
            Predicate::StartsWith(prefix) => actual
                .and_then(JsonValue::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Predicate::Eq(v) => compare(actual, v) == Some(Ordering::Equal),
            Predicate::Gt(v) => compare(actual, v) == Some(Ordering::Greater),
            Predicate::Gte(v) => compare(actual, v).is_some_and(Ordering::is_ge),
            Predicate::Lt(v) => compare(actual, v) == Some(Ordering::Less),
            Predicate::Lte(v) => compare(actual, v).is_some_and(Ordering::is_le),
            Predicate::Between(low, high) => {
                compare(actual, low).is_some_and(Ordering::is_ge)
                    && compare(actual, high).is_some_and(Ordering::is_le)
            }
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let comparator = self.predicate.comparator();
        match &self.predicate {
            Predicate::Eq(v)
            | Predicate::Gt(v)
            | Predicate::Gte(v)
            | Predicate::Lt(v)
            | Predicate::Lte(v) => write!(f, "{} {} {}", self.field, comparator, v),
            Predicate::Contains(s) | Predicate::StartsWith(s) => {
                write!(f, "{} {} {:?}", self.field, comparator, s)
            }
            Predicate::Between(low, high) => {
                write!(f, "{} {} [{}, {}]", self.field, comparator, low, high)
            }
            Predicate::In(values) | Predicate::NotIn(values) => {
                write!(f, "{} {} {:?}", self.field, comparator, values)
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::String(s) => write!(f, "{:?}", s),
            Operand::Number(n) => write!(f, "{}", n),
            Operand::Date(d) => f.write_str(&format_date(d)),
            Operand::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Conjunction of fragments, one per validated condition. The empty query
/// matches every record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledQuery {
    conditions: Vec<ValidatedCondition>,
    fragments: Vec<Fragment>,
}

impl CompiledQuery {
    pub fn identity() -> Self {
        Self::default()
    }

    pub(crate) fn new(conditions: Vec<ValidatedCondition>, fragments: Vec<Fragment>) -> Self {
        Self {
            conditions,
            fragments,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn conditions(&self) -> &[ValidatedCondition] {
        &self.conditions
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Renders the query as a document-store filter. Text operands in
    /// `$regex` are escaped so they only ever match literally.
    pub fn to_document(&self) -> JsonValue {
        match self.fragments.as_slice() {
            [] => JsonValue::Object(Map::new()),
            [fragment] => fragment.to_document(),
            fragments => {
                let terms: Vec<JsonValue> = fragments.iter().map(Fragment::to_document).collect();
                single("$and", JsonValue::Array(terms))
            }
        }
    }

    pub fn matches(&self, record: &JsonValue) -> bool {
        self.fragments.iter().all(|f| f.matches(record))
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identity() {
            return f.write_str("TRUE");
        }
        for (i, fragment) in self.fragments.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{}", fragment)?;
        }
        Ok(())
    }
}

fn single(key: &str, value: JsonValue) -> JsonValue {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    JsonValue::Object(map)
}

fn format_date(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn operand_json(operand: &Operand) -> JsonValue {
    match operand {
        Operand::String(s) => JsonValue::String(s.clone()),
        Operand::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER as f64 => {
            JsonValue::from(*n as i64)
        }
        Operand::Number(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Operand::Date(d) => json!({ "$date": format_date(d) }),
        Operand::Boolean(b) => JsonValue::Bool(*b),
    }
}

fn contains_any(actual: &JsonValue, candidates: &[String]) -> bool {
    let is_candidate =
        |v: &JsonValue| v.as_str().is_some_and(|s| candidates.iter().any(|c| c == s));
    match actual.as_array() {
        Some(items) => items.iter().any(is_candidate),
        None => is_candidate(actual),
    }
}

fn compare(actual: Option<&JsonValue>, operand: &Operand) -> Option<Ordering> {
    let actual = actual?;
    match operand {
        Operand::String(s) => Some(actual.as_str()?.cmp(s.as_str())),
        Operand::Number(n) => actual.as_f64()?.partial_cmp(n),
        Operand::Boolean(b) => Some(actual.as_bool()?.cmp(b)),
        Operand::Date(d) => {
            let scalar = Scalar::from_json(actual).ok()?;
            Some(parse_date(&scalar).ok()?.cmp(d))
        }
    }
}
