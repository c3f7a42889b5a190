use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    #[error("field is not declared in the schema")]
    UnknownField,
    #[error("operator is not allowed for the field's type")]
    OperatorTypeMismatch,
    #[error("value has the wrong shape for this field and operator")]
    InvalidValueShape,
    #[error("value is outside the accepted range")]
    ValueOutOfRange,
}

/// One rejected condition. `index` is its position in the submitted list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Error)]
#[error("condition {index} on '{field}': {reason}")]
pub struct CompileError {
    pub index: usize,
    pub field: String,
    pub reason: ErrorKind,
}

impl CompileError {
    pub fn new(index: usize, field: impl Into<String>, reason: ErrorKind) -> Self {
        Self {
            index,
            field: field.into(),
            reason,
        }
    }
}
