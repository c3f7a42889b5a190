pub mod compile;
pub mod condition;
pub mod error;
pub mod parser;
pub mod query;
pub mod validate;

pub use compile::{compile, Compiler};
pub use condition::{Operator, RawFilterCondition, RawValue, Scalar, TypedValue, ValidatedCondition};
pub use error::{CompileError, ErrorKind};
pub use parser::{parse, ParseError};
pub use query::{CompiledQuery, Fragment, Operand, Predicate};
pub use validate::{validator_for, OperatorMatrix, TypeValidator, UnsupportedOperator};
