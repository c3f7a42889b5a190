//! Compiles untrusted filter conditions into a typed conjunctive query.
//!
//! A caller supplies a [`FieldSchema`] and a list of
//! [`RawFilterCondition`]s. [`compile`] validates each condition against the
//! field's type and returns either a [`CompiledQuery`] or every
//! [`CompileError`] found.

pub mod config;
pub mod filter;
pub mod records;
pub mod schema;

pub use filter::{compile, CompileError, CompiledQuery, Compiler, ErrorKind, RawFilterCondition};
pub use schema::{FieldSchema, FieldType};
