use super::condition::{Operator, RawFilterCondition, RawValue, ValidatedCondition};
use super::error::{CompileError, ErrorKind};
use super::query::{CompiledQuery, Fragment, Predicate};
use super::validate::{validator_for, OperatorMatrix};
use crate::schema::FieldSchema;

/// Compiles with every operator each field type supports.
pub fn compile(
    conditions: &[RawFilterCondition],
    schema: &FieldSchema,
) -> Result<CompiledQuery, Vec<CompileError>> {
    Compiler::default().compile(conditions, schema)
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    operators: OperatorMatrix,
}

impl Compiler {
    pub fn new(operators: OperatorMatrix) -> Self {
        Self { operators }
    }

    pub fn operators(&self) -> &OperatorMatrix {
        &self.operators
    }

    /// Validates every condition and returns either the conjunction of all
    /// of them or every error found. A partial query is never returned.
    pub fn compile(
        &self,
        conditions: &[RawFilterCondition],
        schema: &FieldSchema,
    ) -> Result<CompiledQuery, Vec<CompileError>> {
        let mut validated = Vec::with_capacity(conditions.len());
        let mut fragments = Vec::with_capacity(conditions.len());
        let mut errors = Vec::new();

        for (index, condition) in conditions.iter().enumerate() {
            match self.compile_condition(condition, schema) {
                Ok((cond, fragment)) => {
                    validated.push(cond);
                    fragments.push(fragment);
                }
                Err(reason) => errors.push(CompileError::new(index, &condition.field, reason)),
            }
        }

        if errors.is_empty() {
            Ok(CompiledQuery::new(validated, fragments))
        } else {
            Err(errors)
        }
    }

    fn compile_condition(
        &self,
        condition: &RawFilterCondition,
        schema: &FieldSchema,
    ) -> Result<(ValidatedCondition, Fragment), ErrorKind> {
        let field_type = schema
            .type_of(&condition.field)
            .ok_or(ErrorKind::UnknownField)?;

        let operator = Operator::from_token(&condition.operator)
            .filter(|op| self.operators.allows(field_type, *op))
            .ok_or(ErrorKind::OperatorTypeMismatch)?;

        let raw = RawValue::from_json(&condition.value)?;
        let value = validator_for(field_type).coerce(&raw, operator)?;
        let predicate = Predicate::lower(operator, &value).ok_or(ErrorKind::InvalidValueShape)?;

        let cond = ValidatedCondition::new(condition.field.clone(), field_type, operator, value);
        let fragment = Fragment::new(condition.field.clone(), predicate);
        Ok((cond, fragment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::condition::TypedValue;
    use crate::schema::FieldType;
    use serde_json::json;

    fn schema() -> FieldSchema {
        FieldSchema::new([
            ("name", FieldType::MultiValued),
            ("email", FieldType::String),
            ("dateOfBirth", FieldType::Date),
            ("score", FieldType::Number),
            ("isPriority", FieldType::Boolean),
        ])
    }

    fn cond(field: &str, operator: &str, value: serde_json::Value) -> RawFilterCondition {
        RawFilterCondition::new(field, operator, value)
    }

    fn reasons(errors: &[CompileError]) -> Vec<(usize, &str, ErrorKind)> {
        errors
            .iter()
            .map(|e| (e.index, e.field.as_str(), e.reason))
            .collect()
    }

    #[test]
    fn test_validated_condition_fields() {
        let query = compile(&[cond("score", "between", json!([5, 10]))], &schema()).unwrap();
        let validated = &query.conditions()[0];
        assert_eq!(validated.field(), "score");
        assert_eq!(validated.field_type(), FieldType::Number);
        assert_eq!(validated.operator(), Operator::Between);
        assert_eq!(validated.value(), &TypedValue::NumberRange(5.0, 10.0));
    }

    #[test]
    fn test_unknown_field_skips_validation() {
        let errors = compile(&[cond("ssn", "contains", json!(null))], &schema()).unwrap_err();
        assert_eq!(reasons(&errors), vec![(0, "ssn", ErrorKind::UnknownField)]);
    }

    #[test]
    fn test_operator_checked_before_value() {
        let errors = compile(&[cond("score", "contains", json!(null))], &schema()).unwrap_err();
        assert_eq!(reasons(&errors), vec![(0, "score", ErrorKind::OperatorTypeMismatch)]);
    }

    #[test]
    fn test_unrecognized_operator_token() {
        let errors = compile(&[cond("email", "$where", json!("1"))], &schema()).unwrap_err();
        assert_eq!(reasons(&errors), vec![(0, "email", ErrorKind::OperatorTypeMismatch)]);
    }

    #[test]
    fn test_value_shape_failures() {
        let errors = compile(
            &[
                cond("email", "equals", json!({"$ne": ""})),
                cond("score", "gt", json!(null)),
                cond("name", "in", json!([])),
            ],
            &schema(),
        )
        .unwrap_err();
        assert_eq!(
            reasons(&errors),
            vec![
                (0, "email", ErrorKind::InvalidValueShape),
                (1, "score", ErrorKind::InvalidValueShape),
                (2, "name", ErrorKind::InvalidValueShape),
            ]
        );
    }

    #[test]
    fn test_unrepresentable_integer_is_out_of_range() {
        let errors = compile(
            &[cond("score", "equals", json!(9_007_199_254_740_993u64))],
            &schema(),
        )
        .unwrap_err();
        assert_eq!(reasons(&errors), vec![(0, "score", ErrorKind::ValueOutOfRange)]);

        let query = compile(
            &[cond("score", "equals", json!(9_007_199_254_740_991u64))],
            &schema(),
        )
        .unwrap();
        assert_eq!(
            query.to_document(),
            json!({"score": {"$eq": 9_007_199_254_740_991u64}})
        );
    }

    #[test]
    fn test_errors_do_not_short_circuit() {
        let conditions = [
            cond("email", "equals", json!("a@b.c")),
            cond("ssn", "equals", json!("123")),
            cond("score", "gte", json!(50)),
            cond("isPriority", "equals", json!("yes")),
            cond("dateOfBirth", "between", json!(["2000-01-01", "1990-01-01"])),
        ];
        let errors = compile(&conditions, &schema()).unwrap_err();
        assert_eq!(
            reasons(&errors),
            vec![
                (1, "ssn", ErrorKind::UnknownField),
                (3, "isPriority", ErrorKind::InvalidValueShape),
                (4, "dateOfBirth", ErrorKind::ValueOutOfRange),
            ]
        );
    }

    #[test]
    fn test_restricted_operators() {
        let matrix = OperatorMatrix::default()
            .restrict(FieldType::String, [Operator::Equals])
            .unwrap();
        let compiler = Compiler::new(matrix);

        assert!(compiler
            .compile(&[cond("email", "equals", json!("a@b.c"))], &schema())
            .is_ok());

        let errors = compiler
            .compile(&[cond("email", "startsWith", json!("a"))], &schema())
            .unwrap_err();
        assert_eq!(reasons(&errors), vec![(0, "email", ErrorKind::OperatorTypeMismatch)]);
    }

    #[test]
    fn test_fragments_follow_input_order() {
        let query = compile(
            &[
                cond("isPriority", "equals", json!(true)),
                cond("email", "startsWith", json!("alice")),
                cond("dateOfBirth", "before", json!("2000-01-01")),
            ],
            &schema(),
        )
        .unwrap();
        let rendered: Vec<String> = query.fragments().iter().map(|f| f.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "isPriority = true",
                r#"email startsWith "alice""#,
                "dateOfBirth < 2000-01-01T00:00:00.000Z",
            ]
        );
    }
}
