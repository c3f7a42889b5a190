use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::filter::{Compiler, Operator, OperatorMatrix, RawFilterCondition, UnsupportedOperator};
use crate::schema::{FieldSchema, FieldType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    UnsupportedOperator(#[from] UnsupportedOperator),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
    fields: FieldSchema,
    #[serde(default)]
    operators: BTreeMap<FieldType, Vec<Operator>>,
}

/// A schema plus the operators each field type may use, as declared in a
/// YAML or JSON file.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub schema: FieldSchema,
    pub operators: OperatorMatrix,
}

impl CompilerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(content)?;

        let mut operators = OperatorMatrix::default();
        for (field_type, allowed) in file.operators {
            operators = operators.restrict(field_type, allowed)?;
        }

        Ok(Self {
            schema: file.fields,
            operators,
        })
    }

    pub fn compiler(&self) -> Compiler {
        Compiler::new(self.operators.clone())
    }
}

/// Reads a list of raw conditions. JSON input is accepted as YAML.
pub fn load_conditions(path: &Path) -> Result<Vec<RawFilterCondition>, ConfigError> {
    let content = read(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fields_only() {
        let config = CompilerConfig::from_yaml_str(
            "fields:\n  score: number\n  isPriority: boolean\n  name: multiValued\n",
        )
        .unwrap();
        assert_eq!(config.schema.type_of("score"), Some(FieldType::Number));
        assert_eq!(config.operators, OperatorMatrix::default());
    }

    #[test]
    fn test_json_config() {
        let config = CompilerConfig::from_yaml_str(
            r#"{"fields": {"createdAt": "date"}, "operators": {"date": ["before", "after"]}}"#,
        )
        .unwrap();
        assert!(config.operators.allows(FieldType::Date, Operator::Before));
        assert!(!config.operators.allows(FieldType::Date, Operator::Between));
    }

    #[test]
    fn test_operator_restriction() {
        let config = CompilerConfig::from_yaml_str(
            "fields:\n  email: string\noperators:\n  string: [equals, startsWith]\n",
        )
        .unwrap();
        assert!(config.operators.allows(FieldType::String, Operator::StartsWith));
        assert!(!config.operators.allows(FieldType::String, Operator::Contains));
        assert!(config.operators.allows(FieldType::Number, Operator::Between));
    }

    #[test]
    fn test_operator_outside_type_rejected() {
        let err = CompilerConfig::from_yaml_str(
            "fields:\n  score: number\noperators:\n  number: [contains]\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedOperator(_)));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        for yaml in [
            "fields: {}\nlimit: 10\n",
            "fields: {}\noperators:\n  text: [equals]\n",
            "fields: {}\noperators:\n  string: [like]\n",
        ] {
            assert!(CompilerConfig::from_yaml_str(yaml).is_err(), "{yaml}");
        }
    }

    #[test]
    fn test_load_conditions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conditions.json");
        fs::write(
            &path,
            r#"[
                {"field": "score", "operator": "gte", "value": 50},
                {"field": "name", "operator": "in", "value": ["Bob Lee"]}
            ]"#,
        )
        .unwrap();

        let conditions = load_conditions(&path).unwrap();
        assert_eq!(
            conditions,
            vec![
                RawFilterCondition::new("score", "gte", json!(50)),
                RawFilterCondition::new("name", "in", json!(["Bob Lee"])),
            ]
        );
    }

    #[test]
    fn test_missing_file() {
        let err = CompilerConfig::load(Path::new("/nonexistent/filterc.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
