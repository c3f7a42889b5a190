use clap::Parser;
use filterc::config::{self, CompilerConfig};
use filterc::filter::{self, CompileError, CompiledQuery, RawFilterCondition};
use filterc::records::{self, Record};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "filterc",
    about = "Compile record filter conditions into a typed query"
)]
struct Cli {
    #[arg(
        long,
        env = "FILTERC_SCHEMA",
        help = "Schema file declaring field types (YAML or JSON)"
    )]
    schema: Option<PathBuf>,

    #[arg(long, help = "File with a list of {field, operator, value} conditions")]
    conditions: Option<PathBuf>,

    #[arg(
        long = "where",
        value_name = "CLAUSE",
        help = "Condition clause, e.g. 'score >= 50 AND name in [\"Bob Lee\"]'"
    )]
    clauses: Vec<String>,

    #[arg(long, env = "FILTERC_RECORDS", help = "Directory of record files to filter")]
    records: Option<PathBuf>,

    #[arg(long, conflicts_with = "records", help = "Read record file paths from stdin")]
    stdin: bool,

    #[arg(long, help = "Print compile errors as JSON on stdout")]
    json: bool,
}

/// What a run prints and the status it exits with: 0 on success or a match,
/// 1 when no record matched, 2 on any error.
#[derive(Debug, Default, PartialEq)]
struct Outcome {
    code: u8,
    stdout: Vec<String>,
    stderr: Vec<String>,
}

impl Outcome {
    fn failure(message: String) -> Self {
        Self {
            code: 2,
            stderr: vec![message],
            ..Self::default()
        }
    }

    fn emit(self) -> ExitCode {
        for line in &self.stdout {
            println!("{}", line);
        }
        for line in &self.stderr {
            eprintln!("{}", line);
        }
        ExitCode::from(self.code)
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(&Cli::parse()).emit()
}

fn run(cli: &Cli) -> Outcome {
    let Some(schema_path) = cli.schema.as_deref() else {
        return Outcome::failure(
            "Error: No schema specified. Use --schema or set FILTERC_SCHEMA".to_string(),
        );
    };

    let config = match CompilerConfig::load(schema_path) {
        Ok(c) => c,
        Err(e) => return Outcome::failure(format!("Config error: {}", e)),
    };
    debug!(fields = config.schema.len(), "loaded schema");

    let conditions = match gather_conditions(cli.conditions.as_deref(), &cli.clauses) {
        Ok(c) => c,
        Err(message) => return Outcome::failure(message),
    };

    let query = match config.compiler().compile(&conditions, &config.schema) {
        Ok(q) => q,
        Err(errors) => return render_errors(&errors, cli.json),
    };
    info!(conditions = conditions.len(), query = %query, "compiled filter");

    if cli.stdin {
        let files = records::read_paths_from_stdin();
        return filter_records(&query, &records::load_all(&files), Path::new(""));
    }
    if let Some(root) = cli.records.as_deref() {
        let files = records::collect_record_files(root);
        let loaded = records::load_all(&files);
        debug!(files = files.len(), records = loaded.len(), "loaded records");
        return filter_records(&query, &loaded, root);
    }

    render_query(&query)
}

fn gather_conditions(
    file: Option<&Path>,
    clauses: &[String],
) -> Result<Vec<RawFilterCondition>, String> {
    let mut conditions = match file {
        Some(path) => {
            config::load_conditions(path).map_err(|e| format!("Conditions error: {}", e))?
        }
        None => Vec::new(),
    };

    for clause in clauses {
        let parsed = filter::parse(clause).map_err(|e| format!("Query error: {}", e))?;
        conditions.extend(parsed);
    }

    Ok(conditions)
}

fn render_errors(errors: &[CompileError], as_json: bool) -> Outcome {
    if !as_json {
        return Outcome {
            code: 2,
            stderr: errors
                .iter()
                .map(|e| format!("Invalid condition: {}", e))
                .collect(),
            ..Outcome::default()
        };
    }
    match serde_json::to_string_pretty(errors) {
        Ok(out) => Outcome {
            code: 2,
            stdout: vec![out],
            ..Outcome::default()
        },
        Err(e) => Outcome::failure(format!("Error: {}", e)),
    }
}

fn render_query(query: &CompiledQuery) -> Outcome {
    match serde_json::to_string_pretty(&query.to_document()) {
        Ok(out) => Outcome {
            stdout: vec![out],
            ..Outcome::default()
        },
        Err(e) => Outcome::failure(format!("Error: {}", e)),
    }
}

fn filter_records(query: &CompiledQuery, loaded: &[Record], root: &Path) -> Outcome {
    let matched: Vec<String> = loaded
        .iter()
        .filter(|record| query.matches(&record.fields))
        .map(|record| record.label(root))
        .collect();

    Outcome {
        code: if matched.is_empty() { 1 } else { 0 },
        stdout: matched,
        ..Outcome::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;

    const SCHEMA: &str = "fields:\n  score: number\n  isPriority: boolean\n  name: multiValued\n";

    fn workspace() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("schema.yaml"), SCHEMA).unwrap();
        let records = dir.path().join("records");
        fs::create_dir(&records).unwrap();
        fs::write(
            records.join("people.json"),
            r#"[{"name": ["Alice Smith"], "score": 72}, {"name": ["Bob Lee"], "score": 5}]"#,
        )
        .unwrap();
        dir
    }

    fn cli(dir: &TempDir, args: &[&str]) -> Cli {
        let schema = dir.path().join("schema.yaml");
        let mut argv = vec!["filterc", "--schema", schema.to_str().unwrap()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn records_dir(dir: &TempDir) -> String {
        dir.path().join("records").to_string_lossy().into_owned()
    }

    #[test]
    fn test_compile_mode_prints_document() {
        let dir = workspace();
        let outcome = run(&cli(&dir, &["--where", "score >= 50"]));

        assert_eq!(outcome.code, 0);
        assert!(outcome.stderr.is_empty());
        let document: Value = serde_json::from_str(&outcome.stdout[0]).unwrap();
        assert_eq!(document, json!({"score": {"$gte": 50}}));
    }

    #[test]
    fn test_filter_mode_exit_codes() {
        let dir = workspace();
        let root = records_dir(&dir);

        let outcome = run(&cli(&dir, &["--where", "score >= 50", "--records", &root]));
        assert_eq!(outcome.code, 0);
        assert_eq!(outcome.stdout, vec!["people.json#0"]);

        let outcome = run(&cli(&dir, &["--where", "score > 100", "--records", &root]));
        assert_eq!(outcome.code, 1);
        assert!(outcome.stdout.is_empty());
    }

    #[test]
    fn test_compile_errors_exit_with_two() {
        let dir = workspace();
        let args = ["--where", "ssn = 1 AND isPriority = 3"];

        let outcome = run(&cli(&dir, &args));
        assert_eq!(outcome.code, 2);
        assert!(outcome.stdout.is_empty());
        assert_eq!(outcome.stderr.len(), 2);
        assert!(outcome.stderr[0].starts_with("Invalid condition: condition 0 on 'ssn'"));
    }

    #[test]
    fn test_json_errors_are_an_array_on_stdout() {
        let dir = workspace();
        let outcome = run(&cli(&dir, &["--json", "--where", "ssn = 1 AND isPriority = 3"]));

        assert_eq!(outcome.code, 2);
        assert!(outcome.stderr.is_empty());
        let body: Value = serde_json::from_str(&outcome.stdout[0]).unwrap();
        assert_eq!(
            body,
            json!([
                {"index": 0, "field": "ssn", "reason": "unknownField"},
                {"index": 1, "field": "isPriority", "reason": "invalidValueShape"},
            ])
        );
    }

    #[test]
    fn test_setup_failures_exit_with_two() {
        let dir = workspace();

        let outcome = run(&cli(&dir, &["--where", "score >= "]));
        assert_eq!(outcome.code, 2);
        assert!(outcome.stderr[0].starts_with("Query error:"));

        let missing = dir.path().join("missing.yaml");
        let outcome = run(&Cli::try_parse_from([
            "filterc",
            "--schema",
            missing.to_str().unwrap(),
        ])
        .unwrap());
        assert_eq!(outcome.code, 2);
        assert!(outcome.stderr[0].starts_with("Config error:"));
    }

    #[test]
    fn test_stdin_conflicts_with_records() {
        let result = Cli::try_parse_from(["filterc", "--records", "vault", "--stdin"]);
        assert_eq!(
            result.err().map(|e| e.kind()),
            Some(clap::error::ErrorKind::ArgumentConflict)
        );
    }
}
