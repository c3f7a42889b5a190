use ignore::WalkBuilder;
use serde_json::Value as JsonValue;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const RECORD_EXTENSIONS: [&str; 4] = ["json", "yaml", "yml", "md"];

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// One record and where it came from. `position` is set when the file held
/// a list of records.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub source: PathBuf,
    pub position: Option<usize>,
    pub fields: JsonValue,
}

impl Record {
    pub fn label(&self, root: &Path) -> String {
        let path = self.source.strip_prefix(root).unwrap_or(&self.source);
        match self.position {
            Some(i) => format!("{}#{}", path.display(), i),
            None => path.display().to_string(),
        }
    }
}

pub fn collect_record_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .add_custom_ignore_filename(".filtercignore")
        .build();

    for entry in walker.flatten() {
        let path = entry.path();
        if path.is_file() && has_record_extension(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    debug!(root = %root.display(), count = files.len(), "collected record files");
    files
}

pub fn read_paths_from_stdin() -> Vec<PathBuf> {
    let stdin = io::stdin();
    stdin
        .lock()
        .lines()
        .map_while(Result::ok)
        .filter(|line| !line.trim().is_empty())
        .map(|line| PathBuf::from(line.trim()))
        .collect()
}

/// Loads every file, skipping (and logging) the ones that cannot be read.
pub fn load_all(paths: &[PathBuf]) -> Vec<Record> {
    let mut records = Vec::new();
    for path in paths {
        match load_records(path) {
            Ok(mut loaded) => records.append(&mut loaded),
            Err(e) => warn!(error = %e, "skipping record file"),
        }
    }
    records
}

pub fn load_records(path: &Path) -> Result<Vec<Record>, RecordError> {
    let content = fs::read_to_string(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_markdown = path.extension().is_some_and(|ext| ext == "md");
    let document = if is_markdown {
        match extract_frontmatter(&content) {
            Some(yaml) => yaml,
            None => return Ok(Vec::new()),
        }
    } else {
        content.as_str()
    };

    let value: JsonValue = serde_yaml::from_str(document).map_err(|source| RecordError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(split_records(path, value))
}

fn split_records(path: &Path, value: JsonValue) -> Vec<Record> {
    match value {
        JsonValue::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, item)| item.is_object())
            .map(|(i, fields)| Record {
                source: path.to_path_buf(),
                position: Some(i),
                fields,
            })
            .collect(),
        fields @ JsonValue::Object(_) => vec![Record {
            source: path.to_path_buf(),
            position: None,
            fields,
        }],
        _ => Vec::new(),
    }
}

fn has_record_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| RECORD_EXTENSIONS.contains(&ext))
}

fn extract_frontmatter(content: &str) -> Option<&str> {
    let trimmed = content.trim_start();
    let after_first = trimmed.strip_prefix("---")?;
    let end_idx = after_first.find("\n---")?;
    Some(&after_first[..end_idx])
}
