//! External tabular source loading
//!
//! Every source reduces to the same column-oriented shape: `key → value
//! list`, plus a whole-file SHA-256 recorded for provenance. Loading never
//! mutates anything; calling it twice on an unchanged file yields identical
//! columns and the identical digest.

use crate::error::{ConfigurationError, RunSpaceError};
use crate::spec::{RunSource, SourceFormat, SourceMode};
use semantiva_identity::Fingerprint;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Columns plus provenance digest for one loaded source
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSource {
    /// Column name → values
    pub columns: BTreeMap<String, Vec<Value>>,
    /// Whole-file SHA-256
    pub sha256: Fingerprint,
}

/// Load, select, and rename a source's columns.
///
/// `source.path` is resolved against `cwd` when relative.
///
/// # Errors
/// I/O failures, parse failures, `select` misses, and `rename` collisions
/// are all reported before any column data escapes.
pub fn load_source(source: &RunSource, cwd: &Path) -> Result<LoadedSource, RunSpaceError> {
    let path = if source.path.is_absolute() {
        source.path.clone()
    } else {
        cwd.join(&source.path)
    };

    let sha256 = Fingerprint::of_file(&path)?;
    let text = std::fs::read_to_string(&path).map_err(|e| RunSpaceError::Io {
        path: path.clone(),
        source: e,
    })?;

    let mut columns = match source.format {
        SourceFormat::Csv => parse_csv(&text, &path)?,
        SourceFormat::Ndjson => parse_ndjson(&text, &path)?,
        SourceFormat::Json => {
            let doc: Value =
                serde_json::from_str(&text).map_err(|e| ConfigurationError::SourceParse {
                    path: path.clone(),
                    format: source.format.name().to_string(),
                    reason: e.to_string(),
                })?;
            document_columns(doc, source.mode, &path)?
        }
        SourceFormat::Yaml => {
            let doc: Value =
                serde_yaml::from_str(&text).map_err(|e| ConfigurationError::SourceParse {
                    path: path.clone(),
                    format: source.format.name().to_string(),
                    reason: e.to_string(),
                })?;
            document_columns(doc, source.mode, &path)?
        }
    };

    if let Some(select) = &source.select {
        columns = apply_select(columns, select, &path)?;
    }
    if let Some(rename) = &source.rename {
        columns = apply_rename(columns, rename, &path)?;
    }

    tracing::debug!(
        path = %path.display(),
        columns = columns.len(),
        sha256 = %sha256.short(),
        "loaded run source"
    );
    Ok(LoadedSource { columns, sha256 })
}

/// CSV: header row defines columns; cells are scalar-coerced.
fn parse_csv(text: &str, path: &Path) -> Result<BTreeMap<String, Vec<Value>>, RunSpaceError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ConfigurationError::SourceParse {
            path: path.to_path_buf(),
            format: "csv".to_string(),
            reason: e.to_string(),
        })?
        .iter()
        .map(str::to_string)
        .collect();

    let mut columns: BTreeMap<String, Vec<Value>> =
        headers.iter().map(|h| (h.clone(), Vec::new())).collect();

    for record in reader.records() {
        let record = record.map_err(|e| ConfigurationError::SourceParse {
            path: path.to_path_buf(),
            format: "csv".to_string(),
            reason: e.to_string(),
        })?;
        for (header, cell) in headers.iter().zip(record.iter()) {
            if let Some(col) = columns.get_mut(header) {
                col.push(coerce_scalar(cell));
            }
        }
    }
    Ok(columns)
}

/// NDJSON: one JSON object per line; columns are the union of all keys,
/// missing cells filled with `null`.
fn parse_ndjson(text: &str, path: &Path) -> Result<BTreeMap<String, Vec<Value>>, RunSpaceError> {
    let mut rows: Vec<Map<String, Value>> = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(line).map_err(|e| ConfigurationError::SourceParse {
                path: path.to_path_buf(),
                format: "ndjson".to_string(),
                reason: format!("line {}: {}", lineno + 1, e),
            })?;
        match value {
            Value::Object(obj) => rows.push(obj),
            other => {
                return Err(ConfigurationError::SourceShape {
                    path: path.to_path_buf(),
                    reason: format!("line {} is not an object: {}", lineno + 1, other),
                }
                .into())
            }
        }
    }
    Ok(rows_to_columns(&rows))
}

/// JSON/YAML document → columns, honoring the declared shape mode.
fn document_columns(
    doc: Value,
    mode: SourceMode,
    path: &Path,
) -> Result<BTreeMap<String, Vec<Value>>, RunSpaceError> {
    match (mode, doc) {
        (SourceMode::Rows | SourceMode::Auto, Value::Array(items)) => {
            let mut rows = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(obj) => rows.push(obj),
                    other => {
                        return Err(ConfigurationError::SourceShape {
                            path: path.to_path_buf(),
                            reason: format!("row {i} is not a mapping: {other}"),
                        }
                        .into())
                    }
                }
            }
            Ok(rows_to_columns(&rows))
        }
        (SourceMode::Columns | SourceMode::Auto, Value::Object(obj)) => {
            // Column-oriented: lists stay lists, bare scalars wrap into
            // singleton lists.
            let columns = obj
                .into_iter()
                .map(|(key, value)| {
                    let list = match value {
                        Value::Array(items) => items,
                        scalar => vec![scalar],
                    };
                    (key, list)
                })
                .collect();
            Ok(columns)
        }
        (mode, other) => Err(ConfigurationError::SourceShape {
            path: path.to_path_buf(),
            reason: format!(
                "expected {} document, got {}",
                match mode {
                    SourceMode::Rows => "a list-of-mappings",
                    SourceMode::Columns => "a mapping-of-lists",
                    SourceMode::Auto => "a list or mapping",
                },
                type_name(&other)
            ),
        }
        .into()),
    }
}

fn rows_to_columns(rows: &[Map<String, Value>]) -> BTreeMap<String, Vec<Value>> {
    let mut keys: Vec<&String> = rows.iter().flat_map(|r| r.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .map(|key| {
            let column = rows
                .iter()
                .map(|row| row.get(key).cloned().unwrap_or(Value::Null))
                .collect();
            (key.clone(), column)
        })
        .collect()
}

/// Coerce a CSV cell: integer, then float, then boolean, else string.
fn coerce_scalar(cell: &str) -> Value {
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match cell {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
    }
}

fn apply_select(
    columns: BTreeMap<String, Vec<Value>>,
    select: &[String],
    path: &Path,
) -> Result<BTreeMap<String, Vec<Value>>, RunSpaceError> {
    let mut out = BTreeMap::new();
    for name in select {
        match columns.get(name) {
            Some(values) => {
                out.insert(name.clone(), values.clone());
            }
            None => {
                return Err(ConfigurationError::MissingColumn {
                    column: name.clone(),
                    available: columns.keys().cloned().collect(),
                    path: path.to_path_buf(),
                }
                .into())
            }
        }
    }
    Ok(out)
}

fn apply_rename(
    mut columns: BTreeMap<String, Vec<Value>>,
    rename: &BTreeMap<String, String>,
    path: &Path,
) -> Result<BTreeMap<String, Vec<Value>>, RunSpaceError> {
    // Collision check first: a target must not hit a surviving column or
    // another rename's target.
    let mut targets: Vec<&String> = Vec::new();
    for (old, new) in rename {
        let collides_existing = columns.contains_key(new) && !rename.contains_key(new);
        if collides_existing || targets.contains(&new) {
            return Err(ConfigurationError::RenameCollision {
                target: new.clone(),
                path: path.to_path_buf(),
            }
            .into());
        }
        if !columns.contains_key(old) {
            return Err(ConfigurationError::MissingColumn {
                column: old.clone(),
                available: columns.keys().cloned().collect(),
                path: path.to_path_buf(),
            }
            .into());
        }
        targets.push(new);
    }

    let mut renamed = BTreeMap::new();
    for (old, new) in rename {
        if let Some(values) = columns.remove(old) {
            renamed.insert(new.clone(), values);
        }
    }
    columns.extend(renamed);
    Ok(columns)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn source(name: &str, format: SourceFormat) -> RunSource {
        RunSource {
            path: PathBuf::from(name),
            format,
            mode: SourceMode::Auto,
            select: None,
            rename: None,
        }
    }

    #[test]
    fn csv_columns_with_scalar_coercion() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "p.csv", "gain,label,flag\n1,alpha,true\n2.5,beta,false\n");
        let loaded = load_source(&source("p.csv", SourceFormat::Csv), dir.path()).unwrap();
        assert_eq!(loaded.columns["gain"], vec![json!(1), json!(2.5)]);
        assert_eq!(loaded.columns["label"], vec![json!("alpha"), json!("beta")]);
        assert_eq!(loaded.columns["flag"], vec![json!(true), json!(false)]);
    }

    #[test]
    fn ndjson_unions_columns_with_null_fill() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "p.ndjson", "{\"a\": 1, \"b\": 2}\n{\"a\": 3, \"c\": 4}\n");
        let loaded = load_source(&source("p.ndjson", SourceFormat::Ndjson), dir.path()).unwrap();
        assert_eq!(loaded.columns["a"], vec![json!(1), json!(3)]);
        assert_eq!(loaded.columns["b"], vec![json!(2), Value::Null]);
        assert_eq!(loaded.columns["c"], vec![Value::Null, json!(4)]);
    }

    #[test]
    fn json_list_of_mappings_is_rows() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "p.json", r#"[{"x": 1}, {"x": 2}]"#);
        let loaded = load_source(&source("p.json", SourceFormat::Json), dir.path()).unwrap();
        assert_eq!(loaded.columns["x"], vec![json!(1), json!(2)]);
    }

    #[test]
    fn yaml_mapping_of_lists_is_columns_with_scalar_wrap() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "p.yaml", "x: [1, 2, 3]\nlabel: fixed\n");
        let loaded = load_source(&source("p.yaml", SourceFormat::Yaml), dir.path()).unwrap();
        assert_eq!(loaded.columns["x"], vec![json!(1), json!(2), json!(3)]);
        assert_eq!(loaded.columns["label"], vec![json!("fixed")]);
    }

    #[test]
    fn explicit_rows_mode_rejects_mapping_document() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "p.yaml", "x: [1]\n");
        let mut src = source("p.yaml", SourceFormat::Yaml);
        src.mode = SourceMode::Rows;
        let err = load_source(&src, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            RunSpaceError::Config(ConfigurationError::SourceShape { .. })
        ));
    }

    #[test]
    fn select_restricts_and_reports_missing() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "p.csv", "a,b\n1,2\n");
        let mut src = source("p.csv", SourceFormat::Csv);
        src.select = Some(vec!["a".to_string()]);
        let loaded = load_source(&src, dir.path()).unwrap();
        assert_eq!(loaded.columns.len(), 1);

        src.select = Some(vec!["z".to_string()]);
        let err = load_source(&src, dir.path()).unwrap_err();
        match err {
            RunSpaceError::Config(ConfigurationError::MissingColumn { column, available, .. }) => {
                assert_eq!(column, "z");
                assert_eq!(available, vec!["a", "b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rename_moves_columns() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "p.csv", "a,b\n1,2\n");
        let mut src = source("p.csv", SourceFormat::Csv);
        src.rename = Some(BTreeMap::from([("a".to_string(), "alpha".to_string())]));
        let loaded = load_source(&src, dir.path()).unwrap();
        assert!(loaded.columns.contains_key("alpha"));
        assert!(!loaded.columns.contains_key("a"));
    }

    #[test]
    fn rename_collision_with_existing_column_errors() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "p.csv", "a,b\n1,2\n");
        let mut src = source("p.csv", SourceFormat::Csv);
        src.rename = Some(BTreeMap::from([("a".to_string(), "b".to_string())]));
        let err = load_source(&src, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            RunSpaceError::Config(ConfigurationError::RenameCollision { target, .. }) if target == "b"
        ));
    }

    #[test]
    fn rename_swap_is_allowed() {
        // a->b and b->a: both old names are consumed, so neither target
        // collides with a surviving column.
        let dir = TempDir::new().unwrap();
        write_file(&dir, "p.csv", "a,b\n1,2\n");
        let mut src = source("p.csv", SourceFormat::Csv);
        src.rename = Some(BTreeMap::from([
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "a".to_string()),
        ]));
        let loaded = load_source(&src, dir.path()).unwrap();
        assert_eq!(loaded.columns["b"], vec![json!(1)]);
        assert_eq!(loaded.columns["a"], vec![json!(2)]);
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "p.csv", "a\n1\n");
        let src = source("p.csv", SourceFormat::Csv);
        let first = load_source(&src, dir.path()).unwrap();
        let second = load_source(&src, dir.path()).unwrap();
        assert_eq!(first.sha256, second.sha256);

        write_file(&dir, "p.csv", "a\n2\n");
        let third = load_source(&src, dir.path()).unwrap();
        assert_ne!(first.sha256, third.sha256);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_source(&source("absent.csv", SourceFormat::Csv), dir.path()).unwrap_err();
        assert!(matches!(err, RunSpaceError::Identity(_) | RunSpaceError::Io { .. }));
    }
}
