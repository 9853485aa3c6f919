//! Dump command implementation.

use super::{load_definition, CliError, CliResult};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use shelfdb_codec::to_json;
use shelfdb_core::{Direction, Engine, Key, KeyRange, Outcome, TransactionMode};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// What to dump.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// Store to read.
    pub store: String,
    /// Read through this index instead of the store's primary keys.
    pub index: Option<String>,
    /// Lower bound as JSON text.
    pub lower: Option<String>,
    /// Upper bound as JSON text.
    pub upper: Option<String>,
    /// Exclude the lower bound.
    pub lower_open: bool,
    /// Exclude the upper bound.
    pub upper_open: bool,
    /// Iteration direction.
    pub direction: Direction,
    /// Stop after this many records.
    pub limit: Option<usize>,
    /// Emit keys only.
    pub keys_only: bool,
}

/// One dumped record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpRow {
    /// Cursor key; the index key when reading an index.
    pub key: JsonValue,
    /// Primary key.
    pub primary_key: JsonValue,
    /// Record value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

fn parse_key(engine: &Engine, text: &str) -> CliResult<Key> {
    let value = shelfdb_codec::from_json_str(text)
        .map_err(|e| CliError::Usage(format!("bound '{text}' is not JSON: {e}")))?;
    Ok(engine.key(&value)?)
}

fn key_range(engine: &Engine, options: &DumpOptions) -> CliResult<KeyRange> {
    let lower = options.lower.as_deref().map(|t| parse_key(engine, t)).transpose()?;
    let upper = options.upper.as_deref().map(|t| parse_key(engine, t)).transpose()?;
    Ok(match (lower, upper) {
        (Some(lower), Some(upper)) => {
            KeyRange::bound(lower, upper, options.lower_open, options.upper_open)?
        }
        (Some(lower), None) => KeyRange::lower_bound(lower, options.lower_open),
        (None, Some(upper)) => KeyRange::upper_bound(upper, options.upper_open),
        (None, None) => KeyRange::all(),
    })
}

/// Reads records of a database built from a definition file.
pub fn dump(path: &Path, options: &DumpOptions) -> CliResult<Vec<DumpRow>> {
    let loaded = load_definition(path)?;
    let engine = loaded.engine;
    let range = key_range(&engine, options)?;

    let conn = engine.open(&loaded.name, None)?.wait()?;
    let txn = conn.transaction(&[options.store.as_str()], TransactionMode::ReadOnly)?;
    let store = txn.object_store(&options.store)?;
    let request = match (&options.index, options.keys_only) {
        (Some(index), false) => store.index(index)?.open_cursor(range, options.direction)?,
        (Some(index), true) => store.index(index)?.open_key_cursor(range, options.direction)?,
        (None, false) => store.open_cursor(range, options.direction)?,
        (None, true) => store.open_key_cursor(range, options.direction)?,
    };

    let rows = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rows);
    let limit = options.limit.unwrap_or(usize::MAX);
    request.on_success(move |event| {
        let Ok(Outcome::Cursor(Some(cursor))) = event.request.result() else {
            return;
        };
        let (Some(key), Some(primary_key)) = (cursor.key(), cursor.primary_key()) else {
            return;
        };
        let mut rows = sink.lock();
        rows.push(DumpRow {
            key: to_json(&key.to_value()),
            primary_key: to_json(&primary_key.to_value()),
            value: cursor.value().as_ref().map(to_json),
        });
        if rows.len() < limit {
            drop(rows);
            if let Err(err) = cursor.continue_() {
                debug!(error = %err, "cursor stopped");
            }
        }
    });
    engine.run_until_idle()?;
    if let Some(err) = request.error() {
        return Err(err.into());
    }
    conn.close();

    let rows = std::mem::take(&mut *rows.lock());
    Ok(rows)
}

/// Runs the dump command.
pub fn run(path: &Path, options: &DumpOptions, format: &str) -> CliResult<()> {
    let rows = dump(path, options)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
        _ => {
            for row in &rows {
                match &row.value {
                    Some(value) => println!("{}\t{}\t{}", row.key, row.primary_key, value),
                    None => println!("{}\t{}", row.key, row.primary_key),
                }
            }
            println!("({} records)", rows.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::write_fixture;
    use serde_json::json;
    use tempfile::TempDir;

    fn options(store: &str) -> DumpOptions {
        DumpOptions {
            store: store.to_string(),
            ..DumpOptions::default()
        }
    }

    #[test]
    fn test_dump_store_in_key_order() {
        let dir = TempDir::new().unwrap();
        let rows = dump(&write_fixture(&dir), &options("characters")).unwrap();
        let names: Vec<JsonValue> = rows.iter().map(|r| r.key.clone()).collect();
        assert_eq!(names, vec![json!("Bart"), json!("Homer"), json!("Lisa"), json!("Marge")]);
        assert_eq!(rows[0].value, Some(json!({"name": "Bart", "age": 10})));
    }

    #[test]
    fn test_dump_index_range_with_limit() {
        let dir = TempDir::new().unwrap();
        let mut opts = options("characters");
        opts.index = Some("by_age".to_string());
        opts.lower = Some("9".to_string());
        opts.direction = Direction::Prev;
        opts.limit = Some(2);
        opts.keys_only = true;
        let rows = dump(&write_fixture(&dir), &opts).unwrap();
        assert_eq!(
            rows,
            vec![
                DumpRow {
                    key: json!(39),
                    primary_key: json!("Homer"),
                    value: None,
                },
                DumpRow {
                    key: json!(36),
                    primary_key: json!("Marge"),
                    value: None,
                },
            ]
        );
    }

    #[test]
    fn test_dump_rejects_bad_arguments() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir);
        assert!(dump(&path, &options("nope")).is_err());

        let mut opts = options("characters");
        opts.lower = Some("{".to_string());
        assert!(matches!(dump(&path, &opts), Err(CliError::Usage(_))));

        let mut opts = options("characters");
        opts.lower = Some("\"z\"".to_string());
        opts.upper = Some("\"a\"".to_string());
        assert!(matches!(dump(&path, &opts), Err(CliError::Core(_))));
    }
}
