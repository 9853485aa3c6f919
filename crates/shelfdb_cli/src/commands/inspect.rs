//! Inspect command implementation.

use super::{load_definition, CliResult};
use serde::Serialize;
use shelfdb_core::{BootstrapEvent, DatabaseInfo, StatsSnapshot};
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Definition file.
    pub path: String,
    /// Whether every store was built without errors.
    pub ready: bool,
    /// The committed database.
    pub database: DatabaseInfo,
    /// Store and index failures.
    pub errors: Vec<BootstrapFailure>,
    /// Engine counters after the build.
    pub stats: StatsSnapshot,
}

/// One failure reported while building the database.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapFailure {
    /// Store name.
    pub store: String,
    /// Index name, when an index failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Symbolic error name.
    pub kind: String,
    /// Error message.
    pub message: String,
}

/// Builds the result for a definition file.
pub fn inspect(path: &Path) -> CliResult<InspectResult> {
    let loaded = load_definition(path)?;
    let database = loaded.engine.database_info(&loaded.name).ok_or_else(|| {
        super::CliError::Usage(format!("database '{}' was not created", loaded.name))
    })?;
    let errors = loaded
        .report
        .errors()
        .filter_map(|event| match event {
            BootstrapEvent::Error { store, index, error } => Some(BootstrapFailure {
                store: store.clone(),
                index: index.clone(),
                kind: error.kind().name().to_string(),
                message: error.to_string(),
            }),
            BootstrapEvent::Ready { .. } => None,
        })
        .collect();
    Ok(InspectResult {
        path: path.display().to_string(),
        ready: loaded.report.is_ready(),
        database,
        errors,
        stats: loaded.engine.stats(),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let result = inspect(path)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("ShelfDB Database Inspection");
    println!("===========================");
    println!();
    println!("Definition: {}", result.path);
    println!("Database:   {} (version {})", result.database.name, result.database.version);
    println!("Status:     {}", if result.ready { "ready" } else { "built with errors" });
    println!();
    println!("Stores:");
    for store in &result.database.stores {
        let key = match &store.key_path {
            Some(path) => format!("key path {path}"),
            None => "out-of-line keys".to_string(),
        };
        let generator = if store.auto_increment {
            format!(", next key {}", store.next_key)
        } else {
            String::new()
        };
        println!("  {}: {} records, {key}{generator}", store.name, store.records);
        for index in &store.indexes {
            let mut flags = Vec::new();
            if index.unique {
                flags.push("unique");
            }
            if index.multi_entry {
                flags.push("multi-entry");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            println!(
                "    index {} on {}: {} keys{flags}",
                index.name, index.key_path, index.entries
            );
        }
    }

    if !result.errors.is_empty() {
        println!();
        println!("Errors:");
        for failure in &result.errors {
            match &failure.index {
                Some(index) => println!(
                    "  {}.{}: {}: {}",
                    failure.store, index, failure.kind, failure.message
                ),
                None => println!("  {}: {}: {}", failure.store, failure.kind, failure.message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::write_fixture;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_reports_stores_and_indexes() {
        let dir = TempDir::new().unwrap();
        let result = inspect(&write_fixture(&dir)).unwrap();
        assert!(result.ready);
        assert!(result.errors.is_empty());
        assert_eq!(result.database.stores.len(), 2);
        assert_eq!(result.database.stores[0].indexes[0].entries, 4);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["database"]["version"], 2);
        assert_eq!(json["database"]["stores"][1]["name"], "empty");
    }

    #[test]
    fn test_inspect_lists_failures() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(
            &path,
            r#"{ "stores": [{ "name": "s", "keyOptions": { "keyPath": "id" }, "seedUrl": "gone.json" }] }"#,
        )
        .unwrap();
        let result = inspect(&path).unwrap();
        assert!(!result.ready);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].store, "s");
        assert_eq!(result.errors[0].kind, "NotFoundError");
    }
}
