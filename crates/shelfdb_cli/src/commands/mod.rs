//! CLI command implementations.

pub mod dump;
pub mod inspect;

use shelfdb_codec::Value;
use shelfdb_core::{BootstrapReport, CoreError, CoreResult, DatabaseDefinition, Engine, SeedLoader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The engine rejected an operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Output could not be serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Invalid arguments.
    #[error("{0}")]
    Usage(String),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Loads `seed_url` records from JSON files next to the definition file.
#[derive(Debug, Clone)]
pub struct FileSeedLoader {
    base: PathBuf,
}

impl FileSeedLoader {
    /// A loader resolving relative locations against `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl SeedLoader for FileSeedLoader {
    fn load(&self, url: &str) -> CoreResult<Vec<Value>> {
        let path = self.base.join(url);
        debug!(path = %path.display(), "loading seed data");
        let text = std::fs::read_to_string(&path).map_err(|e| {
            CoreError::not_found(format!("cannot read seed file {}: {e}", path.display()))
        })?;
        match shelfdb_codec::from_json_str(&text)? {
            Value::Array(records) => Ok(records),
            other => Err(CoreError::data(format!(
                "seed file {} holds {} instead of an array",
                path.display(),
                other.type_name()
            ))),
        }
    }
}

/// A database built from a definition file.
pub struct LoadedDatabase {
    /// Engine holding the database.
    pub engine: Engine,
    /// Database name, taken from the file stem.
    pub name: String,
    /// What happened while building it.
    pub report: BootstrapReport,
}

/// Reads a definition file and bootstraps it into a fresh engine.
pub fn load_definition(path: &Path) -> CliResult<LoadedDatabase> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let definition = DatabaseDefinition::from_json_str(&text)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("database")
        .to_string();
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let engine = Engine::new();
    let report = engine.bootstrap_with(&name, &definition, &FileSeedLoader::new(base))?;
    Ok(LoadedDatabase {
        engine,
        name,
        report,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) const DEFINITION: &str = r#"{
        "version": 2,
        "stores": [
            {
                "name": "characters",
                "keyOptions": { "keyPath": "name" },
                "indexes": [{ "name": "by_age", "keyPath": "age" }],
                "seedUrl": "characters.json"
            },
            { "name": "empty", "keyOptions": { "autoIncrement": true } }
        ]
    }"#;

    pub(crate) const CHARACTERS: &str = r#"[
        { "name": "Homer", "age": 39 },
        { "name": "Bart", "age": 10 },
        { "name": "Lisa", "age": 8 },
        { "name": "Marge", "age": 36 }
    ]"#;

    pub(crate) fn write_fixture(dir: &TempDir) -> PathBuf {
        fs::write(dir.path().join("characters.json"), CHARACTERS).unwrap();
        let path = dir.path().join("simpsons.json");
        fs::write(&path, DEFINITION).unwrap();
        path
    }

    #[test]
    fn test_load_definition_with_seed_file() {
        let dir = TempDir::new().unwrap();
        let loaded = load_definition(&write_fixture(&dir)).unwrap();
        assert_eq!(loaded.name, "simpsons");
        assert!(loaded.report.is_ready());
        let info = loaded.engine.database_info("simpsons").unwrap();
        assert_eq!(info.version, 2);
        assert_eq!(info.stores[0].records, 4);
    }

    #[test]
    fn test_seed_file_must_hold_an_array() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("one.json"), r#"{"a": 1}"#).unwrap();
        let loader = FileSeedLoader::new(dir.path());
        assert!(loader.load("one.json").is_err());
        assert!(loader.load("missing.json").is_err());
    }

    #[test]
    fn test_missing_definition_file() {
        let err = load_definition(Path::new("/nonexistent/defs.json")).err().unwrap();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
