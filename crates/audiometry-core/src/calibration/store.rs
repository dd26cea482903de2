//! Persistence collaborator
//!
//! The calibration engine only needs to read and write named JSON objects in
//! two locations: a system directory holding the config file and a data
//! directory holding calibration and validation records.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Errors reported by a [`CalibrationStore`]
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Malformed JSON in {name}: {source}")]
    Malformed {
        name: String,
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid record name: {0:?}")]
    InvalidName(String),
}

/// Accept only plain file names, so a record never leaves its scope
pub fn check_name(name: &str) -> Result<&str, StoreError> {
    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if plain && !name.contains(['/', '\\']) {
        Ok(name)
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Location a named JSON object lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataScope {
    /// Application-wide settings (the calibration config file)
    System,
    /// Calibration and validation records
    Calibration,
}

impl DataScope {
    /// Directory name used by [`FileStore`]
    pub fn directory(&self) -> &'static str {
        match self {
            DataScope::System => "System",
            DataScope::Calibration => "Calibration",
        }
    }
}

/// Reads and writes named JSON objects
///
/// `read_json` distinguishes the outcomes the engine reacts to:
/// `Ok` (loaded), [`StoreError::NotFound`] and any other error (failed).
pub trait CalibrationStore: Send + Sync {
    /// Load the JSON object stored under `name`
    fn read_json(&self, scope: DataScope, name: &str) -> Result<Value, StoreError>;

    /// Persist `value` under `name`, replacing any previous content
    fn write_json(&self, scope: DataScope, name: &str, value: &Value, pretty: bool) -> Result<(), StoreError>;

    /// Names of all objects stored in `scope`, sorted
    fn list(&self, scope: DataScope) -> Result<Vec<String>, StoreError>;
}

/// Store backed by a directory tree: `<root>/<scope>/<name>`
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`; directories are created on write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of `name` in `scope`
    ///
    /// # Errors
    /// [`StoreError::InvalidName`] unless `name` is a plain file name.
    pub fn path_for(&self, scope: DataScope, name: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(scope.directory()).join(check_name(name)?))
    }
}

impl CalibrationStore for FileStore {
    fn read_json(&self, scope: DataScope, name: &str) -> Result<Value, StoreError> {
        let path = self.path_for(scope, name)?;
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_str(&contents).map_err(|source| StoreError::Malformed {
            name: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded JSON file");
        Ok(value)
    }

    fn write_json(&self, scope: DataScope, name: &str, value: &Value, pretty: bool) -> Result<(), StoreError> {
        let path = self.path_for(scope, name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|source| StoreError::Malformed {
            name: path.display().to_string(),
            source,
        })?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), "JSON file saved to disk");
        Ok(())
    }

    fn list(&self, scope: DataScope) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(scope.directory());
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory store, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(DataScope, String), String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text under `name`, bypassing JSON validation
    pub fn insert_raw(&self, scope: DataScope, name: &str, contents: &str) {
        self.objects()
            .insert((scope, name.to_string()), contents.to_string());
    }

    /// Raw text stored under `name`
    pub fn raw(&self, scope: DataScope, name: &str) -> Option<String> {
        self.objects().get(&(scope, name.to_string())).cloned()
    }

    /// Remove `name`, returning whether it existed
    pub fn remove(&self, scope: DataScope, name: &str) -> bool {
        self.objects().remove(&(scope, name.to_string())).is_some()
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<(DataScope, String), String>> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl CalibrationStore for MemoryStore {
    fn read_json(&self, scope: DataScope, name: &str) -> Result<Value, StoreError> {
        let contents = self
            .raw(scope, check_name(name)?)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", scope.directory(), name)))?;
        serde_json::from_str(&contents).map_err(|source| StoreError::Malformed {
            name: name.to_string(),
            source,
        })
    }

    fn write_json(&self, scope: DataScope, name: &str, value: &Value, pretty: bool) -> Result<(), StoreError> {
        let json = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|source| StoreError::Malformed {
            name: name.to_string(),
            source,
        })?;
        self.insert_raw(scope, check_name(name)?, &json);
        Ok(())
    }

    fn list(&self, scope: DataScope) -> Result<Vec<String>, StoreError> {
        Ok(self
            .objects()
            .keys()
            .filter(|(s, _)| *s == scope)
            .map(|(_, name)| name.clone())
            .collect())
    }
}

impl<T: CalibrationStore + ?Sized> CalibrationStore for std::sync::Arc<T> {
    fn read_json(&self, scope: DataScope, name: &str) -> Result<Value, StoreError> {
        (**self).read_json(scope, name)
    }

    fn write_json(&self, scope: DataScope, name: &str, value: &Value, pretty: bool) -> Result<(), StoreError> {
        (**self).write_json(scope, name, value, pretty)
    }

    fn list(&self, scope: DataScope) -> Result<Vec<String>, StoreError> {
        (**self).list(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store
            .write_json(DataScope::System, "config.json", &json!({"Version": 1}), true)
            .unwrap();

        let value = store.read_json(DataScope::System, "config.json").unwrap();
        assert_eq!(value, json!({"Version": 1}));
        assert!(store.raw(DataScope::System, "config.json").unwrap().contains('\n'));
    }

    #[test]
    fn test_memory_store_not_found_and_malformed() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read_json(DataScope::Calibration, "missing.json"),
            Err(StoreError::NotFound(_))
        ));

        store.insert_raw(DataScope::Calibration, "broken.json", "{ not json");
        assert!(matches!(
            store.read_json(DataScope::Calibration, "broken.json"),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn test_memory_store_list_by_scope() {
        let store = MemoryStore::new();
        store.insert_raw(DataScope::Calibration, "b.json", "{}");
        store.insert_raw(DataScope::Calibration, "a.json", "{}");
        store.insert_raw(DataScope::System, "c.json", "{}");

        assert_eq!(store.list(DataScope::Calibration).unwrap(), vec!["a.json", "b.json"]);
        assert_eq!(store.list(DataScope::System).unwrap(), vec!["c.json"]);
    }

    #[test]
    fn test_names_must_stay_in_scope() {
        let name = "Calibration_24_01_02_03_04_05.json";
        assert_eq!(check_name(name).unwrap(), name);
        for name in ["", ".", "..", "../outside.json", "nested/a.json", "nested\\a.json", "/etc/passwd"] {
            assert!(matches!(check_name(name), Err(StoreError::InvalidName(_))), "{name}");
        }
    }

    #[test]
    fn test_file_store_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        let store = FileStore::new(&root);

        let outside = dir.path().join("outside.json");
        assert!(matches!(
            store.write_json(DataScope::Calibration, "../../outside.json", &json!({}), false),
            Err(StoreError::InvalidName(_))
        ));
        assert!(!outside.exists());

        std::fs::write(&outside, "{}").unwrap();
        assert!(matches!(
            store.read_json(DataScope::System, outside.to_str().unwrap()),
            Err(StoreError::InvalidName(_))
        ));

        let memory = MemoryStore::new();
        assert!(matches!(
            memory.write_json(DataScope::System, "../config.json", &json!({}), false),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store
            .write_json(DataScope::Calibration, "a.json", &json!({"Current": "x"}), false)
            .unwrap();
        assert!(dir.path().join("Calibration").join("a.json").exists());

        let value = store.read_json(DataScope::Calibration, "a.json").unwrap();
        assert_eq!(value["Current"], "x");
        assert_eq!(store.list(DataScope::Calibration).unwrap(), vec!["a.json"]);
        assert!(store.list(DataScope::System).unwrap().is_empty());
    }

    #[test]
    fn test_file_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.read_json(DataScope::System, "nope.json"),
            Err(StoreError::NotFound(_))
        ));

        std::fs::create_dir_all(dir.path().join("System")).unwrap();
        std::fs::write(dir.path().join("System").join("bad.json"), "[1, 2").unwrap();
        assert!(matches!(
            store.read_json(DataScope::System, "bad.json"),
            Err(StoreError::Malformed { .. })
        ));
    }
}
