//! Template lookup by transform name

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Errors raised by template stores
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template '{name}' defined twice: {first} and {second}")]
    Duplicate {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Template directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("IO error reading {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Source of SQL template text keyed by transform name
///
/// Lookups are pure: the same name always yields the same text for the
/// lifetime of the store.
pub trait TemplateStore: Send + Sync {
    /// Get the template text for a transform
    fn template(&self, name: &str) -> Result<String, TemplateError>;

    /// Names of all known templates, sorted
    fn names(&self) -> Vec<String>;
}

/// Templates stored as `<name>.sql` files anywhere below a directory
#[derive(Debug, Clone)]
pub struct FileTemplateStore {
    root: PathBuf,
    files: BTreeMap<String, PathBuf>,
}

impl FileTemplateStore {
    /// Index every `.sql` file below `root`
    pub fn new(root: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(TemplateError::MissingDirectory(root));
        }

        let mut files: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in WalkDir::new(&root).follow_links(true) {
            let entry = entry.map_err(|e| TemplateError::Io {
                path: root.clone(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("sql")
            {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            if let Some(first) = files.get(name) {
                return Err(TemplateError::Duplicate {
                    name: name.to_string(),
                    first: first.clone(),
                    second: path.to_path_buf(),
                });
            }
            files.insert(name.to_string(), path.to_path_buf());
        }

        tracing::debug!(root = %root.display(), templates = files.len(), "indexed query templates");
        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a template file
    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(PathBuf::as_path)
    }
}

impl TemplateStore for FileTemplateStore {
    fn template(&self, name: &str) -> Result<String, TemplateError> {
        let path = self
            .files
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;

        std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    fn names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

/// In-memory templates, mostly for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplateStore {
    templates: HashMap<String, String>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template
    pub fn with(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.insert(name, sql);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, sql: impl Into<String>) {
        self.templates.insert(name.into(), sql.into());
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn template(&self, name: &str) -> Result<String, TemplateError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_lookup() {
        let store = MemoryTemplateStore::new()
            .with("b", "select 2")
            .with("a", "select 1");
        assert_eq!(store.template("a").unwrap(), "select 1");
        assert!(matches!(store.template("missing"), Err(TemplateError::NotFound(_))));
        assert_eq!(store.names(), vec!["a", "b"]);
    }

    #[test]
    fn file_store_indexes_nested_sql_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("marts")).unwrap();
        std::fs::write(dir.path().join("stock_prices_in_currencies.sql"), "select 1").unwrap();
        std::fs::write(dir.path().join("marts/aggregated_stock_profiles.sql"), "select 2").unwrap();
        std::fs::write(dir.path().join("README.md"), "not a template").unwrap();

        let store = FileTemplateStore::new(dir.path()).unwrap();
        assert_eq!(
            store.names(),
            vec!["aggregated_stock_profiles", "stock_prices_in_currencies"]
        );
        assert_eq!(store.template("aggregated_stock_profiles").unwrap(), "select 2");
        assert!(store.path_of("README").is_none());
    }

    #[test]
    fn file_store_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("x.sql"), "select 1").unwrap();
        std::fs::write(dir.path().join("nested/x.sql"), "select 2").unwrap();

        assert!(matches!(
            FileTemplateStore::new(dir.path()),
            Err(TemplateError::Duplicate { .. })
        ));
    }

    #[test]
    fn file_store_requires_directory() {
        assert!(matches!(
            FileTemplateStore::new("/definitely/not/here"),
            Err(TemplateError::MissingDirectory(_))
        ));
    }
}
