//! Builds a [`TestCatalog`] from JSON declaration files.
//!
//! A file holds one declaration object or an array of them:
//!
//! ```json
//! [{
//!   "name": "Insert.Empty",
//!   "tags": ["insert", "regression"],
//!   "pre": [{"action": "drop"}],
//!   "ops": [{"op": "insert", "doc": {}}]
//! }]
//! ```

use std::fs;
use std::path::Path;

use perfbench_core::{AdminSteps, ConfigError, ConfigResult, TestCase, TestCatalog};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Declaration {
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    pre: AdminSteps,
    #[serde(default)]
    post: AdminSteps,
    ops: Vec<Value>,
}

impl Declaration {
    fn into_case(self, origin: &str) -> ConfigResult<TestCase> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid_declaration(origin, "test name is empty"));
        }
        if self.ops.is_empty() {
            return Err(ConfigError::invalid_declaration(
                origin,
                format!("`{}` declares no operations", self.name),
            ));
        }
        self.pre.validate()?;
        self.post.validate()?;

        let mut case = TestCase::new(self.name).with_tags(self.tags);
        if !self.pre.is_empty() {
            case = case.with_setup(self.pre);
        }
        if !self.post.is_empty() {
            case = case.with_teardown(self.post);
        }
        case.operations = self.ops;
        Ok(case)
    }
}

/// Reads declaration files into a catalog.
#[derive(Debug, Default)]
pub struct CatalogLoader {
    catalog: TestCatalog,
}

impl CatalogLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every file in order into a single catalog.
    ///
    /// # Errors
    ///
    /// Fails on unreadable files, malformed declarations and duplicate names.
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<TestCatalog> {
        let mut loader = Self::new();
        for path in paths {
            loader.add_file(path.as_ref())?;
        }
        Ok(loader.finish())
    }

    pub fn add_file(&mut self, path: &Path) -> ConfigResult<()> {
        let text = fs::read_to_string(path)?;
        let added = self.add_str(&path.display().to_string(), &text)?;
        info!(file = %path.display(), tests = added, "loaded test declarations");
        Ok(())
    }

    /// Adds the declarations in `text`; `origin` names the source in errors.
    ///
    /// Returns the number of test cases added.
    pub fn add_str(&mut self, origin: &str, text: &str) -> ConfigResult<usize> {
        let document: Value = serde_json::from_str(text)
            .map_err(|err| ConfigError::invalid_declaration(origin, err.to_string()))?;

        let entries = match document {
            Value::Array(entries) => entries,
            entry @ Value::Object(_) => vec![entry],
            other => {
                return Err(ConfigError::invalid_declaration(
                    origin,
                    format!("expected an object or an array, got `{other}`"),
                ))
            }
        };

        let count = entries.len();
        for (index, entry) in entries.into_iter().enumerate() {
            let declaration: Declaration = serde_json::from_value(entry).map_err(|err| {
                ConfigError::invalid_declaration(origin, format!("entry {index}: {err}"))
            })?;
            self.catalog.push(declaration.into_case(origin)?)?;
        }
        Ok(count)
    }

    pub fn finish(self) -> TestCatalog {
        self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_object_is_accepted() {
        let mut loader = CatalogLoader::new();
        let added = loader
            .add_str("inline", r#"{"name": "Q", "ops": [{"op": "query"}]}"#)
            .unwrap();
        assert_eq!(added, 1);

        let catalog = loader.finish();
        let case = catalog.get("Q").unwrap();
        assert!(case.tags.is_empty());
        assert!(case.setup.is_none());
        assert!(case.teardown.is_none());
    }

    #[test]
    fn hooks_are_built_from_steps() {
        let mut loader = CatalogLoader::new();
        loader
            .add_str(
                "inline",
                r#"[{
                    "name": "U", "tags": ["update"],
                    "pre": [{"action": "seed", "count": 100}],
                    "post": [{"action": "drop"}],
                    "ops": [{"op": "update", "query": {}, "update": {"$inc": {"x": 1}}}]
                }]"#,
            )
            .unwrap();

        let catalog = loader.finish();
        let case = catalog.get("U").unwrap();
        assert!(case.setup.is_some());
        assert!(case.teardown.is_some());
    }

    #[test]
    fn malformed_declarations_name_their_origin() {
        let mut loader = CatalogLoader::new();
        let err = loader
            .add_str("bad.json", r#"[{"name": "X", "ops": [], "extra": 1}]"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDeclaration { ref origin, .. } if origin == "bad.json"));

        let err = loader.add_str("empty.json", r#"[{"name": "X", "ops": []}]"#).unwrap_err();
        assert!(err.to_string().contains("no operations"));

        assert!(loader.add_str("scalar.json", "42").is_err());
    }

    #[test]
    fn unknown_placeholder_is_fatal() {
        let mut loader = CatalogLoader::new();
        let err = loader
            .add_str("p.json", r##"{"name": "P", "ops": [{"op": "query", "ns": "#B_BOGUS"}]}"##)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPlaceholder { .. }));
    }
}
