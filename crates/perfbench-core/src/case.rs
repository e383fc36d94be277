//! Test case declarations and the catalog that holds them.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::collection::CollectionHandle;
use crate::error::{ConfigError, ConfigResult, TrialError};
use crate::namespace;
use crate::traits::AdminClient;

/// Context passed to setup and teardown hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Concurrency level of the current trial.
    pub thread_count: u32,
    /// 1-based trial index.
    pub trial: u32,
    /// Index of the slot database, `test{database_index}` by default.
    pub database_index: u32,
    /// Index of the slot collection within its database.
    pub collection_index: u32,
}

/// Setup or teardown callback run once per fan-out slot.
#[async_trait]
pub trait CaseHook: Send + Sync {
    async fn run(
        &self,
        admin: &dyn AdminClient,
        collection: &CollectionHandle,
        env: &Environment,
    ) -> Result<(), TrialError>;

    /// Rejects hooks that can never succeed, before any trial runs.
    fn validate(&self) -> ConfigResult<()> {
        Ok(())
    }
}

/// Named, taggable workload declaration.
#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub tags: BTreeSet<String>,
    pub setup: Option<Arc<dyn CaseHook>>,
    pub teardown: Option<Arc<dyn CaseHook>>,
    /// Operation templates, possibly containing namespace placeholders.
    pub operations: Vec<Value>,
}

impl TestCase {
    /// Creates an untagged test case with no hooks and no operations.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeSet::new(),
            setup: None,
            teardown: None,
            operations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_setup(mut self, hook: impl CaseHook + 'static) -> Self {
        self.setup = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_teardown(mut self, hook: impl CaseHook + 'static) -> Self {
        self.teardown = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: Value) -> Self {
        self.operations.push(operation);
        self
    }

    /// Checks that every operation is a mapping with resolvable placeholders
    /// and that both hooks pass their own checks.
    ///
    /// # Errors
    ///
    /// Returns the first configuration defect found.
    pub fn validate(&self) -> ConfigResult<()> {
        for hook in self.setup.iter().chain(&self.teardown) {
            hook.validate()?;
        }
        for operation in &self.operations {
            if !operation.is_object() {
                return Err(ConfigError::InvalidOperation(format!(
                    "`{}` has a non-mapping operation `{operation}`",
                    self.name
                )));
            }
            namespace::validate(operation)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .field("operations", &self.operations)
            .finish()
    }
}

/// Ordered, read-only collection of declared test cases.
#[derive(Debug, Clone, Default)]
pub struct TestCatalog {
    cases: Vec<TestCase>,
    names: HashSet<String>,
}

impl TestCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a case, keeping declaration order.
    ///
    /// # Errors
    ///
    /// Rejects duplicate names and invalid operations.
    pub fn push(&mut self, case: TestCase) -> ConfigResult<()> {
        case.validate()?;
        if !self.names.insert(case.name.clone()) {
            return Err(ConfigError::DuplicateTestCase { name: case.name });
        }
        self.cases.push(case);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|case| case.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl<'a> IntoIterator for &'a TestCatalog {
    type Item = &'a TestCase;
    type IntoIter = std::slice::Iter<'a, TestCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.iter()
    }
}

/// Number of documents sent per insert call while seeding.
const SEED_BATCH_SIZE: u64 = 1000;

/// Declarative admin action usable as a setup or teardown step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminStep {
    /// Drop the slot collection.
    Drop,
    /// Create the slot collection with options (e.g. `{"capped": true}`).
    Create {
        #[serde(default)]
        options: Value,
    },
    /// Build an index.
    CreateIndex {
        keys: Value,
        #[serde(default)]
        options: Value,
    },
    /// Insert literal documents.
    Insert { documents: Vec<Value> },
    /// Insert `count` copies of `document`, optionally with `_id` set to the copy index.
    Seed {
        count: u64,
        #[serde(default)]
        document: Value,
        #[serde(default)]
        sequential_id: bool,
    },
    /// Run a command against the slot database. Placeholders are expanded.
    Command { command: Value },
}

impl AdminStep {
    fn validate(&self) -> ConfigResult<()> {
        match self {
            Self::Command { command } => namespace::validate(command),
            Self::Seed { document, .. } if !(document.is_object() || document.is_null()) => Err(
                ConfigError::InvalidOperation(format!("seed document must be a mapping, got `{document}`")),
            ),
            _ => Ok(()),
        }
    }

    async fn apply(
        &self,
        admin: &dyn AdminClient,
        collection: &CollectionHandle,
    ) -> Result<(), TrialError> {
        match self {
            Self::Drop => admin.drop_collection(collection).await?,
            Self::Create { options } => {
                match admin.create_collection(collection, &or_empty(options)).await {
                    Err(err) if !err.is_already_exists() => return Err(err.into()),
                    _ => {}
                }
            }
            Self::CreateIndex { keys, options } => {
                admin.create_index(collection, keys, &or_empty(options)).await?;
            }
            Self::Insert { documents } => {
                admin.insert_documents(collection, documents.clone()).await?;
            }
            Self::Seed {
                count,
                document,
                sequential_id,
            } => {
                let template = document.as_object().cloned().unwrap_or_default();
                let mut start = 0;
                while start < *count {
                    let end = (start + SEED_BATCH_SIZE).min(*count);
                    let batch = (start..end)
                        .map(|index| seed_document(&template, *sequential_id, index))
                        .collect();
                    admin.insert_documents(collection, batch).await?;
                    start = end;
                }
            }
            Self::Command { command } => {
                let mut resolved = command.clone();
                namespace::substitute(&mut resolved, collection).map_err(|err| TrialError::Hook {
                    phase: "command",
                    namespace: collection.full_namespace(),
                    message: err.to_string(),
                })?;
                admin
                    .run_command(collection.database_name(), &resolved)
                    .await?;
            }
        }
        Ok(())
    }
}

fn or_empty(options: &Value) -> Value {
    if options.is_null() {
        json!({})
    } else {
        options.clone()
    }
}

fn seed_document(template: &Map<String, Value>, sequential_id: bool, index: u64) -> Value {
    let mut document = template.clone();
    if sequential_id {
        document.insert("_id".to_string(), Value::from(index));
    }
    Value::Object(document)
}

/// Ordered list of admin steps acting as one hook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminSteps(pub Vec<AdminStep>);

impl AdminSteps {
    /// Checks every step for configuration defects.
    ///
    /// # Errors
    ///
    /// Returns the first invalid step's error.
    pub fn validate(&self) -> ConfigResult<()> {
        self.0.iter().try_for_each(AdminStep::validate)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[async_trait]
impl CaseHook for AdminSteps {
    async fn run(
        &self,
        admin: &dyn AdminClient,
        collection: &CollectionHandle,
        _env: &Environment,
    ) -> Result<(), TrialError> {
        for step in &self.0 {
            step.apply(admin, collection).await?;
        }
        Ok(())
    }

    fn validate(&self) -> ConfigResult<()> {
        AdminSteps::validate(self)
    }
}
