use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collection::CollectionHandle;
use crate::error::{AdminError, GeneratorError};

/// Category labels summed when the generator reports per-category counts.
pub const DEFAULT_THROUGHPUT_CATEGORIES: [&str; 6] =
    ["insert", "query", "update", "delete", "getmore", "command"];

/// Administrative primitives of the database under test.
///
/// Every primitive reports failure explicitly; callers propagate it as a
/// trial error.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Drops a collection. Dropping a missing collection succeeds.
    async fn drop_collection(&self, collection: &CollectionHandle) -> Result<(), AdminError>;

    /// Creates a collection. Returns [`AdminError::AlreadyExists`] if present.
    async fn create_collection(
        &self,
        collection: &CollectionHandle,
        options: &Value,
    ) -> Result<(), AdminError>;

    /// Builds an index with the given key pattern.
    async fn create_index(
        &self,
        collection: &CollectionHandle,
        keys: &Value,
        options: &Value,
    ) -> Result<(), AdminError>;

    /// Inserts documents, creating the collection implicitly.
    async fn insert_documents(
        &self,
        collection: &CollectionHandle,
        documents: Vec<Value>,
    ) -> Result<(), AdminError>;

    /// Runs an arbitrary command against `database` and returns the reply.
    async fn run_command(&self, database: &str, command: &Value) -> Result<Value, AdminError>;

    /// Lists namespaces in `databases` whose drop has not completed yet.
    async fn pending_drops(&self, databases: &[String]) -> Result<Vec<String>, AdminError>;

    /// Enables sharding for a database.
    async fn enable_sharding(&self, database: &str) -> Result<(), AdminError>;

    /// Shards a collection on `key`.
    async fn shard_collection(&self, namespace: &str, key: &Value) -> Result<(), AdminError>;

    /// Blocks until pending writes are flushed to disk.
    async fn fsync(&self) -> Result<(), AdminError>;

    /// Reports server version and platform details.
    async fn build_info(&self) -> Result<BuildInfo, AdminError>;
}

/// External workload executor.
#[async_trait]
pub trait LoadGenerator: Send + Sync {
    /// Runs `request.ops` with `request.parallel` workers for `request.seconds`.
    async fn run(&self, request: &BenchRequest) -> Result<BenchResponse, GeneratorError>;
}

/// Server identification returned by the build-info primitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: String,
    #[serde(default)]
    pub git_version: String,
    /// Free-form system description; its first word names the platform.
    #[serde(default)]
    pub sys_info: String,
}

impl BuildInfo {
    /// Platform string derived from the first word of `sys_info`.
    #[must_use]
    pub fn platform(&self) -> Option<String> {
        self.sys_info.split_whitespace().next().map(str::to_string)
    }
}

/// Request handed to the load generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchRequest {
    pub ops: Vec<Value>,
    pub seconds: u64,
    pub parallel: u32,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Load generator answer.
///
/// Generators either report a pre-summed total or one count per operation
/// category; both shapes deserialize into this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchResponse {
    #[serde(
        default,
        alias = "totalOps/s",
        alias = "totalOps",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_ops_per_second: Option<f64>,

    #[serde(default, alias = "errCount")]
    pub error_count: u64,

    /// Remaining fields, including per-category counts.
    #[serde(flatten)]
    pub counts: BTreeMap<String, Value>,
}

impl BenchResponse {
    /// Pre-summed response.
    #[must_use]
    pub fn total(ops_per_second: f64, error_count: u64) -> Self {
        Self {
            total_ops_per_second: Some(ops_per_second),
            error_count,
            counts: BTreeMap::new(),
        }
    }

    /// Per-category response.
    #[must_use]
    pub fn by_category<I, K>(counts: I, error_count: u64) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            total_ops_per_second: None,
            error_count,
            counts: counts
                .into_iter()
                .map(|(label, count)| (label.into(), Value::from(count)))
                .collect(),
        }
    }

    /// Total throughput of the trial.
    ///
    /// Uses the pre-summed total when present, otherwise sums `categories`.
    /// Categories missing from the response count as zero.
    ///
    /// # Errors
    ///
    /// Fails when neither a total nor any of the categories is present, or when
    /// a category holds a non-numeric value.
    pub fn throughput(&self, categories: &[String]) -> Result<f64, GeneratorError> {
        if let Some(total) = self.total_ops_per_second {
            return Ok(total);
        }

        let mut seen = 0_usize;
        let mut total = 0.0;
        for label in categories {
            let Some(raw) = self.counts.get(label) else {
                continue;
            };
            let count = raw.as_f64().ok_or_else(|| {
                GeneratorError::MalformedResponse(format!(
                    "category `{label}` is not numeric: {raw}"
                ))
            })?;
            total += count;
            seen += 1;
        }

        if seen == 0 {
            return Err(GeneratorError::MalformedResponse(format!(
                "response has neither a total nor any of the categories [{}]",
                categories.join(", ")
            )));
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn categories() -> Vec<String> {
        DEFAULT_THROUGHPUT_CATEGORIES.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn total_takes_precedence() {
        let response: BenchResponse =
            serde_json::from_value(json!({"totalOps/s": 1234.5, "insert": 1.0, "errCount": 2}))
                .unwrap();
        assert_eq!(response.throughput(&categories()).unwrap(), 1234.5);
        assert_eq!(response.error_count, 2);
    }

    #[test]
    fn categories_are_summed() {
        let response: BenchResponse = serde_json::from_value(json!({
            "insert": 100.0, "query": 50.0, "update": 0, "delete": 0,
            "getmore": 25, "command": 25, "note": "ignored", "error_count": 0
        }))
        .unwrap();
        assert_eq!(response.throughput(&categories()).unwrap(), 200.0);
    }

    #[test]
    fn extra_categories_are_configurable() {
        let response = BenchResponse::by_category([("insert", 10.0), ("bulkWrite", 5.0)], 0);
        let mut labels = categories();
        assert_eq!(response.throughput(&labels).unwrap(), 10.0);
        labels.push("bulkWrite".to_string());
        assert_eq!(response.throughput(&labels).unwrap(), 15.0);
    }

    #[test]
    fn empty_response_is_malformed() {
        let response = BenchResponse::default();
        assert!(matches!(
            response.throughput(&categories()),
            Err(GeneratorError::MalformedResponse(_))
        ));
    }

    #[test]
    fn platform_is_first_word_of_sys_info() {
        let info = BuildInfo {
            version: "7.0.0".into(),
            git_version: "abc".into(),
            sys_info: "Linux host 6.1 x86_64".into(),
        };
        assert_eq!(info.platform().as_deref(), Some("Linux"));
    }
}
