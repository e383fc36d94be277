//! Result structures produced by a suite run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RunId;
use crate::options::{CrudOptions, FanoutParams};

/// Outcome of one successful trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Total operations per second reported by the load generator.
    pub throughput: f64,
    /// Operation errors counted by the load generator.
    pub error_count: u64,
}

/// Aggregate for one thread count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadResult {
    /// Mean throughput over the successful trials.
    pub ops_per_sec: f64,
    pub ops_per_sec_values: Vec<f64>,
    pub error_values: Vec<u64>,
    pub run_end_time: DateTime<Utc>,
}

impl ThreadResult {
    /// Builds the aggregate from successful trials; `None` when there are none.
    #[must_use]
    pub fn from_trials(trials: &[TrialResult], run_end_time: DateTime<Utc>) -> Option<Self> {
        let ops_per_sec_values: Vec<f64> = trials.iter().map(|trial| trial.throughput).collect();
        let ops_per_sec = mean(&ops_per_sec_values)?;
        Some(Self {
            ops_per_sec,
            ops_per_sec_values,
            error_values: trials.iter().map(|trial| trial.error_count).collect(),
            run_end_time,
        })
    }
}

/// Arithmetic mean, `None` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Results of one test case keyed by thread count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub name: String,
    #[serde(rename = "results")]
    pub per_thread_count: BTreeMap<u32, ThreadResult>,
}

impl AggregatedResult {
    /// Highest mean throughput over all thread counts.
    #[must_use]
    pub fn best_ops_per_sec(&self) -> Option<f64> {
        self.per_thread_count
            .values()
            .map(|result| result.ops_per_sec)
            .reduce(f64::max)
    }
}

/// Context needed to reproduce a failed trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub test: String,
    /// 1-based trial index.
    pub trial: u32,
    pub thread_count: u32,
    #[serde(flatten)]
    pub fanout: FanoutParams,
    /// Error classification, see `TrialError::kind`.
    pub kind: String,
    pub message: String,
}

/// Identification of the harness that produced a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessInfo {
    pub name: String,
    pub version: String,
}

impl Default for HarnessInfo {
    fn default() -> Self {
        Self {
            name: "perfbench".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Environment details attached to a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentMetadata {
    pub harness: HarnessInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub crud_options: CrudOptions,
    pub fanout: FanoutParams,
}

/// Complete output of a suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub run_id: RunId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub environment: EnvironmentMetadata,
    pub results: Vec<AggregatedResult>,
    pub errors: Vec<ErrorRecord>,
}

impl SuiteReport {
    /// Result entry for a test case, if it ran.
    #[must_use]
    pub fn result(&self, name: &str) -> Option<&AggregatedResult> {
        self.results.iter().find(|result| result.name == name)
    }
}
