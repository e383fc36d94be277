//! Configuration management for perfbench
//!
//! Settings are layered, lowest priority first:
//! - Hardcoded defaults
//! - /etc/perfbench/perfbench.{yaml,toml,json}
//! - ./config/perfbench.{yaml,toml,json}
//! - The file named by the PERFBENCH_CONFIG env var
//! - Environment variables (PERFBENCH__RUN__TRIAL_COUNT=3)

use std::path::Path;
use std::time::Duration;

use ::config::{Config, ConfigBuilder, Environment, File};
use ::config::builder::DefaultState;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::filter::FilterSpec;
use crate::options::{CrudOptions, FanoutParams, RunParams, ShardMode};
use crate::traits::DEFAULT_THROUGHPUT_CATEGORIES;

/// Root configuration structure for perfbench
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PerfbenchConfig {
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub crud: CrudOptions,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub quiesce: QuiesceConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub regression: RegressionConfig,
}

impl PerfbenchConfig {
    /// Load configuration from defaults, files and environment variables.
    pub fn load() -> ConfigResult<Self> {
        let mut builder = Self::set_defaults(Config::builder())?;

        builder = builder
            .add_source(File::with_name("/etc/perfbench/perfbench").required(false))
            .add_source(File::with_name("./config/perfbench").required(false));

        if let Ok(config_path) = std::env::var("PERFBENCH_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("PERFBENCH")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("run.thread_counts")
                .with_list_parse_key("generator.throughput_categories")
                .try_parsing(true),
        );

        let config: PerfbenchConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path on top of the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let config: PerfbenchConfig = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ::config::ConfigError> {
        builder
            // Target
            .set_default("target.host", "localhost")?
            .set_default("target.port", 27017)?
            // Agent
            .set_default("agent.endpoint", "http://localhost:8642")?
            .set_default("agent.timeout_secs", 30)?
            // Run matrix
            .set_default("run.trial_count", 1)?
            .set_default("run.trial_seconds", 5)?
            .set_default("run.multidb", 1)?
            .set_default("run.multicoll", 1)?
            .set_default("run.shard", 0)?
            // Quiesce
            .set_default("quiesce.max_attempts", 100)?
            .set_default("quiesce.interval_ms", 100)?
            // Fan-out
            .set_default("fanout.database_prefix", "test")?
            // Regression check
            .set_default("regression.threshold", 0.1)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        self.run_params()?.validate()?;

        if self.quiesce.max_attempts == 0 {
            return Err(ConfigError::invalid_setting(
                "quiesce.max_attempts must be > 0",
            ));
        }

        if self.fanout.database_prefix.is_empty() {
            return Err(ConfigError::invalid_setting(
                "fanout.database_prefix must not be empty",
            ));
        }

        if self.generator.throughput_categories.is_empty() {
            return Err(ConfigError::invalid_setting(
                "generator.throughput_categories must not be empty",
            ));
        }

        if !(0.0..1.0).contains(&self.regression.threshold) {
            return Err(ConfigError::invalid_setting(
                "regression.threshold must be in [0, 1)",
            ));
        }

        Ok(())
    }

    /// Run parameters described by the `run` and `crud` sections.
    pub fn run_params(&self) -> ConfigResult<RunParams> {
        Ok(RunParams {
            thread_counts: self.run.thread_counts.clone(),
            trial_count: self.run.trial_count,
            seconds: self.run.trial_seconds,
            fanout: FanoutParams {
                multidb: self.run.multidb,
                multicoll: self.run.multicoll,
                shard: ShardMode::try_from(self.run.shard)?,
            },
            crud: self.crud.clone(),
        })
    }
}

/// Server under test
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    pub host: String,

    pub port: u16,

    #[serde(default)]
    pub replica_set: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
            replica_set: None,
            username: None,
            password: None,
        }
    }
}

impl TargetConfig {
    /// Connection string handed to the load generator.
    pub fn address(&self) -> String {
        match &self.replica_set {
            Some(set) => format!("{set}/{}:{}", self.host, self.port),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}

/// HTTP agent that fronts the load generator and admin primitives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub endpoint: String,

    /// Request timeout on top of the trial duration
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8642".to_string(),
            timeout_secs: 30,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Trial matrix
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_thread_counts")]
    pub thread_counts: Vec<u32>,

    pub trial_count: u32,

    /// Measurement window per trial in seconds
    pub trial_seconds: u64,

    pub multidb: u32,

    pub multicoll: u32,

    /// 0 - no shard, 1 - shard with {_id: hashed}, 2 - shard with {_id: 1}
    pub shard: i64,
}

fn default_thread_counts() -> Vec<u32> {
    vec![1, 2, 4, 8, 12, 16]
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_counts: default_thread_counts(),
            trial_count: 1,
            trial_seconds: 5,
            multidb: 1,
            multicoll: 1,
            shard: 0,
        }
    }
}

/// Test selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default = "default_include")]
    pub include: FilterSpec,

    #[serde(default)]
    pub exclude: Option<FilterSpec>,
}

fn default_include() -> FilterSpec {
    FilterSpec::AnyOf(vec!["sanity".to_string()])
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: None,
        }
    }
}

/// Pending-drop polling before and after measurement
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuiesceConfig {
    /// Polls before the trial is failed
    pub max_attempts: u32,

    /// Sleep between polls in milliseconds
    pub interval_ms: u64,
}

impl Default for QuiesceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            interval_ms: 100,
        }
    }
}

impl QuiesceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Fan-out naming
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FanoutConfig {
    /// Databases are named `{prefix}{index}`
    pub database_prefix: String,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            database_prefix: "test".to_string(),
        }
    }
}

/// Load generator result interpretation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratorConfig {
    /// Category labels summed when no pre-summed total is reported
    #[serde(default = "default_categories")]
    pub throughput_categories: Vec<String>,
}

fn default_categories() -> Vec<String> {
    DEFAULT_THROUGHPUT_CATEGORIES
        .iter()
        .map(|label| label.to_string())
        .collect()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            throughput_categories: default_categories(),
        }
    }
}

/// Baseline comparison
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegressionConfig {
    /// Fractional drop of the best throughput that counts as a regression
    pub threshold: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self { threshold: 0.1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = PerfbenchConfig::default();

        assert_eq!(config.target.address(), "localhost:27017");
        assert_eq!(config.run.thread_counts, vec![1, 2, 4, 8, 12, 16]);
        assert_eq!(config.run.trial_count, 1);
        assert_eq!(config.run.trial_seconds, 5);
        assert_eq!(config.quiesce.max_attempts, 100);
        assert_eq!(config.quiesce.interval().as_millis(), 100);
        assert_eq!(config.fanout.database_prefix, "test");
        assert_eq!(config.generator.throughput_categories.len(), 6);
        assert_eq!(
            config.filter.include,
            FilterSpec::AnyOf(vec!["sanity".to_string()])
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_params_from_config() {
        let mut config = PerfbenchConfig::default();
        config.run.multidb = 2;
        config.run.shard = 1;

        let params = config.run_params().unwrap();
        assert_eq!(params.fanout.multidb, 2);
        assert_eq!(params.fanout.shard, ShardMode::Hashed);
        assert_eq!(params.seconds, 5);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PerfbenchConfig::default();

        config.run.shard = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidShardMode(5))
        ));
        config.run.shard = 0;

        config.quiesce.max_attempts = 0;
        assert!(config.validate().is_err());
        config.quiesce.max_attempts = 10;

        config.run.trial_count = 0;
        assert!(config.validate().is_err());
        config.run.trial_count = 1;

        config.regression.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_replica_set_address() {
        let target = TargetConfig {
            replica_set: Some("rs0".into()),
            ..TargetConfig::default()
        };
        assert_eq!(target.address(), "rs0/localhost:27017");
    }
}
