//! Run parameters shared by the fan-out, trial and aggregation stages.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ConfigError, ConfigResult};

/// Acknowledgement level of the `w` write-concern field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WriteAcknowledgement {
    /// Number of nodes that must acknowledge.
    Nodes(u32),
    /// Named acknowledgement mode such as `"majority"`.
    Tag(String),
}

impl Default for WriteAcknowledgement {
    fn default() -> Self {
        Self::Nodes(0)
    }
}

/// Write concern applied to every write operation of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConcern {
    #[serde(default)]
    pub w: WriteAcknowledgement,

    /// Journal acknowledgement. String values `"true"`/`"false"` are accepted.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub j: bool,
}

/// Flags controlling write acknowledgement and command-vs-legacy operation style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrudOptions {
    /// Request a synchronous acknowledgement after every operation.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub safe: bool,

    #[serde(default)]
    pub write_concern: WriteConcern,

    /// Use write commands instead of legacy write operations.
    #[serde(default = "default_true", deserialize_with = "deserialize_flag")]
    pub write_cmd: bool,

    /// Use find/getMore commands instead of legacy read operations.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub read_cmd: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CrudOptions {
    fn default() -> Self {
        Self {
            safe: false,
            write_concern: WriteConcern::default(),
            write_cmd: true,
            read_cmd: false,
        }
    }
}

impl CrudOptions {
    /// Writes the options into a prepared operation, overriding declared values.
    pub fn apply(&self, operation: &mut Map<String, Value>) {
        operation.insert("safe".to_string(), Value::Bool(self.safe));
        operation.insert(
            "writeConcern".to_string(),
            json!({ "w": self.write_concern.w, "j": self.write_concern.j }),
        );
        operation.insert("writeCmd".to_string(), Value::Bool(self.write_cmd));
        operation.insert("readCmd".to_string(), Value::Bool(self.read_cmd));
    }
}

/// Parses a boolean flag given either as a JSON boolean or as a string.
///
/// # Errors
///
/// Fails for strings other than `true`/`false` (case-insensitive).
pub fn parse_flag(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(format!("expected `true` or `false`, got `{other}`")),
        },
        other => Err(format!("expected a boolean, got `{other}`")),
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    parse_flag(&raw).map_err(de::Error::custom)
}

/// Sharding action taken on every fan-out collection before measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ShardMode {
    /// Leave collections unsharded.
    #[default]
    None,
    /// Build a hashed `_id` index and shard on `{_id: "hashed"}`.
    Hashed,
    /// Shard on `{_id: 1}`.
    Ranged,
}

impl ShardMode {
    /// Shard key document, if the mode shards at all.
    #[must_use]
    pub fn shard_key(&self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Hashed => Some(json!({ "_id": "hashed" })),
            Self::Ranged => Some(json!({ "_id": 1 })),
        }
    }
}

impl TryFrom<i64> for ShardMode {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Hashed),
            2 => Ok(Self::Ranged),
            other => Err(ConfigError::InvalidShardMode(other)),
        }
    }
}

impl From<ShardMode> for i64 {
    fn from(mode: ShardMode) -> Self {
        match mode {
            ShardMode::None => 0,
            ShardMode::Hashed => 1,
            ShardMode::Ranged => 2,
        }
    }
}

/// Fan-out shape: how many databases and collections each operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutParams {
    pub multidb: u32,
    pub multicoll: u32,
    #[serde(default)]
    pub shard: ShardMode,
}

impl Default for FanoutParams {
    fn default() -> Self {
        Self {
            multidb: 1,
            multicoll: 1,
            shard: ShardMode::None,
        }
    }
}

impl FanoutParams {
    /// Number of (database, collection) slots.
    #[must_use]
    pub const fn slot_count(&self) -> usize {
        self.multidb as usize * self.multicoll as usize
    }
}

/// Complete parameter set for one suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Concurrency levels, processed in the given order.
    pub thread_counts: Vec<u32>,
    pub trial_count: u32,
    /// Measurement window of each trial.
    pub seconds: u64,
    pub fanout: FanoutParams,
    pub crud: CrudOptions,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            thread_counts: vec![1, 2, 4, 8, 12, 16],
            trial_count: 1,
            seconds: 5,
            fanout: FanoutParams::default(),
            crud: CrudOptions::default(),
        }
    }
}

impl RunParams {
    /// Rejects parameter sets that cannot produce a measurement.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] describing the first violation.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.thread_counts.is_empty() {
            return Err(ConfigError::invalid_setting(
                "at least one thread count is required",
            ));
        }
        if self.thread_counts.contains(&0) {
            return Err(ConfigError::invalid_setting("thread counts must be > 0"));
        }
        if self.trial_count == 0 {
            return Err(ConfigError::invalid_setting("trial count must be > 0"));
        }
        if self.seconds == 0 {
            return Err(ConfigError::invalid_setting("trial time must be > 0 seconds"));
        }
        if self.fanout.multidb == 0 || self.fanout.multicoll == 0 {
            return Err(ConfigError::invalid_setting(
                "multidb and multicoll must be > 0",
            ));
        }
        Ok(())
    }
}
