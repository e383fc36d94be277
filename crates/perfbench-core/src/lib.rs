//! Core domain types and boundary traits for the perfbench harness.

pub mod case;
pub mod collection;
pub mod error;
pub mod filter;
pub mod ids;
pub mod metrics;
pub mod namespace;
pub mod options;
pub mod report;
pub mod settings;
pub mod traits;

pub use case::{AdminStep, AdminSteps, CaseHook, Environment, TestCase, TestCatalog};
pub use collection::CollectionHandle;
pub use error::{AdminError, ConfigError, ConfigResult, GeneratorError, TrialError};
pub use filter::{should_run, FilterSpec};
pub use ids::RunId;
pub use options::{
    CrudOptions, FanoutParams, RunParams, ShardMode, WriteAcknowledgement, WriteConcern,
};
pub use report::{
    AggregatedResult, EnvironmentMetadata, ErrorRecord, HarnessInfo, SuiteReport, ThreadResult,
    TrialResult,
};
pub use settings::PerfbenchConfig;
pub use traits::{AdminClient, BenchRequest, BenchResponse, BuildInfo, LoadGenerator};
