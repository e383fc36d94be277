//! Orchestration layer of the perfbench harness.
//! Plans fan-out, runs trials, aggregates results and emits reports.

pub mod aggregator;
pub mod emit;
mod error;
pub mod fanout;
pub mod loader;
pub mod memory;
pub mod regression;
pub mod suite;
pub mod trial;

pub use aggregator::ResultAggregator;
pub use emit::{extract_report, render_report, write_report, Narrator, ReportError};
pub use error::{HarnessError, HarnessResult};
pub use fanout::{normalize_name, ExecutionFanout, ExecutionPlan, Slot};
pub use loader::CatalogLoader;
pub use memory::{AdminCall, InMemoryAdmin, SimulatedGenerator};
pub use regression::{Regression, RegressionCheck, RegressionSummary};
pub use suite::{Selection, SuiteDriver};
pub use trial::{QuiescePolicy, Target, TrialRunner};
