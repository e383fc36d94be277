//! Suite-level driver: selection, per-case aggregation and report assembly.

use std::sync::Arc;

use chrono::Utc;
use perfbench_core::{
    should_run, AdminClient, ConfigResult, EnvironmentMetadata, FilterSpec, HarnessInfo,
    LoadGenerator, PerfbenchConfig, RunId, RunParams, SuiteReport, TestCatalog,
};
use tracing::{debug, info, warn};

use crate::aggregator::ResultAggregator;
use crate::emit::Narrator;
use crate::fanout::ExecutionFanout;
use crate::trial::{QuiescePolicy, Target, TrialRunner};

/// Include/exclude filters applied to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub include: FilterSpec,
    pub exclude: Option<FilterSpec>,
}

impl From<&PerfbenchConfig> for Selection {
    fn from(config: &PerfbenchConfig) -> Self {
        Self {
            include: config.filter.include.clone(),
            exclude: config.filter.exclude.clone(),
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            include: FilterSpec::All,
            exclude: None,
        }
    }
}

/// Runs every selected test case of a catalog, in catalog order.
pub struct SuiteDriver {
    aggregator: ResultAggregator,
    narrator: Narrator,
}

impl SuiteDriver {
    pub fn new(aggregator: ResultAggregator, narrator: Narrator) -> Self {
        Self {
            aggregator,
            narrator,
        }
    }

    /// Wires a driver from settings and the two external boundaries.
    pub fn from_config(
        config: &PerfbenchConfig,
        admin: Arc<dyn AdminClient>,
        generator: Arc<dyn LoadGenerator>,
        narrator: Narrator,
    ) -> Self {
        let runner = TrialRunner::new(admin, generator)
            .with_target(Target::from(&config.target))
            .with_categories(config.generator.throughput_categories.clone())
            .with_quiesce(QuiescePolicy::from(&config.quiesce));
        let fanout = ExecutionFanout::new(config.fanout.database_prefix.clone());
        Self::new(ResultAggregator::new(runner, fanout), narrator)
    }

    /// Runs the suite and assembles its report.
    ///
    /// Trial failures end up in `SuiteReport::errors`. Server metadata that
    /// cannot be fetched is left empty.
    ///
    /// # Errors
    ///
    /// Invalid run parameters or declaration defects abort the run.
    pub async fn run(
        &self,
        catalog: &TestCatalog,
        params: &RunParams,
        selection: &Selection,
    ) -> ConfigResult<SuiteReport> {
        params.validate()?;

        let run_id = RunId::new();
        let start_time = Utc::now();
        info!(%run_id, tests = catalog.len(), "starting suite");

        let mut results = Vec::new();
        let mut errors = Vec::new();

        self.narrator.start();
        for case in catalog {
            if !should_run(case, &selection.include, selection.exclude.as_ref()) {
                debug!(test = %case.name, "skipped by filter");
                continue;
            }

            self.narrator.line(&case.name);
            info!(test = %case.name, "running test");
            let (result, case_errors) = self.aggregator.aggregate(case, params, &self.narrator).await?;
            results.push(result);
            errors.extend(case_errors);
        }
        self.narrator.end();

        let end_time = Utc::now();
        let environment = self.environment_metadata(params).await;
        info!(
            %run_id,
            tests = results.len(),
            errors = errors.len(),
            "suite finished"
        );

        Ok(SuiteReport {
            run_id,
            start_time,
            end_time,
            environment,
            results,
            errors,
        })
    }

    async fn environment_metadata(&self, params: &RunParams) -> EnvironmentMetadata {
        let mut metadata = EnvironmentMetadata {
            harness: HarnessInfo::default(),
            server_version: None,
            git_version: None,
            platform: None,
            crud_options: params.crud.clone(),
            fanout: params.fanout,
        };

        match self.aggregator.runner().admin().build_info().await {
            Ok(info) => {
                metadata.platform = info.platform();
                metadata.server_version = Some(info.version);
                metadata.git_version = Some(info.git_version);
            }
            Err(err) => warn!(error = %err, "could not fetch server build info"),
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryAdmin, SimulatedGenerator};
    use perfbench_core::{BuildInfo, TestCase};
    use serde_json::json;

    fn driver(admin: Arc<InMemoryAdmin>) -> (SuiteDriver, crate::emit::CapturedOutput) {
        let (narrator, output) = Narrator::capture();
        let runner = TrialRunner::new(admin, Arc::new(SimulatedGenerator::new(50.0)));
        (
            SuiteDriver::new(
                ResultAggregator::new(runner, ExecutionFanout::default()),
                narrator,
            ),
            output,
        )
    }

    fn catalog() -> TestCatalog {
        let mut catalog = TestCatalog::new();
        for (name, tag) in [("Insert.A", "insert"), ("Query.B", "query"), ("Insert.C", "insert")] {
            catalog
                .push(
                    TestCase::new(name)
                        .with_tags([tag])
                        .with_operation(json!({"op": "insert", "doc": {}})),
                )
                .unwrap();
        }
        catalog
    }

    fn params() -> RunParams {
        RunParams {
            thread_counts: vec![1],
            seconds: 1,
            ..RunParams::default()
        }
    }

    #[tokio::test]
    async fn selected_cases_run_in_catalog_order() {
        let (driver, output) = driver(Arc::new(InMemoryAdmin::new()));
        let selection = Selection {
            include: FilterSpec::AnyOf(vec!["insert".into()]),
            exclude: None,
        };

        let report = driver.run(&catalog(), &params(), &selection).await.unwrap();

        let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Insert.A", "Insert.C"]);
        assert_eq!(
            output.contents(),
            "@@@START@@@\nInsert.A\n\t1\t50\nInsert.C\n\t1\t50\n@@@END@@@\n"
        );
        assert!(report.start_time <= report.end_time);
    }

    #[tokio::test]
    async fn metadata_comes_from_build_info() {
        let admin = Arc::new(InMemoryAdmin::new().with_build_info(BuildInfo {
            version: "7.0.2".into(),
            git_version: "deadbeef".into(),
            sys_info: "Linux box 6.1".into(),
        }));
        let (driver, _) = driver(admin);

        let report = driver
            .run(&TestCatalog::new(), &params(), &Selection::default())
            .await
            .unwrap();

        assert_eq!(report.environment.server_version.as_deref(), Some("7.0.2"));
        assert_eq!(report.environment.git_version.as_deref(), Some("deadbeef"));
        assert_eq!(report.environment.platform.as_deref(), Some("Linux"));
        assert_eq!(report.environment.harness.name, "perfbench");
    }

    #[tokio::test]
    async fn metadata_failure_does_not_abort() {
        let admin = Arc::new(InMemoryAdmin::new());
        admin.fail_next("build_info", "unauthorized");
        let (driver, _) = driver(admin);

        let report = driver
            .run(&catalog(), &params(), &Selection::default())
            .await
            .unwrap();

        assert_eq!(report.results.len(), 3);
        assert!(report.environment.server_version.is_none());
    }

    #[tokio::test]
    async fn invalid_params_abort_before_running() {
        let admin = Arc::new(InMemoryAdmin::new());
        let (driver, output) = driver(admin.clone());
        let mut params = params();
        params.trial_count = 0;

        assert!(driver
            .run(&catalog(), &params, &Selection::default())
            .await
            .is_err());
        assert!(admin.calls().is_empty());
        assert!(output.contents().is_empty());
    }

    #[tokio::test]
    async fn config_wiring_uses_database_prefix() {
        let mut config = PerfbenchConfig::default();
        config.fanout.database_prefix = "perf".into();
        config.run.thread_counts = vec![2];
        config.run.trial_seconds = 1;
        let admin = Arc::new(InMemoryAdmin::new());
        let generator = Arc::new(SimulatedGenerator::default());

        let driver = SuiteDriver::from_config(&config, admin.clone(), generator.clone(), Narrator::silent());
        driver
            .run(&catalog(), &config.run_params().unwrap(), &Selection::default())
            .await
            .unwrap();

        let requests = generator.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].ops[0]["ns"], "perf0.Insert_A0");
        assert_eq!(requests[0].parallel, 2);
    }
}
