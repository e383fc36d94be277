//! Thread-count by trial matrix for a single test case.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use perfbench_core::{
    AggregatedResult, ConfigResult, ErrorRecord, RunParams, TestCase, ThreadResult, TrialResult,
};
use tracing::{info, warn};

use crate::emit::Narrator;
use crate::error::{HarnessError, HarnessResult};
use crate::fanout::ExecutionFanout;
use crate::trial::TrialRunner;

/// Runs a test case over every thread count and trial and averages the results.
pub struct ResultAggregator {
    runner: TrialRunner,
    fanout: ExecutionFanout,
}

impl ResultAggregator {
    pub fn new(runner: TrialRunner, fanout: ExecutionFanout) -> Self {
        Self { runner, fanout }
    }

    pub fn runner(&self) -> &TrialRunner {
        &self.runner
    }

    /// Aggregates `case` under `params`.
    ///
    /// Trials run sequentially on a fresh plan each. A failed trial becomes
    /// an [`ErrorRecord`] and is left out of the mean; a thread count whose
    /// trials all failed is left out of the result. Repeated thread counts
    /// add their trials to the same entry.
    ///
    /// # Errors
    ///
    /// Only configuration errors are returned; they abort the whole run.
    pub async fn aggregate(
        &self,
        case: &TestCase,
        params: &RunParams,
        narrator: &Narrator,
    ) -> ConfigResult<(AggregatedResult, Vec<ErrorRecord>)> {
        let mut collected: BTreeMap<u32, (Vec<TrialResult>, DateTime<Utc>)> = BTreeMap::new();
        let mut errors = Vec::new();

        for &threads in &params.thread_counts {
            let mut trials = Vec::with_capacity(params.trial_count as usize);

            for trial in 1..=params.trial_count {
                match self.run_one(case, params, threads, trial).await {
                    Ok(result) => trials.push(result),
                    Err(HarnessError::Config(err)) => return Err(err),
                    Err(HarnessError::Trial(err)) => {
                        warn!(test = %case.name, threads, trial, error = %err, "recording trial error");
                        errors.push(ErrorRecord {
                            test: case.name.clone(),
                            trial,
                            thread_count: threads,
                            fanout: params.fanout,
                            kind: err.kind().to_string(),
                            message: err.to_string(),
                        });
                    }
                }
            }

            let run_end_time = Utc::now();
            match ThreadResult::from_trials(&trials, run_end_time) {
                Some(summary) => {
                    narrator.line(&format!("\t{threads}\t{}", summary.ops_per_sec));
                    info!(test = %case.name, threads, ops_per_sec = summary.ops_per_sec, "thread count finished");
                }
                None => warn!(test = %case.name, threads, "every trial failed"),
            }

            let entry = collected
                .entry(threads)
                .or_insert_with(|| (Vec::new(), run_end_time));
            entry.0.extend(trials);
            entry.1 = run_end_time;
        }

        let per_thread_count = collected
            .into_iter()
            .filter_map(|(threads, (trials, end))| {
                ThreadResult::from_trials(&trials, end).map(|result| (threads, result))
            })
            .collect();

        Ok((
            AggregatedResult {
                name: case.name.clone(),
                per_thread_count,
            },
            errors,
        ))
    }

    async fn run_one(
        &self,
        case: &TestCase,
        params: &RunParams,
        threads: u32,
        trial: u32,
    ) -> HarnessResult<TrialResult> {
        let plan = self.fanout.build_plan(case, params.fanout, &params.crud)?;
        Ok(self
            .runner
            .run_trial(&plan, params.seconds, threads, trial)
            .await?)
    }
}
