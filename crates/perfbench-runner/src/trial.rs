//! Execution of a single timed trial.

use std::sync::Arc;
use std::time::{Duration, Instant};

use perfbench_core::metrics::{QUIESCE_RETRIES, TRIALS_TOTAL, TRIAL_DURATION, TRIAL_THROUGHPUT};
use perfbench_core::settings::{QuiesceConfig, TargetConfig};
use perfbench_core::traits::DEFAULT_THROUGHPUT_CATEGORIES;
use perfbench_core::{AdminClient, BenchRequest, LoadGenerator, TrialError, TrialResult};
use tracing::{debug, info, warn};

use crate::fanout::ExecutionPlan;

/// Bounded polling of pending collection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuiescePolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for QuiescePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            interval: Duration::from_millis(100),
        }
    }
}

impl From<&QuiesceConfig> for QuiescePolicy {
    fn from(config: &QuiesceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            interval: config.interval(),
        }
    }
}

/// Address and credentials the load generator connects with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for Target {
    fn default() -> Self {
        Self::from(&TargetConfig::default())
    }
}

impl From<&TargetConfig> for Target {
    fn from(config: &TargetConfig) -> Self {
        Self {
            host: config.address(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

/// Runs one plan at one concurrency level.
///
/// A trial moves through setup, quiesce, measure, teardown and cleanup.
/// Nothing is retried: the first failure ends the trial.
pub struct TrialRunner {
    admin: Arc<dyn AdminClient>,
    generator: Arc<dyn LoadGenerator>,
    target: Target,
    categories: Vec<String>,
    quiesce: QuiescePolicy,
}

impl TrialRunner {
    pub fn new(admin: Arc<dyn AdminClient>, generator: Arc<dyn LoadGenerator>) -> Self {
        Self {
            admin,
            generator,
            target: Target::default(),
            categories: DEFAULT_THROUGHPUT_CATEGORIES
                .iter()
                .map(|label| label.to_string())
                .collect(),
            quiesce: QuiescePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Category labels summed when the generator reports no total.
    #[must_use]
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    #[must_use]
    pub fn with_quiesce(mut self, policy: QuiescePolicy) -> Self {
        self.quiesce = policy;
        self
    }

    pub fn admin(&self) -> &Arc<dyn AdminClient> {
        &self.admin
    }

    /// Runs `plan` for `seconds` with `thread_count` generator workers.
    ///
    /// `trial` is the 1-based trial index handed to the hooks.
    ///
    /// # Errors
    ///
    /// Returns the first admin, hook, quiesce or generator failure.
    pub async fn run_trial(
        &self,
        plan: &ExecutionPlan,
        seconds: u64,
        thread_count: u32,
        trial: u32,
    ) -> Result<TrialResult, TrialError> {
        let started = Instant::now();
        let outcome = self.execute(plan, seconds, thread_count, trial).await;
        TRIAL_DURATION.observe(started.elapsed().as_secs_f64());

        match &outcome {
            Ok(result) => {
                TRIALS_TOTAL.with_label_values(&["ok"]).inc();
                TRIAL_THROUGHPUT
                    .with_label_values(&[plan.test.as_str(), thread_count.to_string().as_str()])
                    .set(result.throughput);
                info!(
                    test = %plan.test,
                    threads = thread_count,
                    trial,
                    throughput = result.throughput,
                    errors = result.error_count,
                    "trial finished"
                );
            }
            Err(err) => {
                TRIALS_TOTAL.with_label_values(&[err.kind()]).inc();
                warn!(
                    test = %plan.test,
                    threads = thread_count,
                    trial,
                    error = %err,
                    "trial failed"
                );
            }
        }
        outcome
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        seconds: u64,
        thread_count: u32,
        trial: u32,
    ) -> Result<TrialResult, TrialError> {
        // Clear leftovers of an aborted trial.
        for slot in &plan.slots {
            self.admin.drop_collection(&slot.collection).await?;
        }

        match self.run_phases(plan, seconds, thread_count, trial).await {
            Ok(result) => Ok(result),
            Err(err) => {
                self.discard(plan).await;
                Err(err)
            }
        }
    }

    async fn run_phases(
        &self,
        plan: &ExecutionPlan,
        seconds: u64,
        thread_count: u32,
        trial: u32,
    ) -> Result<TrialResult, TrialError> {
        let admin = self.admin.as_ref();
        let databases = plan.databases();

        // Setup
        if let Some(hook) = &plan.setup {
            for slot in &plan.slots {
                hook.run(admin, &slot.collection, &slot.environment(thread_count, trial))
                    .await?;
            }
        }
        plan.provision(admin).await?;

        // Quiesce
        self.quiesce(&databases).await?;
        admin.fsync().await?;

        // Measure
        let request = BenchRequest {
            ops: plan.operations.clone(),
            seconds,
            parallel: thread_count,
            host: self.target.host.clone(),
            username: self.target.username.clone(),
            password: self.target.password.clone(),
        };
        debug!(test = %plan.test, threads = thread_count, trial, "starting measurement");
        let response = self.generator.run(&request).await?;
        let result = TrialResult {
            throughput: response.throughput(&self.categories)?,
            error_count: response.error_count,
        };

        // Teardown
        if let Some(hook) = &plan.teardown {
            for slot in &plan.slots {
                hook.run(admin, &slot.collection, &slot.environment(thread_count, trial))
                    .await?;
            }
        }

        // Cleanup
        for slot in &plan.slots {
            admin.drop_collection(&slot.collection).await?;
        }
        self.quiesce(&databases).await?;

        Ok(result)
    }

    /// Best-effort drop of every slot collection after a failed trial.
    async fn discard(&self, plan: &ExecutionPlan) {
        for slot in &plan.slots {
            if let Err(err) = self.admin.drop_collection(&slot.collection).await {
                warn!(
                    test = %plan.test,
                    namespace = %slot.collection.full_namespace(),
                    error = %err,
                    "failed to drop collection after trial failure"
                );
            }
        }
    }

    /// Polls until no drop is pending in `databases`.
    async fn quiesce(&self, databases: &[String]) -> Result<(), TrialError> {
        let mut attempts = 0;
        loop {
            let pending = self.admin.pending_drops(databases).await?;
            attempts += 1;
            if pending.is_empty() {
                return Ok(());
            }
            if attempts >= self.quiesce.max_attempts {
                return Err(TrialError::QuiesceTimeout { attempts, pending });
            }
            QUIESCE_RETRIES.inc();
            debug!(attempts, pending = pending.len(), "waiting for pending drops");
            tokio::time::sleep(self.quiesce.interval).await;
        }
    }
}
