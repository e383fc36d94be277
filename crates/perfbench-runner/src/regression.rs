//! Baseline comparison of suite reports.

use perfbench_core::SuiteReport;
use serde::Serialize;

/// Default fractional drop that counts as a regression.
pub const DEFAULT_THRESHOLD: f64 = 0.10;

/// A test whose best throughput fell below the allowed bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Regression {
    pub test: String,
    pub baseline_ops_per_sec: f64,
    pub current_ops_per_sec: f64,
}

impl Regression {
    /// Relative drop, `0.25` meaning 25 percent slower.
    #[must_use]
    pub fn drop_fraction(&self) -> f64 {
        (self.baseline_ops_per_sec - self.current_ops_per_sec) / self.baseline_ops_per_sec
    }
}

/// Outcome of a baseline comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegressionSummary {
    /// Tests present in both reports with usable results.
    pub compared: Vec<String>,
    /// Tests in the baseline without results in the current report.
    pub missing: Vec<String>,
    pub regressions: Vec<Regression>,
}

impl RegressionSummary {
    #[must_use]
    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }
}

/// Flags tests whose best mean throughput dropped by more than `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionCheck {
    threshold: f64,
}

impl Default for RegressionCheck {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl RegressionCheck {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Compares `current` against `baseline`.
    ///
    /// The best throughput of a test is its maximum mean over all thread
    /// counts. Tests absent from the baseline are ignored.
    #[must_use]
    pub fn compare(&self, baseline: &SuiteReport, current: &SuiteReport) -> RegressionSummary {
        let mut summary = RegressionSummary::default();

        for base in &baseline.results {
            let Some(baseline_best) = base.best_ops_per_sec() else {
                continue;
            };
            let Some(current_best) = current
                .result(&base.name)
                .and_then(|result| result.best_ops_per_sec())
            else {
                summary.missing.push(base.name.clone());
                continue;
            };

            summary.compared.push(base.name.clone());
            if baseline_best - current_best > self.threshold * baseline_best {
                summary.regressions.push(Regression {
                    test: base.name.clone(),
                    baseline_ops_per_sec: baseline_best,
                    current_ops_per_sec: current_best,
                });
            }
        }
        summary
    }
}
