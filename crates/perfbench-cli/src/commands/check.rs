use std::process::ExitCode;

use anyhow::Result;
use perfbench_core::PerfbenchConfig;
use perfbench_runner::RegressionCheck;
use tracing::warn;

use super::read_report;
use crate::CheckArgs;

pub fn execute(args: CheckArgs) -> Result<ExitCode> {
    let threshold = match args.threshold {
        Some(threshold) => threshold,
        None => PerfbenchConfig::load()?.regression.threshold,
    };

    let baseline = read_report(&args.baseline)?;
    let current = read_report(&args.report)?;
    let summary = RegressionCheck::new(threshold).compare(&baseline, &current);

    for test in &summary.missing {
        warn!(test = %test, "no results in the checked report, skipping");
    }
    for regression in &summary.regressions {
        println!(
            "{}: regression found: drop from {:.2} to {:.2} ops/s ({:.1}%)",
            regression.test,
            regression.baseline_ops_per_sec,
            regression.current_ops_per_sec,
            regression.drop_fraction() * 100.0
        );
    }
    println!(
        "checked {} test(s), {} regression(s) at threshold {:.1}%",
        summary.compared.len(),
        summary.regressions.len(),
        threshold * 100.0
    );

    Ok(if summary.has_regressions() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
