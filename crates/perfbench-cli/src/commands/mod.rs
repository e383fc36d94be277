pub mod check;
pub mod extract;
pub mod run;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use perfbench_core::SuiteReport;
use perfbench_runner::{extract_report, ReportError};

/// Reads a report stored either as plain JSON or inside captured output.
pub fn read_report(path: &Path) -> Result<SuiteReport> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match extract_report(&text) {
        Ok(report) => Ok(report),
        Err(ReportError::MissingStart) => serde_json::from_str(&text)
            .with_context(|| format!("{} is not a perfbench report", path.display())),
        Err(err) => Err(err).with_context(|| format!("failed to extract report from {}", path.display())),
    }
}
