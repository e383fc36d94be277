use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use perfbench_runner::extract_report;

use crate::ExtractArgs;

pub fn execute(args: ExtractArgs) -> Result<ExitCode> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let report = extract_report(&text)
        .with_context(|| format!("no report found in {}", args.input.display()))?;
    let body = serde_json::to_string_pretty(&report)?;

    match &args.out {
        Some(out) => {
            fs::write(out, body).with_context(|| format!("failed to write {}", out.display()))?
        }
        None => println!("{body}"),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfbench_core::{EnvironmentMetadata, RunId, SuiteReport};
    use perfbench_runner::render_report;
    use tempfile::TempDir;

    #[test]
    fn extracts_into_file() {
        let dir = TempDir::new().unwrap();
        let report = SuiteReport {
            run_id: RunId::new(),
            start_time: "2024-05-01T00:00:00Z".parse().unwrap(),
            end_time: "2024-05-01T00:10:00Z".parse().unwrap(),
            environment: EnvironmentMetadata::default(),
            results: Vec::new(),
            errors: Vec::new(),
        };
        let input = dir.path().join("console.log");
        let out = dir.path().join("report.json");
        fs::write(
            &input,
            format!("@@@START@@@\nInsert\n@@@END@@@\n{}", render_report(&report).unwrap()),
        )
        .unwrap();

        execute(ExtractArgs {
            input,
            out: Some(out.clone()),
        })
        .unwrap();

        let written: SuiteReport = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(written, report);
    }
}
