//! Console narration and sentinel-delimited report output.
//!
//! Everything downstream tooling parses is written between sentinel lines so
//! it can be recovered from output mixed with other text.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use perfbench_core::SuiteReport;
use thiserror::Error;
use tracing::warn;

pub const NARRATION_START: &str = "@@@START@@@";
pub const NARRATION_END: &str = "@@@END@@@";
pub const RESULTS_START: &str = "@@@RESULTS_START@@@";
pub const RESULTS_END: &str = "@@@RESULTS_END@@@";

/// Report emission and extraction errors.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("`@@@RESULTS_START@@@` not found in input")]
    MissingStart,

    #[error("`@@@RESULTS_END@@@` not found after `@@@RESULTS_START@@@`")]
    MissingEnd,

    #[error("report is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Line-oriented progress output shared by the suite stages.
pub struct Narrator {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Narrator {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Discards all narration.
    pub fn silent() -> Self {
        Self::new(Box::new(io::sink()))
    }

    /// Narrator writing into a buffer readable through the returned handle.
    pub fn capture() -> (Self, CapturedOutput) {
        let captured = CapturedOutput::default();
        (Self::new(Box::new(captured.clone())), captured)
    }

    pub fn start(&self) {
        self.line(NARRATION_START);
    }

    pub fn end(&self) {
        self.line(NARRATION_END);
    }

    /// Writes one line. Failures are logged, never raised.
    pub fn line(&self, text: &str) {
        let mut sink = self.sink.lock();
        if let Err(err) = writeln!(sink, "{text}").and_then(|()| sink.flush()) {
            warn!(error = %err, "failed to write narration");
        }
    }
}

/// In-memory narration target.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl CapturedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Renders `report` as pretty JSON wrapped in the results sentinels.
pub fn render_report(report: &SuiteReport) -> Result<String, ReportError> {
    let body = serde_json::to_string_pretty(report)?;
    Ok(format!("{RESULTS_START}\n{body}\n{RESULTS_END}\n"))
}

pub fn write_report<W: Write>(out: &mut W, report: &SuiteReport) -> Result<(), ReportError> {
    out.write_all(render_report(report)?.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Recovers the first sentinel-delimited report from `text`.
pub fn extract_report(text: &str) -> Result<SuiteReport, ReportError> {
    let start = text.find(RESULTS_START).ok_or(ReportError::MissingStart)? + RESULTS_START.len();
    let len = text[start..]
        .find(RESULTS_END)
        .ok_or(ReportError::MissingEnd)?;
    Ok(serde_json::from_str(text[start..start + len].trim())?)
}
