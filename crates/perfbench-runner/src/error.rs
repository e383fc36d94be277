use perfbench_core::{ConfigError, TrialError};
use thiserror::Error;

/// Errors of stages where both fatal and per-trial failures can surface.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Fatal defect in declarations or settings.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A single trial failed.
    #[error(transparent)]
    Trial(#[from] TrialError),
}

impl HarnessError {
    /// Returns true if the error must abort the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type for harness stages.
pub type HarnessResult<T> = Result<T, HarnessError>;
