use thiserror::Error;

/// Fatal errors caused by defects in test declarations or harness settings.
///
/// A configuration error aborts the whole suite run: no useful report can be
/// produced when a declaration cannot be resolved.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A string began with the reserved placeholder prefix but named no known token.
    #[error("unknown namespace placeholder `{token}`")]
    UnknownPlaceholder {
        /// The offending string value.
        token: String,
    },

    /// Include/exclude filter could not be interpreted.
    #[error("invalid test filter: {message}")]
    InvalidFilter {
        /// Human-readable explanation.
        message: String,
    },

    /// Shard mode outside of the supported range.
    #[error("invalid shard mode {0}, expected 0 (none), 1 (hashed) or 2 (ranged)")]
    InvalidShardMode(i64),

    /// Two declarations share the same test name.
    #[error("test case `{name}` is declared more than once")]
    DuplicateTestCase {
        /// Name of the duplicated test case.
        name: String,
    },

    /// A declaration file or entry is malformed.
    #[error("invalid test declaration in {origin}: {message}")]
    InvalidDeclaration {
        /// File name or other origin of the declaration.
        origin: String,
        /// Human-readable explanation.
        message: String,
    },

    /// An operation is not shaped like a mapping.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Run parameters or settings violate their constraints.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    /// Settings sources could not be read or deserialized.
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    /// I/O error while reading declarations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an `InvalidFilter` variant.
    #[must_use]
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Creates an `InvalidDeclaration` variant.
    #[must_use]
    pub fn invalid_declaration(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Creates an `InvalidSetting` variant.
    #[must_use]
    pub fn invalid_setting(message: impl Into<String>) -> Self {
        Self::InvalidSetting(message.into())
    }
}

/// Failure reported by one of the administrative primitives.
#[derive(Debug, Clone, Error)]
pub enum AdminError {
    /// Target already exists. Creation callers treat this as success.
    #[error("`{namespace}` already exists")]
    AlreadyExists {
        /// Namespace or database that already exists.
        namespace: String,
    },

    /// The server rejected the primitive.
    #[error("{primitive} failed: {message}")]
    Failed {
        /// Name of the primitive (e.g. `"drop_collection"`).
        primitive: &'static str,
        /// Server-provided error message.
        message: String,
    },

    /// The primitive could not reach the server.
    #[error("{primitive} could not reach the server: {message}")]
    Transport {
        /// Name of the primitive.
        primitive: &'static str,
        /// Transport error details.
        message: String,
    },
}

impl AdminError {
    /// Creates a `Failed` variant.
    #[must_use]
    pub fn failed(primitive: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            primitive,
            message: message.into(),
        }
    }

    /// Returns true when the error only signals that the target exists.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Failure reported by the external load generator.
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    /// The generator ran but reported a failure.
    #[error("load generator failed: {0}")]
    Failed(String),

    /// The generator could not be reached.
    #[error("load generator unreachable: {0}")]
    Transport(String),

    /// The generator answered with a payload the harness cannot interpret.
    #[error("malformed load generator response: {0}")]
    MalformedResponse(String),
}

/// Recoverable failure of a single trial.
///
/// Trial errors are captured into the suite report and never abort sibling
/// trials, other thread counts or other test cases.
#[derive(Debug, Clone, Error)]
pub enum TrialError {
    /// An administrative primitive failed.
    #[error(transparent)]
    Admin(#[from] AdminError),

    /// The load generator failed.
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// Pending collection drops did not drain within the retry ceiling.
    #[error("{} collection drop(s) still pending after {attempts} attempts: {}", .pending.len(), .pending.join(", "))]
    QuiesceTimeout {
        /// Number of polls performed.
        attempts: u32,
        /// Namespaces still pending at the last poll.
        pending: Vec<String>,
    },

    /// A setup or teardown hook failed for a reason other than an admin primitive.
    #[error("{phase} hook failed on `{namespace}`: {message}")]
    Hook {
        /// Phase or step that failed (e.g. `"setup"`).
        phase: &'static str,
        /// Namespace of the slot the hook ran against.
        namespace: String,
        /// Failure details.
        message: String,
    },
}

impl TrialError {
    /// Short machine-readable classification used in error records and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Admin(_) => "admin",
            Self::Generator(_) => "generator",
            Self::QuiesceTimeout { .. } => "quiesce_timeout",
            Self::Hook { .. } => "hook",
        }
    }
}

impl From<serde_json::Error> for GeneratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

/// Convenient result alias for operations that can only fail fatally.
pub type ConfigResult<T> = Result<T, ConfigError>;
