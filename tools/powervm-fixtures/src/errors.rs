use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("task error: {0}")]
    Task(String),
    #[error("adapter error: {0}")]
    Adapter(String),
    #[error("driver not initialized: {0}")]
    NotInitialized(String),
    #[error("canned response error: {0}")]
    CannedResponse(String),
    #[error(transparent)]
    Assertion(#[from] TaskAssertionError),
}

/// Raised when the tasks added to a flow do not line up with the expected
/// descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskAssertionError {
    #[error("Expected tasks not added: {expected:?}, {observed:?}")]
    LengthMismatch {
        expected: Vec<String>,
        observed: Vec<String>,
    },
    #[error("task {index}: expected name starting with {expected_prefix:?}, got {actual:?}")]
    PrefixMismatch {
        index: usize,
        expected_prefix: String,
        actual: String,
    },
    #[error("task {index}: expected {expected:?}, got {actual:?}")]
    ExactMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
}
