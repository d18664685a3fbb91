//! Error types for the harness crate.

/// Errors that can occur during harness operations.
///
/// A command that runs and exits non-zero is not an error; it is a normal
/// [`ExecutionResult`](crate::runner::ExecutionResult). Likewise a timeout
/// is recorded on the result rather than raised.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The subprocess could not be launched at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// The command line that failed to launch.
        command: String,
        /// The underlying launch error.
        #[source]
        source: std::io::Error,
    },
    /// The command ran but its result did not satisfy the assertion.
    #[error("assertion failed:\n{diagnostic}")]
    AssertionMismatch {
        /// Command, expectation, exit code and captured output.
        diagnostic: String,
    },
    /// The command line was empty or could not be tokenized.
    #[error("invalid command line: {0}")]
    InvalidCommand(String),
    /// An assertion spec violated its invariants.
    #[error("invalid assertion spec: {0}")]
    InvalidSpec(String),
    /// Signalling the child process group failed.
    #[error("signal error: {0}")]
    Signal(#[from] nix::Error),
    /// An I/O error while talking to the child or the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),
    /// Fixture setup failed.
    #[error("fixture error: {0}")]
    Fixture(String),
}

impl HarnessError {
    /// Returns `true` if this is an assertion mismatch rather than an
    /// environment problem.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, HarnessError::AssertionMismatch { .. })
    }
}
