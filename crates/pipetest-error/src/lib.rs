use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for pipeline test harness operations.
///
/// Structured variants for the failure modes the harness can hit while
/// talking to the processing engine or reading package sources. Only
/// infrastructure problems become errors; assertion mismatches are carried
/// as data inside test results, never as `Err`.
#[derive(Error, Debug)]
pub enum PipetestError {
    // === Source / fixture errors ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline definition or fixture is not valid UTF-8.
    #[error("file is not valid UTF-8: '{path}'")]
    InvalidUtf8 { path: PathBuf },

    /// Malformed JSON in a pipeline definition or fixture.
    #[error("malformed JSON in '{path}': {detail}")]
    MalformedJson { path: PathBuf, detail: String },

    /// Malformed YAML in a pipeline definition or configuration file.
    #[error("malformed YAML in '{path}': {detail}")]
    MalformedYaml { path: PathBuf, detail: String },

    /// A `{{ IngestPipeline "name" }}` reference tag without a readable
    /// quoted pipeline name.
    #[error("malformed pipeline reference tag in '{path}': {detail}")]
    MalformedReferenceTag { path: PathBuf, detail: String },

    /// An invalid regular expression in test configuration.
    #[error("invalid pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },

    /// The expected-results file for a test case does not exist yet.
    #[error("expected results file not found: '{path}' (run in generate mode to create it)")]
    ExpectedFileMissing { path: PathBuf },

    // === Engine protocol errors ===
    /// A pipeline could not be installed or verified in the engine.
    #[error("failed to install pipeline '{name}' from '{path}': {body}")]
    PipelineInstall {
        name: String,
        path: PathBuf,
        body: String,
    },

    /// A generic engine round-trip failed.
    #[error("engine request failed: {operation} '{name}': {body}")]
    EngineRequest {
        operation: String,
        name: String,
        body: String,
    },

    /// The simulate response did not correlate one output per input.
    #[error("simulate returned {actual} documents for {expected} input events")]
    SimulationCountMismatch { expected: usize, actual: usize },

    // === Coverage errors ===
    /// Engine stats reported a different processor count than the pipeline
    /// source defines.
    #[error(
        "processor count mismatch in '{path}': source defines {expected} processors, engine reported {actual}"
    )]
    ProcessorCountMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    /// Engine stats reported a different processor type than the pipeline
    /// source defines at the same position.
    #[error(
        "processor type mismatch in '{path}' at position {index}: source '{expected}' vs engine '{actual}'"
    )]
    ProcessorTypeMismatch {
        path: String,
        index: usize,
        expected: String,
        actual: String,
    },

    /// Two coverage reports of different shapes cannot be merged.
    #[error("cannot merge coverage reports of different formats: {left} vs {right}")]
    CoverageFormatMismatch {
        left: &'static str,
        right: &'static str,
    },

    // === Orchestration errors ===
    /// A cooperative cancellation (caller deadline) interrupted the run.
    #[error("operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// No runner is registered for the requested test type.
    #[error("no test runner registered for test type '{test_type}'")]
    RunnerNotRegistered { test_type: String },

    /// A runner for this test type is already registered.
    #[error("a test runner for test type '{test_type}' is already registered")]
    RunnerAlreadyRegistered { test_type: String },

    /// Internal invariant violation; indicates a harness bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipetestError {
    /// True when the error signals a problem in the test infrastructure
    /// rather than in the package under test. All variants qualify: the
    /// harness reports assertion failures as result data, not errors.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        true
    }

    /// True when the error was caused by cooperative cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipetestError>;
