//! Test runner registration and dispatch.
//!
//! The registry is an explicit value owned by the caller, not a process
//! global: whoever drives a test session builds one, registers the runners
//! it wants, and dispatches by test type.

use std::collections::BTreeMap;

use pipetest_error::{PipetestError, Result};
use pipetest_types::{TestResult, TestType};

use crate::cancel::CancelToken;

/// One registered test runner.
pub trait TestRunner {
    /// The test type this runner handles.
    fn test_type(&self) -> TestType;

    /// Whether instances of this runner may execute concurrently. Pipeline
    /// runners share mutable engine state (installed pipelines, stats
    /// counters), so they must not.
    fn can_run_in_parallel(&self) -> bool;

    /// Execute the runner's full test session.
    fn run(&mut self, cancel: &CancelToken) -> Result<Vec<TestResult>>;
}

/// Registry mapping each test type to at most one runner.
#[derive(Default)]
pub struct TestRunnerRegistry {
    runners: BTreeMap<TestType, Box<dyn TestRunner>>,
}

impl TestRunnerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runner; registering a second runner for the same test
    /// type is an error.
    pub fn register(&mut self, runner: Box<dyn TestRunner>) -> Result<()> {
        let test_type = runner.test_type();
        if self.runners.contains_key(&test_type) {
            return Err(PipetestError::RunnerAlreadyRegistered {
                test_type: test_type.to_string(),
            });
        }
        self.runners.insert(test_type, runner);
        Ok(())
    }

    /// Test types with a registered runner, in stable order.
    #[must_use]
    pub fn registered_types(&self) -> Vec<TestType> {
        self.runners.keys().copied().collect()
    }

    /// Look up a registered runner.
    #[must_use]
    pub fn get(&self, test_type: TestType) -> Option<&dyn TestRunner> {
        self.runners.get(&test_type).map(AsRef::as_ref)
    }

    /// Dispatch a run to the registered runner for `test_type`.
    pub fn run(&mut self, test_type: TestType, cancel: &CancelToken) -> Result<Vec<TestResult>> {
        let runner = self
            .runners
            .get_mut(&test_type)
            .ok_or_else(|| PipetestError::RunnerNotRegistered {
                test_type: test_type.to_string(),
            })?;
        runner.run(cancel)
    }
}
