//! Test result records and the one-of outcome invariant.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SkipConfig;
use crate::coverage::CoverageReport;
use crate::TestType;

/// Result of a single test case.
///
/// Exactly one of {success, skipped, failure, error} holds per instance:
/// success means `failure_msg`, `error_msg` and `skipped` are all empty.
/// The constructors are the only intended way to build one, which is what
/// keeps the invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Integration package under test.
    pub package: String,
    /// Data stream within the package.
    pub data_stream: String,
    /// Test type that produced this result.
    pub test_type: TestType,
    /// Test case name (fixture file stem).
    pub name: String,
    /// Wall-clock time the case took.
    pub time_elapsed: Duration,
    /// Assertion failure summary, empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_msg: String,
    /// Rendered diff or accumulated violation details for a failure.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_details: String,
    /// Infrastructure error: the harness could not determine pass/fail.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_msg: String,
    /// Present when the case carried a skip directive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipConfig>,
    /// Per-case coverage report, when coverage collection is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageReport>,
}

impl TestResult {
    fn base(package: &str, data_stream: &str, test_type: TestType, name: &str) -> Self {
        Self {
            package: package.to_owned(),
            data_stream: data_stream.to_owned(),
            test_type,
            name: name.to_owned(),
            time_elapsed: Duration::ZERO,
            failure_msg: String::new(),
            failure_details: String::new(),
            error_msg: String::new(),
            skipped: None,
            coverage: None,
        }
    }

    /// A passing result.
    #[must_use]
    pub fn success(package: &str, data_stream: &str, test_type: TestType, name: &str) -> Self {
        Self::base(package, data_stream, test_type, name)
    }

    /// An assertion failure: infrastructure worked, the assertion did not
    /// hold.
    #[must_use]
    pub fn failure(
        package: &str,
        data_stream: &str,
        test_type: TestType,
        name: &str,
        msg: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        let mut result = Self::base(package, data_stream, test_type, name);
        result.failure_msg = msg.into();
        result.failure_details = details.into();
        result
    }

    /// An infrastructure error: pass/fail could not be determined.
    #[must_use]
    pub fn error(
        package: &str,
        data_stream: &str,
        test_type: TestType,
        name: &str,
        msg: impl Into<String>,
    ) -> Self {
        let mut result = Self::base(package, data_stream, test_type, name);
        result.error_msg = msg.into();
        result
    }

    /// A skipped case, with the skip directive that caused it.
    #[must_use]
    pub fn skipped(
        package: &str,
        data_stream: &str,
        test_type: TestType,
        name: &str,
        skip: SkipConfig,
    ) -> Self {
        let mut result = Self::base(package, data_stream, test_type, name);
        result.skipped = Some(skip);
        result
    }

    /// Attach the elapsed wall-clock time.
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.time_elapsed = elapsed;
        self
    }

    /// Attach a per-case coverage report.
    #[must_use]
    pub fn with_coverage(mut self, coverage: CoverageReport) -> Self {
        self.coverage = Some(coverage);
        self
    }

    /// True when the result is a pass.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure_msg.is_empty() && self.error_msg.is_empty() && self.skipped.is_none()
    }

    /// Check the one-of invariant: at most one of failure/error/skip holds.
    #[must_use]
    pub fn outcome_is_well_formed(&self) -> bool {
        let populated = usize::from(!self.failure_msg.is_empty())
            + usize::from(!self.error_msg.is_empty())
            + usize::from(self.skipped.is_some());
        populated <= 1 && (self.failure_msg.is_empty() || self.error_msg.is_empty())
    }
}
