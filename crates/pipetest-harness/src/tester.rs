//! Pipeline test orchestration.
//!
//! One run installs the data stream's pipelines under a fresh nonce, drives
//! every test case through simulate/compare/validate, optionally collects
//! per-processor coverage, sweeps the engine log for ingest warnings, and
//! always uninstalls its pipelines afterwards, error paths included.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use pipetest_error::{PipetestError, Result};
use pipetest_types::{CoverageFormat, CoverageReport, TestResult, TestType};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::compare::{compare_results, read_expected, write_expected};
use crate::coverage::{build_coverage_report, PipelineCoverage};
use crate::engine::IngestEngine;
use crate::install::{install_pipelines, uninstall_pipelines};
use crate::pipeline::{load_ingest_pipelines, LoadedPipelines};
use crate::registry::TestRunner;
use crate::simulate::{simulate_events, strip_dropped};
use crate::spans::parse_pipeline;
use crate::testcase::{expected_path, list_test_case_files, load_test_case, LoadedTestCase, TestCase};
use crate::validate::{validate_documents, FieldsValidator};

/// Directory of pipeline test fixtures, relative to a data stream root.
pub const PIPELINE_TEST_DIR: &str = "_dev/test/pipeline";

/// Result name under which engine ingest warnings are reported.
const INGEST_WARNINGS_NAME: &str = "(ingest pipeline warnings)";

/// Result name under which a coverage collection failure is reported.
const COVERAGE_RESULT_NAME: &str = "(coverage collection)";

/// Options for one pipeline test run.
#[derive(Debug, Clone)]
pub struct TesterOptions {
    /// Integration package under test.
    pub package: String,
    /// Data stream within the package.
    pub data_stream: String,
    /// Data stream root directory on disk.
    pub data_stream_root: PathBuf,
    /// Entry pipeline base name override; `default` when absent.
    pub pipeline_override: Option<String>,
    /// Overwrite expected-results files instead of comparing.
    pub generate_expected: bool,
    /// Collect per-processor coverage in this shape.
    pub coverage_format: Option<CoverageFormat>,
    /// Source root recorded in Cobertura reports.
    pub repo_root: String,
    /// Settle delay before teardown, for inspecting engine state.
    pub settle_delay: Duration,
}

impl TesterOptions {
    #[must_use]
    pub fn new(package: &str, data_stream: &str, data_stream_root: PathBuf) -> Self {
        Self {
            package: package.to_owned(),
            data_stream: data_stream.to_owned(),
            data_stream_root,
            pipeline_override: None,
            generate_expected: false,
            coverage_format: None,
            repo_root: ".".to_owned(),
            settle_delay: Duration::ZERO,
        }
    }
}

/// Everything one run produced.
#[derive(Debug)]
pub struct TestRun {
    /// Per-case results, plus synthesized ingest-warning failures.
    pub results: Vec<TestResult>,
    /// Run-level coverage report, when collection was enabled.
    pub coverage: Option<CoverageReport>,
    /// Uninstall errors from teardown; informational, results stand.
    pub teardown_errors: Vec<PipetestError>,
}

/// The pipeline test runner.
pub struct PipelineTester {
    options: TesterOptions,
}

fn nanos_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

impl PipelineTester {
    #[must_use]
    pub fn new(options: TesterOptions) -> Self {
        Self { options }
    }

    /// Run the full session. Pipelines installed by this run are
    /// uninstalled on every exit path once installation succeeded.
    pub fn run(
        &self,
        engine: &mut dyn IngestEngine,
        cancel: &CancelToken,
        validator: &dyn FieldsValidator,
    ) -> Result<TestRun> {
        let start_nanos = nanos_now();
        let loaded = load_ingest_pipelines(
            &self.options.data_stream_root,
            self.options.pipeline_override.as_deref(),
        )?;
        info!(
            package = %self.options.package,
            data_stream = %self.options.data_stream,
            pipelines = loaded.resources.len(),
            nonce = loaded.nonce,
            "starting pipeline test run"
        );

        if let Err(err) = install_pipelines(engine, cancel, &loaded.resources) {
            // Partial installs still need cleanup.
            uninstall_pipelines(engine, &loaded.resources);
            return Err(err);
        }

        let body = self.run_cases(engine, cancel, validator, &loaded, start_nanos);

        if !self.options.settle_delay.is_zero() {
            if let Err(err) = cancel.sleep(self.options.settle_delay, "settle before teardown") {
                debug!(error = %err, "settle delay interrupted, tearing down now");
            }
        }
        let teardown_errors = uninstall_pipelines(engine, &loaded.resources);

        let (results, coverage) = body?;
        Ok(TestRun {
            results,
            coverage,
            teardown_errors,
        })
    }

    fn run_cases(
        &self,
        engine: &mut dyn IngestEngine,
        cancel: &CancelToken,
        validator: &dyn FieldsValidator,
        loaded: &LoadedPipelines,
        start_nanos: u64,
    ) -> Result<(Vec<TestResult>, Option<CoverageReport>)> {
        let folder = self.options.data_stream_root.join(PIPELINE_TEST_DIR);
        let mut results = Vec::new();

        if folder.is_dir() {
            for filename in list_test_case_files(&folder)? {
                let started = Instant::now();
                match load_test_case(&folder, &filename) {
                    Err(err) => {
                        results.push(self.error_result(&filename, &err).with_elapsed(started.elapsed()));
                    }
                    Ok(LoadedTestCase::Skipped { name, skip }) => {
                        info!(case = %name, reason = %skip.reason, "skipping test case");
                        results.push(TestResult::skipped(
                            &self.options.package,
                            &self.options.data_stream,
                            TestType::Pipeline,
                            &name,
                            skip,
                        ));
                    }
                    Ok(LoadedTestCase::Ready(case)) => {
                        match self.run_case(engine, cancel, validator, loaded, &folder, &case) {
                            Ok(result) => results.push(result.with_elapsed(started.elapsed())),
                            Err(err) => {
                                let cancelled = err.is_cancelled();
                                results.push(
                                    self.error_result(&case.name, &err)
                                        .with_elapsed(started.elapsed()),
                                );
                                if cancelled {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }

        // A coverage failure (stats mismatch, stats fetch error) must never
        // invalidate results already collected: it becomes one error result
        // and the run stands without a report.
        let coverage = match self.options.coverage_format {
            Some(format) => match self.collect_coverage(engine, cancel, loaded, format) {
                Ok(report) => Some(report),
                Err(err) => {
                    warn!(error = %err, "coverage collection failed");
                    results.push(self.error_result(COVERAGE_RESULT_NAME, &err));
                    None
                }
            },
            None => None,
        };
        if let Some(report) = &coverage {
            results = results
                .into_iter()
                .map(|result| {
                    if result.skipped.is_none() && result.error_msg.is_empty() {
                        result.with_coverage(report.clone())
                    } else {
                        result
                    }
                })
                .collect();
        }

        results.extend(self.ingest_warning_results(engine, start_nanos));
        Ok((results, coverage))
    }

    fn run_case(
        &self,
        engine: &mut dyn IngestEngine,
        cancel: &CancelToken,
        validator: &dyn FieldsValidator,
        loaded: &LoadedPipelines,
        folder: &std::path::Path,
        case: &TestCase,
    ) -> Result<TestResult> {
        let outputs = simulate_events(engine, cancel, &loaded.entry_pipeline, &case.events)?;
        let docs: Vec<Value> = strip_dropped(&outputs).into_iter().flatten().collect();
        let expected_file = expected_path(folder, &case.name);

        if self.options.generate_expected {
            write_expected(&expected_file, &docs)?;
            info!(case = %case.name, path = %expected_file.display(), "wrote expected results");
            return Ok(self.success_result(&case.name));
        }

        let expected = read_expected(&expected_file)?;
        let outcome = compare_results(&expected, &docs, &case.config)?;
        let field_violations = validate_documents(&docs, validator);

        let mut reasons = Vec::new();
        let mut details = String::new();
        if outcome.diff.is_some() {
            reasons.push("results do not match the expected output");
        }
        if let Some(diff) = &outcome.diff {
            details.push_str(diff);
        }
        if !outcome.dynamic_violations.is_empty() {
            reasons.push("dynamic field values do not match their patterns");
            for violation in &outcome.dynamic_violations {
                details.push_str(violation);
                details.push('\n');
            }
        }
        if !field_violations.is_empty() {
            reasons.push("produced documents failed validation");
            for violation in &field_violations {
                details.push_str(violation);
                details.push('\n');
            }
        }

        if reasons.is_empty() {
            Ok(self.success_result(&case.name))
        } else {
            Ok(TestResult::failure(
                &self.options.package,
                &self.options.data_stream,
                TestType::Pipeline,
                &case.name,
                reasons.join("; "),
                details,
            ))
        }
    }

    fn collect_coverage(
        &self,
        engine: &mut dyn IngestEngine,
        cancel: &CancelToken,
        loaded: &LoadedPipelines,
        format: CoverageFormat,
    ) -> Result<CoverageReport> {
        cancel.checkpoint("collect pipeline stats")?;
        let names: Vec<String> = loaded.resources.iter().map(|r| r.name.clone()).collect();
        let stats = engine.pipeline_stats(&names)?;
        if stats.len() != names.len() {
            return Err(PipetestError::Internal(format!(
                "requested stats for {} pipelines, engine returned {}",
                names.len(),
                stats.len()
            )));
        }

        let suffix = format!("-{}", loaded.nonce);
        let mut pipelines = Vec::with_capacity(loaded.resources.len());
        for (resource, stats) in loaded.resources.iter().zip(stats) {
            let source =
                std::str::from_utf8(&resource.content).map_err(|_| PipetestError::InvalidUtf8 {
                    path: resource.source_path.clone(),
                })?;
            let parsed = parse_pipeline(resource.format, &resource.source_path, source)?;
            let name = resource
                .name
                .strip_suffix(&suffix)
                .unwrap_or(&resource.name)
                .to_owned();
            pipelines.push(PipelineCoverage {
                name,
                source_path: resource.source_path.to_string_lossy().into_owned(),
                processors: parsed.processors,
                stats,
            });
        }
        build_coverage_report(format, &self.options.package, &self.options.repo_root, &pipelines)
    }

    /// Warning-level ingest log records emitted during the run become one
    /// failure result per distinct message.
    fn ingest_warning_results(
        &self,
        engine: &mut dyn IngestEngine,
        start_nanos: u64,
    ) -> Vec<TestResult> {
        let records = match engine.logs_since(start_nanos) {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "could not fetch engine logs after the run");
                return Vec::new();
            }
        };
        let mut seen = BTreeSet::new();
        records
            .into_iter()
            .filter(|record| record.is_ingest_warning())
            .filter(|record| seen.insert(record.message.clone()))
            .map(|record| {
                TestResult::failure(
                    &self.options.package,
                    &self.options.data_stream,
                    TestType::Pipeline,
                    INGEST_WARNINGS_NAME,
                    "found ingest pipeline warnings in engine logs",
                    record.message,
                )
            })
            .collect()
    }

    fn success_result(&self, name: &str) -> TestResult {
        TestResult::success(
            &self.options.package,
            &self.options.data_stream,
            TestType::Pipeline,
            name,
        )
    }

    fn error_result(&self, name: &str, err: &PipetestError) -> TestResult {
        TestResult::error(
            &self.options.package,
            &self.options.data_stream,
            TestType::Pipeline,
            name,
            err.to_string(),
        )
    }
}

/// Registry adapter owning the engine and validator a pipeline session
/// runs against.
pub struct PipelineRunner {
    tester: PipelineTester,
    engine: Box<dyn IngestEngine>,
    validator: Box<dyn FieldsValidator>,
}

impl PipelineRunner {
    #[must_use]
    pub fn new(
        options: TesterOptions,
        engine: Box<dyn IngestEngine>,
        validator: Box<dyn FieldsValidator>,
    ) -> Self {
        Self {
            tester: PipelineTester::new(options),
            engine,
            validator,
        }
    }
}

impl TestRunner for PipelineRunner {
    fn test_type(&self) -> TestType {
        TestType::Pipeline
    }

    // Installed pipelines and stats counters are shared engine state.
    fn can_run_in_parallel(&self) -> bool {
        false
    }

    fn run(&mut self, cancel: &CancelToken) -> Result<Vec<TestResult>> {
        let run = self
            .tester
            .run(self.engine.as_mut(), cancel, self.validator.as_ref())?;
        Ok(run.results)
    }
}
