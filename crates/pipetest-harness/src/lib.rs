//! Pipeline test runner and coverage engine for telemetry integration
//! packages.
//!
//! A test run installs a data stream's ingest pipelines into a processing
//! engine under a fresh nonce, feeds every test case's events through the
//! entry pipeline in one simulate batch, compares the produced documents
//! against expected results with numeric-type-insensitive equality,
//! validates fields, attributes per-processor hit counts back to pipeline
//! source lines as coverage, and tears its pipelines down on every exit
//! path.
//!
//! The processing engine itself is reached only through the
//! [`engine::IngestEngine`] trait; transport belongs to the caller.

pub mod cancel;
pub mod compare;
pub mod coverage;
pub mod diff;
pub mod engine;
pub mod install;
pub mod numeric;
pub mod pipeline;
pub mod registry;
pub mod simulate;
pub mod spans;
pub mod tags;
pub mod testcase;
pub mod tester;
pub mod transform;
pub mod validate;

pub use cancel::CancelToken;
pub use compare::{compare_results, read_expected, write_expected, CompareOutcome};
pub use coverage::{
    build_coverage_report, synthetic_uncovered_report, write_coverage_report, PipelineCoverage,
};
pub use engine::{IngestEngine, MockEngine};
pub use pipeline::{load_ingest_pipelines, LoadedPipelines};
pub use registry::{TestRunner, TestRunnerRegistry};
pub use spans::{parse_pipeline, ParsedPipeline, ProcessorInfo};
pub use tester::{PipelineRunner, PipelineTester, TestRun, TesterOptions};
pub use validate::{validate_documents, AcceptAll, FieldsValidator};
