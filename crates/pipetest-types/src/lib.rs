//! Shared data model for the pipeline test harness.
//!
//! Everything that crosses a component boundary lives here: pipeline
//! resources, parsed processors, engine statistics, test configuration,
//! test results, and coverage reports. Behavior that belongs to the data
//! (coverage merging, XML rendering, the one-of result invariant) is kept
//! on the types themselves; the algorithms that *build* these values live
//! in `pipetest-harness`.

pub mod config;
pub mod coverage;
pub mod result;

pub use config::{MultilineConfig, SkipConfig, TestConfig};
pub use coverage::{
    CoberturaClass, CoberturaLine, CoberturaMethod, CoberturaPackage, CoberturaReport,
    CoverageFormat, CoverageReport, GenericFile, GenericLine, GenericReport,
};
pub use result::TestResult;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Serialization format of a pipeline definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFormat {
    Json,
    Yaml,
}

impl ResourceFormat {
    /// Map a pipeline file extension to its format.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// A pipeline definition ready for installation into the processing engine.
///
/// The name is nonce-suffixed (`<base>-<nonce>`) so that concurrent or
/// historical runs installing the same logical pipeline never collide. The
/// resource is owned by exactly one test run and uninstalled at teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResource {
    /// Nonce-suffixed install name.
    pub name: String,
    /// Source format of `content`.
    pub format: ResourceFormat,
    /// Raw definition bytes, with inter-pipeline references rewritten to
    /// their nonce-suffixed names.
    pub content: Vec<u8>,
    /// Path of the source file, kept for error reporting.
    pub source_path: std::path::PathBuf,
}

/// A single processor parsed from pipeline source, with the line span it
/// occupies. Source order here must exactly match the order of the engine's
/// per-processor statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processor {
    /// Processor type, e.g. `set`, `grok`, `geoip`.
    #[serde(rename = "type")]
    pub processor_type: String,
    /// First source line of the processor entry (1-based).
    pub first_line: usize,
    /// Last source line of the processor entry (1-based, inclusive).
    pub last_line: usize,
}

/// Aggregate counters reported by the engine for a pipeline or processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Documents processed.
    pub count: i64,
    /// Documents that failed.
    pub failed: i64,
    /// Total processing time in milliseconds.
    pub time_in_millis: i64,
}

/// Per-processor statistics from the engine's node-stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStats {
    /// Processor type as reported by the engine. The engine substitutes the
    /// generic `compound` type for processors with on-failure handlers or
    /// loop semantics.
    #[serde(rename = "type")]
    pub processor_type: String,
    /// Documents that reached this processor.
    pub hit_count: i64,
}

/// Statistics for one installed pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Nonce-suffixed pipeline name.
    pub pipeline_name: String,
    /// Whole-pipeline counters.
    pub total: Counters,
    /// Per-processor counters, in the engine's processor order.
    pub processors: Vec<ProcessorStats>,
}

/// One record from the engine's own log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLogRecord {
    /// Record timestamp, nanoseconds since the Unix epoch.
    pub timestamp_unix_nanos: u64,
    /// Log level as reported by the engine (`WARN`, `INFO`, ...).
    pub level: String,
    /// Logger name; ingest processors log under ingest-scoped loggers.
    pub logger: String,
    /// Log message text.
    pub message: String,
}

impl EngineLogRecord {
    /// True for warning-level records emitted by an ingest-related logger.
    /// These are surfaced as synthesized failures after a test run.
    #[must_use]
    pub fn is_ingest_warning(&self) -> bool {
        let warning = self.level.eq_ignore_ascii_case("warn")
            || self.level.eq_ignore_ascii_case("warning");
        warning && self.logger.contains("ingest")
    }
}

/// The test types the dispatch framework knows about. Only `Pipeline` is
/// implemented by this workspace; the others exist so coverage synthetics
/// and the runner registry stay unambiguous across test types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Asset,
    Pipeline,
    Static,
    System,
}

impl TestType {
    /// Fixed synthetic line number used when a data stream has no tests of
    /// this type. Distinct per test type so multiple test types marking the
    /// same manifest file never collide on one line.
    #[must_use]
    pub fn synthetic_line_number(self) -> usize {
        match self {
            Self::Asset => 1,
            Self::Pipeline => 2,
            Self::Static => 3,
            Self::System => 4,
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Asset => "asset",
            Self::Pipeline => "pipeline",
            Self::Static => "static",
            Self::System => "system",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_format_from_extension() {
        assert_eq!(ResourceFormat::from_extension("json"), Some(ResourceFormat::Json));
        assert_eq!(ResourceFormat::from_extension("yml"), Some(ResourceFormat::Yaml));
        assert_eq!(ResourceFormat::from_extension("yaml"), Some(ResourceFormat::Yaml));
        assert_eq!(ResourceFormat::from_extension("txt"), None);
    }

    #[test]
    fn synthetic_line_numbers_are_distinct() {
        let all = [
            TestType::Asset,
            TestType::Pipeline,
            TestType::Static,
            TestType::System,
        ];
        let mut lines: Vec<usize> = all.iter().map(|t| t.synthetic_line_number()).collect();
        lines.sort_unstable();
        lines.dedup();
        assert_eq!(lines.len(), all.len());
    }

    #[test]
    fn ingest_warning_requires_level_and_logger() {
        let mut record = EngineLogRecord {
            timestamp_unix_nanos: 1,
            level: "WARN".to_owned(),
            logger: "org.elasticsearch.ingest.common.GrokProcessor".to_owned(),
            message: "pattern did not match".to_owned(),
        };
        assert!(record.is_ingest_warning());
        record.level = "INFO".to_owned();
        assert!(!record.is_ingest_warning());
        record.level = "warning".to_owned();
        record.logger = "org.elasticsearch.cluster".to_owned();
        assert!(!record.is_ingest_warning());
    }

    #[test]
    fn test_type_display_is_lowercase() {
        assert_eq!(TestType::Pipeline.to_string(), "pipeline");
        assert_eq!(TestType::Asset.to_string(), "asset");
    }
}
