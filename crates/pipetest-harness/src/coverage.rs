//! Coverage report construction.
//!
//! Engine statistics carry per-processor hit counts in the engine's own
//! processor order. That order must equal the source order recovered by the
//! span scanner, modulo the engine's `compound` substitution; anything else
//! means line attribution would silently lie, so it is a fatal error naming
//! the pipeline file and both counts.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use pipetest_error::{PipetestError, Result};
use pipetest_types::{
    CoberturaClass, CoberturaLine, CoberturaMethod, CoberturaPackage, CoberturaReport,
    CoverageFormat, CoverageReport, GenericFile, GenericLine, GenericReport, PipelineStats,
    Processor, ProcessorStats, TestType,
};
use tracing::info;

/// The engine's substitute type for processors it wraps (on-failure
/// handlers, loops). It may stand in for any source processor.
const COMPOUND_TYPE: &str = "compound";

/// Subdirectory of the build root holding coverage report files.
pub const COVERAGE_DIR: &str = "test-coverage";

/// One pipeline's contribution to a coverage report.
#[derive(Debug, Clone)]
pub struct PipelineCoverage {
    /// Base pipeline name (without nonce suffix).
    pub name: String,
    /// Source path, relative to the repository root, used as the report
    /// filename/path attribute.
    pub source_path: String,
    /// Processors with line spans, in source order.
    pub processors: Vec<Processor>,
    /// Engine statistics for the installed pipeline.
    pub stats: PipelineStats,
}

fn nanos_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Verify that engine stats line up with the source processors and return
/// the per-processor hit counts in source order.
fn aligned_hit_counts(
    source_path: &str,
    processors: &[Processor],
    stats: &[ProcessorStats],
) -> Result<Vec<i64>> {
    if processors.len() != stats.len() {
        return Err(PipetestError::ProcessorCountMismatch {
            path: source_path.to_owned(),
            expected: processors.len(),
            actual: stats.len(),
        });
    }
    for (index, (processor, stat)) in processors.iter().zip(stats.iter()).enumerate() {
        if stat.processor_type != processor.processor_type
            && stat.processor_type != COMPOUND_TYPE
        {
            return Err(PipetestError::ProcessorTypeMismatch {
                path: source_path.to_owned(),
                index,
                expected: processor.processor_type.clone(),
                actual: stat.processor_type.clone(),
            });
        }
    }
    Ok(stats.iter().map(|s| s.hit_count).collect())
}

fn cobertura_class(pipeline: &PipelineCoverage, hits: &[i64]) -> CoberturaClass {
    let methods = pipeline
        .processors
        .iter()
        .zip(hits.iter())
        .map(|(processor, &hit_count)| CoberturaMethod {
            name: processor.processor_type.clone(),
            lines: (processor.first_line..=processor.last_line)
                .map(|number| CoberturaLine {
                    number,
                    hits: hit_count,
                })
                .collect(),
        })
        .collect();
    let lines = pipeline
        .processors
        .iter()
        .zip(hits.iter())
        .flat_map(|(processor, &hit_count)| {
            (processor.first_line..=processor.last_line).map(move |number| CoberturaLine {
                number,
                hits: hit_count,
            })
        })
        .collect();
    CoberturaClass {
        name: pipeline.name.clone(),
        filename: pipeline.source_path.clone(),
        methods,
        lines,
    }
}

fn generic_file(pipeline: &PipelineCoverage, hits: &[i64]) -> GenericFile {
    let lines = pipeline
        .processors
        .iter()
        .zip(hits.iter())
        .flat_map(|(processor, &hit_count)| {
            (processor.first_line..=processor.last_line).map(move |number| GenericLine {
                number,
                covered: hit_count > 0,
            })
        })
        .collect();
    GenericFile {
        path: pipeline.source_path.clone(),
        lines,
    }
}

/// Build a coverage report for one test run from parsed pipelines and their
/// engine statistics.
pub fn build_coverage_report(
    format: CoverageFormat,
    package: &str,
    repo_root: &str,
    pipelines: &[PipelineCoverage],
) -> Result<CoverageReport> {
    let timestamp_nanos = nanos_now();
    match format {
        CoverageFormat::Detailed => {
            let mut classes = Vec::with_capacity(pipelines.len());
            for pipeline in pipelines {
                let hits = aligned_hit_counts(
                    &pipeline.source_path,
                    &pipeline.processors,
                    &pipeline.stats.processors,
                )?;
                classes.push(cobertura_class(pipeline, &hits));
            }
            Ok(CoverageReport::Detailed(CoberturaReport {
                timestamp_nanos,
                sources: vec![repo_root.to_owned()],
                packages: vec![CoberturaPackage {
                    name: package.to_owned(),
                    classes,
                }],
            }))
        }
        CoverageFormat::Generic => {
            let mut files = Vec::with_capacity(pipelines.len());
            for pipeline in pipelines {
                let hits = aligned_hit_counts(
                    &pipeline.source_path,
                    &pipeline.processors,
                    &pipeline.stats.processors,
                )?;
                files.push(generic_file(pipeline, &hits));
            }
            Ok(CoverageReport::Generic(GenericReport {
                timestamp_nanos,
                files,
            }))
        }
    }
}

/// Report for data streams that have no tests of the given type: one
/// synthetic uncovered line per manifest, at the test type's fixed line
/// number so different test types never collide on the same file.
#[must_use]
pub fn synthetic_uncovered_report(
    format: CoverageFormat,
    package: &str,
    repo_root: &str,
    test_type: TestType,
    manifest_paths: &[String],
) -> CoverageReport {
    let timestamp_nanos = nanos_now();
    let line_number = test_type.synthetic_line_number();
    match format {
        CoverageFormat::Detailed => CoverageReport::Detailed(CoberturaReport {
            timestamp_nanos,
            sources: vec![repo_root.to_owned()],
            packages: vec![CoberturaPackage {
                name: package.to_owned(),
                classes: manifest_paths
                    .iter()
                    .map(|path| CoberturaClass {
                        name: path.clone(),
                        filename: path.clone(),
                        methods: Vec::new(),
                        lines: vec![CoberturaLine {
                            number: line_number,
                            hits: 0,
                        }],
                    })
                    .collect(),
            }],
        }),
        CoverageFormat::Generic => CoverageReport::Generic(GenericReport {
            timestamp_nanos,
            files: manifest_paths
                .iter()
                .map(|path| GenericFile {
                    path: path.clone(),
                    lines: vec![GenericLine {
                        number: line_number,
                        covered: false,
                    }],
                })
                .collect(),
        }),
    }
}

/// Write a report into `<build_root>/test-coverage/` under the canonical
/// file name, creating the directory if needed. Returns the written path.
pub fn write_coverage_report(
    build_root: &Path,
    package: &str,
    test_type: TestType,
    report: &CoverageReport,
) -> Result<PathBuf> {
    let dir = build_root.join(COVERAGE_DIR);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!(
        "coverage-{package}-{test_type}-{}-report.xml",
        report.timestamp()
    ));
    std::fs::write(&path, report.to_xml())?;
    info!(path = %path.display(), "wrote coverage report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use pipetest_types::Counters;

    use super::*;

    fn pipeline(types_and_spans: &[(&str, usize, usize)], stats: &[(&str, i64)]) -> PipelineCoverage {
        PipelineCoverage {
            name: "default".to_owned(),
            source_path: "elasticsearch/ingest_pipeline/default.yml".to_owned(),
            processors: types_and_spans
                .iter()
                .map(|&(processor_type, first_line, last_line)| Processor {
                    processor_type: processor_type.to_owned(),
                    first_line,
                    last_line,
                })
                .collect(),
            stats: PipelineStats {
                pipeline_name: "default-1".to_owned(),
                total: Counters::default(),
                processors: stats
                    .iter()
                    .map(|&(processor_type, hit_count)| ProcessorStats {
                        processor_type: processor_type.to_owned(),
                        hit_count,
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn detailed_report_attributes_hits_to_line_spans() {
        let p = pipeline(
            &[("append", 1, 1), ("geoip", 2, 2)],
            &[("append", 13), ("geoip", 17)],
        );
        let report = build_coverage_report(CoverageFormat::Detailed, "nginx", ".", &[p]).unwrap();
        let CoverageReport::Detailed(detailed) = &report else {
            panic!("wrong shape");
        };
        let class = &detailed.packages[0].classes[0];
        assert_eq!(
            class.lines,
            vec![
                CoberturaLine { number: 1, hits: 13 },
                CoberturaLine { number: 2, hits: 17 },
            ]
        );
        assert_eq!(class.methods.len(), 2);
        assert_eq!(class.methods[0].name, "append");
        assert_eq!(report.line_summary(), (2, 2));
    }

    #[test]
    fn generic_report_marks_zero_hit_spans_uncovered() {
        let p = pipeline(
            &[("grok", 2, 5), ("remove", 6, 6)],
            &[("grok", 4), ("remove", 0)],
        );
        let report = build_coverage_report(CoverageFormat::Generic, "nginx", ".", &[p]).unwrap();
        let CoverageReport::Generic(generic) = &report else {
            panic!("wrong shape");
        };
        let lines = &generic.files[0].lines;
        assert_eq!(lines.len(), 5);
        assert!(lines[..4].iter().all(|l| l.covered));
        assert!(!lines[4].covered);
    }

    #[test]
    fn compound_substitution_matches_any_source_processor() {
        let p = pipeline(
            &[("foreach", 1, 3), ("date", 4, 5)],
            &[("compound", 9), ("date", 9)],
        );
        assert!(build_coverage_report(CoverageFormat::Generic, "nginx", ".", &[p]).is_ok());
    }

    #[test]
    fn count_mismatch_names_the_file_and_both_counts() {
        let p = pipeline(&[("set", 1, 1), ("grok", 2, 2)], &[("set", 1)]);
        let err =
            build_coverage_report(CoverageFormat::Detailed, "nginx", ".", &[p]).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("default.yml"));
        assert!(text.contains('2'));
        assert!(text.contains('1'));
    }

    #[test]
    fn type_mismatch_is_fatal() {
        let p = pipeline(&[("set", 1, 1)], &[("grok", 1)]);
        let err =
            build_coverage_report(CoverageFormat::Detailed, "nginx", ".", &[p]).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn synthetic_report_uses_the_test_type_line() {
        let report = synthetic_uncovered_report(
            CoverageFormat::Generic,
            "nginx",
            ".",
            TestType::Pipeline,
            &["nginx/data_stream/access/manifest.yml".to_owned()],
        );
        let CoverageReport::Generic(generic) = &report else {
            panic!("wrong shape");
        };
        assert_eq!(generic.files[0].lines, vec![GenericLine { number: 2, covered: false }]);
        assert_eq!(report.line_summary(), (1, 0));
    }

    #[test]
    fn report_file_name_carries_package_type_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let report = synthetic_uncovered_report(
            CoverageFormat::Detailed,
            "nginx",
            ".",
            TestType::Pipeline,
            &["manifest.yml".to_owned()],
        );
        let path = write_coverage_report(dir.path(), "nginx", TestType::Pipeline, &report)
            .unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("coverage-nginx-pipeline-"));
        assert!(name.ends_with("-report.xml"));
        assert!(name.contains(&report.timestamp().to_string()));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("coverage-04.dtd"));
    }

    #[test]
    fn merged_runs_round_trip_through_the_builder() {
        let a = pipeline(&[("set", 1, 1)], &[("set", 3)]);
        let b = pipeline(&[("set", 1, 1)], &[("set", 5)]);
        let mut left =
            build_coverage_report(CoverageFormat::Detailed, "nginx", ".", &[a]).unwrap();
        let right =
            build_coverage_report(CoverageFormat::Detailed, "nginx", ".", &[b]).unwrap();
        left.merge(right).unwrap();
        let CoverageReport::Detailed(detailed) = &left else {
            panic!("wrong shape");
        };
        assert_eq!(
            detailed.packages[0].classes[0].lines,
            vec![CoberturaLine { number: 1, hits: 8 }]
        );
    }
}
