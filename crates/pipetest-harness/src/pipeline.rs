//! Ingest pipeline discovery and nonce rewriting.
//!
//! One nonce is generated per loader invocation and appended to every
//! pipeline's install name, so concurrent or historical runs against the
//! same engine never clobber each other's pipelines. Inter-pipeline
//! references (`{{ IngestPipeline "name" }}` tags embedded in the
//! definition) are rewritten to the nonce-suffixed names so they keep
//! resolving after installation.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use pipetest_error::{PipetestError, Result};
use pipetest_types::{PipelineResource, ResourceFormat};
use regex::Regex;
use tracing::debug;

/// Directory holding pipeline definitions, relative to a data stream root.
pub const INGEST_PIPELINE_DIR: &str = "elasticsearch/ingest_pipeline";

/// Base name of the entry pipeline when the data stream does not override it.
pub const DEFAULT_PIPELINE_NAME: &str = "default";

/// Pipelines discovered for one test run.
#[derive(Debug, Clone)]
pub struct LoadedPipelines {
    /// The run's nonce; every resource name ends in `-<nonce>`.
    pub nonce: u64,
    /// Nonce-suffixed name of the entry pipeline.
    pub entry_pipeline: String,
    /// Install-ready resources, in file-name order.
    pub resources: Vec<PipelineResource>,
}

/// Strictly monotonic nanosecond nonce. The timestamp keeps independent
/// testers (CI fan-out against a shared engine) apart; the atomic floor
/// keeps repeated calls within one process apart.
pub fn generate_nonce() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    let mut prev = LAST.load(Ordering::SeqCst);
    loop {
        let next = now.max(prev + 1);
        match LAST.compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

fn reference_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\{\{\s*IngestPipeline\s+(?:"([^"]+)"|'([^']+)')\s*\}\}"#)
            .unwrap_or_else(|_| unreachable!("static pattern is valid"))
    })
}

fn loose_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*IngestPipeline\b")
            .unwrap_or_else(|_| unreachable!("static pattern is valid"))
    })
}

/// Rewrite every pipeline reference tag in `source` to the referenced
/// pipeline's nonce-suffixed install name.
///
/// A tag without a readable quoted name is a fatal error: installing it
/// would produce a dangling reference the engine only reports at simulate
/// time.
pub fn rewrite_pipeline_references(path: &Path, source: &str, nonce: u64) -> Result<String> {
    let strict = reference_tag_pattern();
    let loose_count = loose_tag_pattern().find_iter(source).count();
    let strict_count = strict.find_iter(source).count();
    if loose_count != strict_count {
        return Err(PipetestError::MalformedReferenceTag {
            path: path.to_path_buf(),
            detail: format!(
                "{} reference tag(s) lack a quoted pipeline name",
                loose_count - strict_count
            ),
        });
    }
    let rewritten = strict.replace_all(source, |caps: &regex::Captures<'_>| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        format!("{name}-{nonce}")
    });
    Ok(rewritten.into_owned())
}

/// Discover and prepare all pipeline definitions for a data stream.
///
/// Enumerates JSON and YAML files under the ingest-pipeline directory in
/// sorted order, rewrites inter-pipeline references with a fresh nonce, and
/// derives each install name by stripping the extension and appending the
/// nonce. The entry pipeline is the configured override or `default`.
pub fn load_ingest_pipelines(
    data_stream_root: &Path,
    pipeline_override: Option<&str>,
) -> Result<LoadedPipelines> {
    let nonce = generate_nonce();
    let dir = data_stream_root.join(INGEST_PIPELINE_DIR);

    let mut entries: Vec<(String, ResourceFormat, std::path::PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(format) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ResourceFormat::from_extension)
        else {
            continue;
        };
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        entries.push((stem.to_owned(), format, path));
    }
    entries.sort_by(|a, b| a.2.cmp(&b.2));

    let mut resources = Vec::with_capacity(entries.len());
    for (stem, format, path) in entries {
        let bytes = std::fs::read(&path)?;
        let source = String::from_utf8(bytes).map_err(|_| PipetestError::InvalidUtf8 {
            path: path.clone(),
        })?;
        let rewritten = rewrite_pipeline_references(&path, &source, nonce)?;
        let name = format!("{stem}-{nonce}");
        debug!(pipeline = %name, path = %path.display(), "loaded ingest pipeline");
        resources.push(PipelineResource {
            name,
            format,
            content: rewritten.into_bytes(),
            source_path: path,
        });
    }

    let entry_base = pipeline_override.unwrap_or(DEFAULT_PIPELINE_NAME);
    Ok(LoadedPipelines {
        nonce,
        entry_pipeline: format!("{entry_base}-{nonce}"),
        resources,
    })
}
