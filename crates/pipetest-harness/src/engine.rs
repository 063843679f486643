//! Processing-engine protocol boundary.
//!
//! The engine (pipeline management, simulate, stats, log stream) is an
//! external collaborator; the harness only sees this trait. Transport
//! concerns (HTTP, auth, retries) belong to the caller's client wrapper.
//! `MockEngine` is the in-memory implementation every harness test runs
//! against, with per-operation failure injection.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use pipetest_error::{PipetestError, Result};
use pipetest_types::{
    Counters, EngineLogRecord, PipelineStats, ProcessorStats, ResourceFormat,
};
use serde_json::Value;

/// Synchronous protocol surface of the processing engine.
///
/// All calls are blocking round-trips; the caller owns cancellation and
/// checks its token between calls.
pub trait IngestEngine {
    /// `PUT /_ingest/pipeline/{name}`.
    fn put_pipeline(&mut self, name: &str, format: ResourceFormat, body: &[u8]) -> Result<()>;

    /// `GET /_ingest/pipeline/{name}`; `None` when the pipeline does not
    /// exist (the installer treats that as a failed materialization).
    fn get_pipeline(&mut self, name: &str) -> Result<Option<Vec<u8>>>;

    /// `DELETE /_ingest/pipeline/{name}`.
    fn delete_pipeline(&mut self, name: &str) -> Result<()>;

    /// `POST /_ingest/pipeline/{name}/_simulate`: batched documents in,
    /// one correlated output per input in the same order, `None` for
    /// dropped documents.
    fn simulate(&mut self, pipeline: &str, events: &[Value]) -> Result<Vec<Option<Value>>>;

    /// Node-stats slice for the named pipelines, in request order.
    fn pipeline_stats(&mut self, names: &[String]) -> Result<Vec<PipelineStats>>;

    /// Engine log records at or after the given timestamp.
    fn logs_since(&mut self, since_unix_nanos: u64) -> Result<Vec<EngineLogRecord>>;
}

/// Scripted in-memory engine for harness tests.
///
/// By default `simulate` echoes its input documents. Tests can queue
/// explicit responses, script per-pipeline processor stats, seed log
/// records, and arm one-shot failures per operation.
#[derive(Debug, Default)]
pub struct MockEngine {
    pipelines: BTreeMap<String, (ResourceFormat, Vec<u8>)>,
    simulate_responses: VecDeque<Vec<Option<Value>>>,
    stats: BTreeMap<String, Vec<ProcessorStats>>,
    default_stats: Option<Vec<ProcessorStats>>,
    logs: Vec<EngineLogRecord>,
    fail_put: Option<String>,
    fail_get: Option<String>,
    fail_delete: Option<String>,
    fail_simulate: Option<String>,
    fail_stats: Option<String>,
    /// Names passed to `delete_pipeline`, in call order.
    pub deleted: Vec<String>,
    /// Number of simulate calls served.
    pub simulate_calls: usize,
}

impl MockEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed pipeline body, if present.
    #[must_use]
    pub fn installed(&self, name: &str) -> Option<&[u8]> {
        self.pipelines.get(name).map(|(_, body)| body.as_slice())
    }

    /// Names of all currently installed pipelines.
    #[must_use]
    pub fn installed_names(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }

    /// Queue one simulate response; consumed in FIFO order.
    pub fn push_simulate_response(&mut self, response: Vec<Option<Value>>) {
        self.simulate_responses.push_back(response);
    }

    /// Script the per-processor stats for a pipeline name.
    pub fn set_processor_stats(&mut self, pipeline: &str, processors: Vec<ProcessorStats>) {
        self.stats.insert(pipeline.to_owned(), processors);
    }

    /// Script stats returned for any pipeline name without its own entry.
    /// Useful when the caller cannot predict nonce-suffixed names.
    pub fn set_default_processor_stats(&mut self, processors: Vec<ProcessorStats>) {
        self.default_stats = Some(processors);
    }

    /// Seed an engine log record.
    pub fn push_log(&mut self, record: EngineLogRecord) {
        self.logs.push(record);
    }

    pub fn fail_next_put(&mut self, body: &str) {
        self.fail_put = Some(body.to_owned());
    }

    pub fn fail_next_get(&mut self, body: &str) {
        self.fail_get = Some(body.to_owned());
    }

    pub fn fail_next_delete(&mut self, body: &str) {
        self.fail_delete = Some(body.to_owned());
    }

    pub fn fail_next_simulate(&mut self, body: &str) {
        self.fail_simulate = Some(body.to_owned());
    }

    pub fn fail_next_stats(&mut self, body: &str) {
        self.fail_stats = Some(body.to_owned());
    }

    fn take_failure(slot: &mut Option<String>, operation: &str, name: &str) -> Result<()> {
        if let Some(body) = slot.take() {
            return Err(PipetestError::EngineRequest {
                operation: operation.to_owned(),
                name: name.to_owned(),
                body,
            });
        }
        Ok(())
    }
}

impl IngestEngine for MockEngine {
    fn put_pipeline(&mut self, name: &str, format: ResourceFormat, body: &[u8]) -> Result<()> {
        Self::take_failure(&mut self.fail_put, "put_pipeline", name)?;
        self.pipelines
            .insert(name.to_owned(), (format, body.to_vec()));
        Ok(())
    }

    fn get_pipeline(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        Self::take_failure(&mut self.fail_get, "get_pipeline", name)?;
        Ok(self.pipelines.get(name).map(|(_, body)| body.clone()))
    }

    fn delete_pipeline(&mut self, name: &str) -> Result<()> {
        Self::take_failure(&mut self.fail_delete, "delete_pipeline", name)?;
        self.deleted.push(name.to_owned());
        self.pipelines.remove(name);
        Ok(())
    }

    fn simulate(&mut self, pipeline: &str, events: &[Value]) -> Result<Vec<Option<Value>>> {
        Self::take_failure(&mut self.fail_simulate, "simulate", pipeline)?;
        self.simulate_calls += 1;
        match self.simulate_responses.pop_front() {
            Some(response) => Ok(response),
            None => Ok(events.iter().cloned().map(Some).collect()),
        }
    }

    fn pipeline_stats(&mut self, names: &[String]) -> Result<Vec<PipelineStats>> {
        Self::take_failure(&mut self.fail_stats, "pipeline_stats", "")?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let processors = self
                .stats
                .get(name)
                .cloned()
                .or_else(|| self.default_stats.clone())
                .unwrap_or_default();
            let count = processors.iter().map(|p| p.hit_count).max().unwrap_or(0);
            out.push(PipelineStats {
                pipeline_name: name.clone(),
                total: Counters {
                    count,
                    failed: 0,
                    time_in_millis: 0,
                },
                processors,
            });
        }
        Ok(out)
    }

    fn logs_since(&mut self, since_unix_nanos: u64) -> Result<Vec<EngineLogRecord>> {
        Ok(self
            .logs
            .iter()
            .filter(|r| r.timestamp_unix_nanos >= since_unix_nanos)
            .cloned()
            .collect())
    }
}
