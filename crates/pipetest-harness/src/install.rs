//! Pipeline installation and teardown against the processing engine.
//!
//! Install is PUT-then-GET per resource, in file order: the read-back
//! defends against eventually-consistent engine backends acknowledging a
//! write they have not materialized. Any failure during install is fatal to
//! the test run. Uninstall runs at teardown and is deliberately lenient: a
//! failed DELETE is collected and reported, but already-collected test
//! results stand.

use pipetest_error::{PipetestError, Result};
use pipetest_types::PipelineResource;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::engine::IngestEngine;

/// Install all resources, verifying each by reading it back.
pub fn install_pipelines(
    engine: &mut dyn IngestEngine,
    cancel: &CancelToken,
    resources: &[PipelineResource],
) -> Result<()> {
    for resource in resources {
        cancel.checkpoint("install pipeline")?;
        engine
            .put_pipeline(&resource.name, resource.format, &resource.content)
            .map_err(|err| install_error(resource, &err))?;

        cancel.checkpoint("verify pipeline")?;
        let readback = engine
            .get_pipeline(&resource.name)
            .map_err(|err| install_error(resource, &err))?;
        if readback.is_none() {
            return Err(PipetestError::PipelineInstall {
                name: resource.name.clone(),
                path: resource.source_path.clone(),
                body: "pipeline not found after PUT".to_owned(),
            });
        }
        debug!(pipeline = %resource.name, "installed and verified pipeline");
    }
    Ok(())
}

fn install_error(resource: &PipelineResource, err: &PipetestError) -> PipetestError {
    PipetestError::PipelineInstall {
        name: resource.name.clone(),
        path: resource.source_path.clone(),
        body: err.to_string(),
    }
}

/// Delete every installed pipeline, continuing past individual failures.
/// Returns the errors encountered so the caller can report them without
/// invalidating test results.
pub fn uninstall_pipelines(
    engine: &mut dyn IngestEngine,
    resources: &[PipelineResource],
) -> Vec<PipetestError> {
    let mut errors = Vec::new();
    for resource in resources {
        match engine.delete_pipeline(&resource.name) {
            Ok(()) => debug!(pipeline = %resource.name, "uninstalled pipeline"),
            Err(err) => {
                warn!(pipeline = %resource.name, error = %err, "failed to uninstall pipeline");
                errors.push(err);
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pipetest_types::ResourceFormat;

    use super::*;
    use crate::engine::MockEngine;

    fn resource(name: &str) -> PipelineResource {
        PipelineResource {
            name: name.to_owned(),
            format: ResourceFormat::Yaml,
            content: b"processors: []".to_vec(),
            source_path: PathBuf::from(format!("{name}.yml")),
        }
    }

    #[test]
    fn installs_all_resources_in_order() {
        let mut engine = MockEngine::new();
        let resources = vec![resource("a-1"), resource("b-1")];
        install_pipelines(&mut engine, &CancelToken::new(), &resources).unwrap();
        assert_eq!(engine.installed_names(), vec!["a-1".to_owned(), "b-1".to_owned()]);
    }

    #[test]
    fn put_failure_is_fatal_and_names_the_pipeline() {
        let mut engine = MockEngine::new();
        engine.fail_next_put("invalid processor definition");
        let err = install_pipelines(&mut engine, &CancelToken::new(), &[resource("a-1")])
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("a-1"));
        assert!(text.contains("a-1.yml"));
        assert!(text.contains("invalid processor definition"));
    }

    #[test]
    fn missing_readback_is_fatal() {
        // GET succeeds but returns nothing: the engine acknowledged a write
        // it never materialized.
        struct NoReadback(MockEngine);
        impl IngestEngine for NoReadback {
            fn put_pipeline(
                &mut self,
                name: &str,
                format: ResourceFormat,
                body: &[u8],
            ) -> pipetest_error::Result<()> {
                self.0.put_pipeline(name, format, body)
            }
            fn get_pipeline(&mut self, _name: &str) -> pipetest_error::Result<Option<Vec<u8>>> {
                Ok(None)
            }
            fn delete_pipeline(&mut self, name: &str) -> pipetest_error::Result<()> {
                self.0.delete_pipeline(name)
            }
            fn simulate(
                &mut self,
                pipeline: &str,
                events: &[serde_json::Value],
            ) -> pipetest_error::Result<Vec<Option<serde_json::Value>>> {
                self.0.simulate(pipeline, events)
            }
            fn pipeline_stats(
                &mut self,
                names: &[String],
            ) -> pipetest_error::Result<Vec<pipetest_types::PipelineStats>> {
                self.0.pipeline_stats(names)
            }
            fn logs_since(
                &mut self,
                since: u64,
            ) -> pipetest_error::Result<Vec<pipetest_types::EngineLogRecord>> {
                self.0.logs_since(since)
            }
        }

        let mut engine = NoReadback(MockEngine::new());
        let err = install_pipelines(&mut engine, &CancelToken::new(), &[resource("a-1")])
            .unwrap_err();
        assert!(err.to_string().contains("not found after PUT"));
    }

    #[test]
    fn uninstall_continues_past_failures() {
        let mut engine = MockEngine::new();
        let resources = vec![resource("a-1"), resource("b-1")];
        install_pipelines(&mut engine, &CancelToken::new(), &resources).unwrap();
        engine.fail_next_delete("shard unavailable");
        let errors = uninstall_pipelines(&mut engine, &resources);
        assert_eq!(errors.len(), 1);
        // The second delete still ran.
        assert_eq!(engine.deleted, vec!["b-1".to_owned()]);
        assert_eq!(engine.installed_names(), vec!["a-1".to_owned()]);
    }

    #[test]
    fn cancelled_token_stops_install() {
        let mut engine = MockEngine::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = install_pipelines(&mut engine, &cancel, &[resource("a-1")]).unwrap_err();
        assert!(err.is_cancelled());
        assert!(engine.installed_names().is_empty());
    }
}
