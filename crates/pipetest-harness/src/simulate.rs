//! Simulation invocation: one batched simulate call per test case.
//!
//! The engine must return exactly one correlated output per input event in
//! the same order, with `None` marking a dropped document. A count mismatch
//! means the correlation is unusable, so it is fatal for the case.

use pipetest_error::{PipetestError, Result};
use serde_json::Value;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::engine::IngestEngine;

/// Run all events of a case through the entry pipeline in one batch.
pub fn simulate_events(
    engine: &mut dyn IngestEngine,
    cancel: &CancelToken,
    entry_pipeline: &str,
    events: &[Value],
) -> Result<Vec<Option<Value>>> {
    cancel.checkpoint("simulate")?;
    let outputs = engine.simulate(entry_pipeline, events)?;
    if outputs.len() != events.len() {
        return Err(PipetestError::SimulationCountMismatch {
            expected: events.len(),
            actual: outputs.len(),
        });
    }
    debug!(
        pipeline = %entry_pipeline,
        events = events.len(),
        dropped = outputs.iter().filter(|o| o.is_none()).count(),
        "simulated test case"
    );
    Ok(outputs)
}

/// Remove dropped (`None`) entries from a result set. Idempotent: applying
/// it twice yields the same set as applying it once.
#[must_use]
pub fn strip_dropped(results: &[Option<Value>]) -> Vec<Option<Value>> {
    results.iter().filter(|r| r.is_some()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engine::MockEngine;

    #[test]
    fn outputs_correlate_one_to_one_in_order() {
        let mut engine = MockEngine::new();
        let events = vec![json!({"message": "a"}), json!({"message": "b"})];
        let outputs =
            simulate_events(&mut engine, &CancelToken::new(), "default-1", &events).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0], Some(json!({"message": "a"})));
        assert_eq!(outputs[1], Some(json!({"message": "b"})));
    }

    #[test]
    fn count_mismatch_is_fatal_for_the_case() {
        let mut engine = MockEngine::new();
        engine.push_simulate_response(vec![Some(json!({}))]);
        let events = vec![json!({}), json!({})];
        let err = simulate_events(&mut engine, &CancelToken::new(), "default-1", &events)
            .unwrap_err();
        assert!(err.to_string().contains("2 input events"));
    }

    #[test]
    fn dropped_documents_keep_their_positions() {
        let mut engine = MockEngine::new();
        engine.push_simulate_response(vec![None, Some(json!({"kept": true}))]);
        let events = vec![json!({}), json!({})];
        let outputs =
            simulate_events(&mut engine, &CancelToken::new(), "default-1", &events).unwrap();
        assert_eq!(outputs[0], None);
        assert!(outputs[1].is_some());
    }

    #[test]
    fn strip_dropped_is_idempotent() {
        let results = vec![Some(json!(1)), None, Some(json!(2)), None];
        let once = strip_dropped(&results);
        let twice = strip_dropped(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn engine_failure_propagates_as_error() {
        let mut engine = MockEngine::new();
        engine.fail_next_simulate("parse_exception");
        let err = simulate_events(&mut engine, &CancelToken::new(), "default-1", &[json!({})])
            .unwrap_err();
        assert!(err.to_string().contains("parse_exception"));
    }
}
