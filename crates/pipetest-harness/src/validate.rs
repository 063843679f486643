//! Document validation after simulation.
//!
//! Before any field validation runs, each document is checked for the
//! pipeline error marker (`error.message`): a document carrying one failed
//! inside the pipeline, so it is reported as such and excluded from field
//! validation. Violations from all documents are de-duplicated into one
//! ordered failure report; one bad field in fifty documents reads as one
//! line, not fifty.

use serde_json::Value;

use crate::transform::Transform;

/// Field-level validation boundary. Implementations check one produced
/// document body and return human-readable violations, empty when clean.
pub trait FieldsValidator {
    fn validate_document_body(&self, body: &Value) -> Vec<String>;
}

/// A validator that accepts everything. Used when the package under test
/// ships no field definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl FieldsValidator for AcceptAll {
    fn validate_document_body(&self, _body: &Value) -> Vec<String> {
        Vec::new()
    }
}

fn scalar_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extract the pipeline error marker from a document, if present.
///
/// `error.message` may be nested (`{"error": {"message": ...}}`) or a flat
/// dotted key; its value may be a single string or an array of mixed
/// scalars, which are joined into one message.
#[must_use]
pub fn extract_pipeline_error(doc: &Value) -> Option<String> {
    let Value::Object(map) = doc else {
        return None;
    };
    let marker = map
        .get("error.message")
        .or_else(|| map.get("error").and_then(|e| e.get("message")))?;
    match marker {
        Value::Array(items) => Some(
            items
                .iter()
                .map(scalar_to_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(scalar_to_text(other)),
    }
}

/// Validate all produced documents, returning one de-duplicated, ordered
/// violation report. Documents carrying a pipeline error marker contribute
/// an "unexpected pipeline error" line and skip field validation.
#[must_use]
pub fn validate_documents(docs: &[Value], validator: &dyn FieldsValidator) -> Vec<String> {
    let mut violations = Vec::new();
    for doc in docs {
        if let Some(message) = extract_pipeline_error(doc) {
            violations.push(format!("unexpected pipeline error: {message}"));
            continue;
        }
        violations.extend(validator.validate_document_body(doc));
    }
    violations.sort();
    violations.dedup();
    violations
}

/// Select the transforms whose source index patterns cover the data
/// stream's backing index; only those participate in validation.
#[must_use]
pub fn matching_transforms<'a>(transforms: &'a [Transform], index: &str) -> Vec<&'a Transform> {
    transforms.iter().filter(|t| t.has_source(index)).collect()
}
