//! Tolerant result comparison.
//!
//! Expected and actual result sets are normalized (dynamic fields masked,
//! configured coercions applied) and compared with numeric-type-insensitive
//! deep equality. Only when they differ are both sides re-serialized
//! through the canonical formatter and diffed; the rendered unified diff is
//! failure data, never an error.

use std::fmt::Write as _;
use std::path::Path;

use pipetest_error::{PipetestError, Result};
use pipetest_types::TestConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::diff::unified_diff;
use crate::numeric;

/// Context lines in rendered diffs.
const DIFF_CONTEXT: usize = 3;

/// Outcome of comparing one case's results.
#[derive(Debug, Clone, Default)]
pub struct CompareOutcome {
    /// Unified diff between canonical renderings; `None` when equal.
    pub diff: Option<String>,
    /// Dynamic-field pattern violations, a failure reason of its own.
    pub dynamic_violations: Vec<String>,
}

impl CompareOutcome {
    /// True when the comparison found no problem at all.
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.diff.is_none() && self.dynamic_violations.is_empty()
    }
}

/// Visit every value reachable through a dotted path. Arrays are
/// transparent (the path applies to each element); a dotted path may also
/// match a literal flat key, which takes precedence over descent.
fn with_values_at_path(value: &mut Value, segments: &[&str], f: &mut dyn FnMut(&mut Value)) {
    if segments.is_empty() {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                with_values_at_path(item, segments, f);
            }
        }
        Value::Object(map) => {
            let flat = segments.join(".");
            if let Some(child) = map.get_mut(&flat) {
                f(child);
                return;
            }
            if segments.len() == 1 {
                if let Some(child) = map.get_mut(segments[0]) {
                    f(child);
                }
            } else if let Some(child) = map.get_mut(segments[0]) {
                with_values_at_path(child, &segments[1..], f);
            }
        }
        _ => {}
    }
}

/// Remove every value reachable through a dotted path.
fn remove_at_path(value: &mut Value, segments: &[&str]) {
    if segments.is_empty() {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                remove_at_path(item, segments);
            }
        }
        Value::Object(map) => {
            let flat = segments.join(".");
            if map.remove(&flat).is_some() {
                return;
            }
            if segments.len() == 1 {
                map.remove(segments[0]);
            } else if let Some(child) = map.get_mut(segments[0]) {
                remove_at_path(child, &segments[1..]);
            }
        }
        _ => {}
    }
}

/// Validate dynamic-field values in `actual` against their patterns, then
/// mask the paths out of both sides. Returns the accumulated violations.
fn mask_dynamic_fields(
    expected: &mut [Value],
    actual: &mut [Value],
    config: &TestConfig,
) -> Result<Vec<String>> {
    let mut violations = Vec::new();
    for (path, pattern) in &config.dynamic_fields {
        let regex = Regex::new(pattern).map_err(|err| PipetestError::InvalidPattern {
            pattern: pattern.clone(),
            detail: err.to_string(),
        })?;
        let segments: Vec<&str> = path.split('.').collect();
        for doc in actual.iter_mut() {
            with_values_at_path(doc, &segments, &mut |value| {
                if let Value::String(s) = value {
                    if !regex.is_match(s) {
                        violations.push(format!(
                            "dynamic field \"{path}\": value \"{s}\" does not match pattern \"{pattern}\""
                        ));
                    }
                }
            });
        }
        for doc in expected.iter_mut().chain(actual.iter_mut()) {
            remove_at_path(doc, &segments);
        }
    }
    violations.sort();
    violations.dedup();
    Ok(violations)
}

fn coerce_configured_fields(docs: &mut [Value], config: &TestConfig) {
    for path in &config.numeric_keyword_fields {
        let segments: Vec<&str> = path.split('.').collect();
        for doc in docs.iter_mut() {
            with_values_at_path(doc, &segments, &mut |value| {
                if let Value::String(s) = value {
                    if let Ok(number) = s.parse::<Number>() {
                        *value = Value::Number(number);
                    }
                }
            });
        }
    }
    for path in &config.string_number_fields {
        let segments: Vec<&str> = path.split('.').collect();
        for doc in docs.iter_mut() {
            with_values_at_path(doc, &segments, &mut |value| {
                if let Value::Number(n) = value {
                    *value = Value::String(numeric::canonical(&n.to_string()));
                }
            });
        }
    }
}

/// Numeric-type-insensitive deep equality: two numbers are equal when they
/// denote the same mathematical value regardless of literal formatting.
#[must_use]
pub fn tolerant_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            numeric::literals_equal(&x.to_string(), &y.to_string())
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| tolerant_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(key, left)| {
                    y.get(key).is_some_and(|right| tolerant_equal(left, right))
                })
        }
        _ => a == b,
    }
}

fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn write_canonical(out: &mut String, value: &Value, indent: usize) {
    const STEP: usize = 2;
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => out.push_str(&numeric::canonical(&n.to_string())),
        Value::String(s) => out.push_str(&escape_json_string(s)),
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[\n");
            for (index, item) in items.iter().enumerate() {
                for _ in 0..indent + STEP {
                    out.push(' ');
                }
                write_canonical(out, item, indent + STEP);
                if index + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            for _ in 0..indent {
                out.push(' ');
            }
            out.push(']');
        }
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{\n");
            for (index, (key, item)) in map.iter().enumerate() {
                for _ in 0..indent + STEP {
                    out.push(' ');
                }
                out.push_str(&escape_json_string(key));
                out.push_str(": ");
                write_canonical(out, item, indent + STEP);
                if index + 1 < map.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            for _ in 0..indent {
                out.push(' ');
            }
            out.push('}');
        }
    }
}

/// Canonical rendering: stable key order (maps iterate sorted), canonical
/// number formatting, fixed indentation. Equal documents always render
/// identically, so the diff never shows formatting-only noise.
#[must_use]
pub fn canonical_render(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value, 0);
    out.push('\n');
    out
}

/// Compare normalized result sets, producing a diff only when they differ.
pub fn compare_results(
    expected: &[Value],
    actual: &[Value],
    config: &TestConfig,
) -> Result<CompareOutcome> {
    let mut want: Vec<Value> = expected.to_vec();
    let mut got: Vec<Value> = actual.to_vec();

    let dynamic_violations = mask_dynamic_fields(&mut want, &mut got, config)?;
    coerce_configured_fields(&mut want, config);
    coerce_configured_fields(&mut got, config);

    let equal = want.len() == got.len()
        && want.iter().zip(got.iter()).all(|(l, r)| tolerant_equal(l, r));
    let diff = if equal {
        None
    } else {
        let want_text = canonical_render(&Value::Array(want));
        let got_text = canonical_render(&Value::Array(got));
        Some(unified_diff(&want_text, &got_text, DIFF_CONTEXT))
    };

    Ok(CompareOutcome {
        diff,
        dynamic_violations,
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct ExpectedFile {
    expected: Vec<Value>,
}

/// Read the `<name>-expected.json` file for a case.
pub fn read_expected(path: &Path) -> Result<Vec<Value>> {
    if !path.is_file() {
        return Err(PipetestError::ExpectedFileMissing {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path)?;
    let file: ExpectedFile =
        serde_json::from_str(&text).map_err(|err| PipetestError::MalformedJson {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;
    Ok(file.expected)
}

/// Overwrite the expected-results file with the current actual results
/// (generate mode), in canonical formatting.
pub fn write_expected(path: &Path, actual: &[Value]) -> Result<()> {
    let mut doc = serde_json::Map::new();
    doc.insert("expected".to_owned(), Value::Array(actual.to_vec()));
    std::fs::write(path, canonical_render(&Value::Object(doc)))?;
    Ok(())
}
