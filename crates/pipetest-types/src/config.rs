//! Per-case and folder-common test configuration.
//!
//! Configuration is resolved by loading the folder-wide common file first
//! and then the case-specific file on top of it; `TestConfig::merged`
//! defines exactly how the two layers combine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Skip directive: the case is not simulated at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipConfig {
    /// Human-readable reason for skipping.
    pub reason: String,
    /// Tracking link (issue, PR) for the skip.
    #[serde(default)]
    pub link: String,
}

/// Multiline coalescing settings for raw `.log` fixtures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultilineConfig {
    /// A new logical record starts only on lines matching this pattern;
    /// non-matching lines are appended to the current record.
    pub first_line_pattern: String,
}

/// Test configuration resolved for one test case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Skip this case entirely.
    pub skip: Option<SkipConfig>,
    /// Multiline reconstruction for `.log` fixtures.
    pub multiline: Option<MultilineConfig>,
    /// Static fields injected into every synthesized event.
    pub fields: BTreeMap<String, Value>,
    /// Dotted field path to the regex its runtime value must match; the
    /// field's concrete value is masked out of the structural comparison.
    pub dynamic_fields: BTreeMap<String, String>,
    /// Paths compared numerically even when one side is a string.
    pub numeric_keyword_fields: Vec<String>,
    /// Paths where numbers are compared through their canonical string
    /// rendering.
    pub string_number_fields: Vec<String>,
}

impl TestConfig {
    /// Merge a folder-common config with a case-specific one.
    ///
    /// Per-top-level-key last-wins: a key the case config sets replaces the
    /// common value. The `fields` and `dynamic_fields` maps merge per entry
    /// (case entry wins, unrelated common entries survive); list fields
    /// replace wholesale when the case config supplies a non-empty list.
    #[must_use]
    pub fn merged(common: Self, case: Self) -> Self {
        let mut out = common;
        if case.skip.is_some() {
            out.skip = case.skip;
        }
        if case.multiline.is_some() {
            out.multiline = case.multiline;
        }
        for (key, value) in case.fields {
            out.fields.insert(key, value);
        }
        for (path, pattern) in case.dynamic_fields {
            out.dynamic_fields.insert(path, pattern);
        }
        if !case.numeric_keyword_fields.is_empty() {
            out.numeric_keyword_fields = case.numeric_keyword_fields;
        }
        if !case.string_number_fields.is_empty() {
            out.string_number_fields = case.string_number_fields;
        }
        out
    }
}
