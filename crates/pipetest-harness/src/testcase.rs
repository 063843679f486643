//! Test case fixture loading.
//!
//! Two fixture shapes: `<name>.json` carries a pre-built event batch under
//! an `events` key (numbers parsed with arbitrary precision so 64-bit-plus
//! integers survive verbatim); `<name>.log` carries raw lines that are
//! optionally coalesced into multiline records and wrapped into synthetic
//! events. Configuration resolves common-then-case with per-key overrides;
//! a skip directive short-circuits before any event parsing.

use std::path::{Path, PathBuf};

use pipetest_error::{PipetestError, Result};
use pipetest_types::{SkipConfig, TestConfig};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Folder-wide configuration shared by every case in a test folder.
pub const COMMON_CONFIG_FILE: &str = "test-common-config.yml";

/// Suffix of per-case configuration files.
pub const CASE_CONFIG_SUFFIX: &str = "-config.yml";

/// Suffix of expected-results files.
pub const EXPECTED_SUFFIX: &str = "-expected.json";

/// A loaded test case ready for simulation.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Fixture file stem.
    pub name: String,
    /// Resolved configuration (common merged with per-case).
    pub config: TestConfig,
    /// Input events, in fixture order.
    pub events: Vec<Value>,
}

/// Loader outcome: either a runnable case or an immediate skip.
#[derive(Debug, Clone)]
pub enum LoadedTestCase {
    Ready(TestCase),
    Skipped { name: String, skip: SkipConfig },
}

#[derive(Debug, Deserialize)]
struct JsonFixture {
    events: Vec<Value>,
}

/// List candidate fixture files (`.json` / `.log`) in a test folder,
/// sorted, excluding expected-results and configuration files.
pub fn list_test_case_files(folder: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.ends_with(EXPECTED_SUFFIX) || name.ends_with(CASE_CONFIG_SUFFIX) {
            continue;
        }
        if name.ends_with(".json") || name.ends_with(".log") {
            names.push(name.to_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn load_config_file(path: &Path) -> Result<TestConfig> {
    if !path.is_file() {
        return Ok(TestConfig::default());
    }
    let text = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|err| PipetestError::MalformedYaml {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })
}

/// Resolve the configuration for one case: common config first, case
/// config unpacked on top (per-key last-wins, see `TestConfig::merged`).
pub fn resolve_config(folder: &Path, case_stem: &str) -> Result<TestConfig> {
    let common = load_config_file(&folder.join(COMMON_CONFIG_FILE))?;
    let case = load_config_file(&folder.join(format!("{case_stem}{CASE_CONFIG_SUFFIX}")))?;
    Ok(TestConfig::merged(common, case))
}

/// Coalesce raw log lines into logical records: a new record starts only on
/// a line matching `first_line`, all following non-matching lines are
/// appended with newline separators. Lines before the first match are
/// dropped.
#[must_use]
pub fn coalesce_multiline(lines: &[&str], first_line: &Regex) -> Vec<String> {
    let mut records: Vec<String> = Vec::new();
    for line in lines {
        if first_line.is_match(line) {
            records.push((*line).to_owned());
        } else if let Some(current) = records.last_mut() {
            current.push('\n');
            current.push_str(line);
        }
    }
    records
}

fn log_events(path: &Path, config: &TestConfig) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = text.lines().collect();

    let records: Vec<String> = match &config.multiline {
        Some(multiline) => {
            let pattern = Regex::new(&multiline.first_line_pattern).map_err(|err| {
                PipetestError::InvalidPattern {
                    pattern: multiline.first_line_pattern.clone(),
                    detail: err.to_string(),
                }
            })?;
            coalesce_multiline(&lines, &pattern)
        }
        None => lines
            .iter()
            .filter(|line| !line.is_empty())
            .map(|line| (*line).to_owned())
            .collect(),
    };

    Ok(records
        .into_iter()
        .map(|record| {
            let mut event = Map::new();
            event.insert("message".to_owned(), Value::String(record));
            for (key, value) in &config.fields {
                event.insert(key.clone(), value.clone());
            }
            Value::Object(event)
        })
        .collect())
}

fn json_events(path: &Path) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)?;
    let fixture: JsonFixture =
        serde_json::from_str(&text).map_err(|err| PipetestError::MalformedJson {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;
    Ok(fixture.events)
}

/// Load one test case fixture plus its resolved configuration.
pub fn load_test_case(folder: &Path, filename: &str) -> Result<LoadedTestCase> {
    let path = folder.join(filename);
    let (stem, is_json) = match filename.strip_suffix(".json") {
        Some(stem) => (stem, true),
        None => match filename.strip_suffix(".log") {
            Some(stem) => (stem, false),
            None => {
                return Err(PipetestError::Internal(format!(
                    "unsupported test case fixture: '{filename}'"
                )))
            }
        },
    };

    let config = resolve_config(folder, stem)?;
    if let Some(skip) = &config.skip {
        return Ok(LoadedTestCase::Skipped {
            name: stem.to_owned(),
            skip: skip.clone(),
        });
    }

    let events = if is_json {
        json_events(&path)?
    } else {
        log_events(&path, &config)?
    };

    Ok(LoadedTestCase::Ready(TestCase {
        name: stem.to_owned(),
        config,
        events,
    }))
}

/// Path of the expected-results file for a case.
#[must_use]
pub fn expected_path(folder: &Path, case_name: &str) -> PathBuf {
    folder.join(format!("{case_name}{EXPECTED_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(folder: &Path, name: &str, content: &str) {
        std::fs::write(folder.join(name), content).unwrap();
    }

    #[test]
    fn multiline_reconstruction_groups_continuation_lines() {
        let pattern = Regex::new("^START").unwrap();
        let records =
            coalesce_multiline(&["START a", "cont1", "cont2", "START b"], &pattern);
        assert_eq!(records, vec!["START a\ncont1\ncont2".to_owned(), "START b".to_owned()]);
    }

    #[test]
    fn leading_non_matching_lines_are_dropped() {
        let pattern = Regex::new("^START").unwrap();
        let records = coalesce_multiline(&["orphan", "START a"], &pattern);
        assert_eq!(records, vec!["START a".to_owned()]);
    }

    #[test]
    fn listing_excludes_expected_and_config_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "test-access.log", "line\n");
        write(dir.path(), "test-error.json", "{\"events\": []}");
        write(dir.path(), "test-access-expected.json", "{\"expected\": []}");
        write(dir.path(), "test-access-config.yml", "fields: {}");
        write(dir.path(), COMMON_CONFIG_FILE, "fields: {}");
        let names = list_test_case_files(dir.path()).unwrap();
        assert_eq!(
            names,
            vec!["test-access.log".to_owned(), "test-error.json".to_owned()]
        );
    }

    #[test]
    fn json_fixture_preserves_large_integer_precision() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "big.json",
            "{\"events\": [{\"id\": 6920071768563516847}]}",
        );
        let LoadedTestCase::Ready(case) = load_test_case(dir.path(), "big.json").unwrap()
        else {
            panic!("expected a runnable case");
        };
        let rendered = serde_json::to_string(&case.events[0]).unwrap();
        assert!(rendered.contains("6920071768563516847"), "got {rendered}");
    }

    #[test]
    fn log_fixture_wraps_records_and_injects_fields() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "plain.log", "first line\nsecond line\n");
        write(
            dir.path(),
            "plain-config.yml",
            "fields:\n  input.type: logfile\n",
        );
        let LoadedTestCase::Ready(case) = load_test_case(dir.path(), "plain.log").unwrap()
        else {
            panic!("expected a runnable case");
        };
        assert_eq!(case.events.len(), 2);
        assert_eq!(case.events[0]["message"], Value::from("first line"));
        assert_eq!(case.events[0]["input.type"], Value::from("logfile"));
    }

    #[test]
    fn multiline_config_drives_log_coalescing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "stack.log", "START a\ncont1\ncont2\nSTART b\n");
        write(
            dir.path(),
            "stack-config.yml",
            "multiline:\n  first_line_pattern: \"^START\"\n",
        );
        let LoadedTestCase::Ready(case) = load_test_case(dir.path(), "stack.log").unwrap()
        else {
            panic!("expected a runnable case");
        };
        assert_eq!(case.events.len(), 2);
        assert_eq!(case.events[0]["message"], Value::from("START a\ncont1\ncont2"));
    }

    #[test]
    fn skip_directive_short_circuits_event_parsing() {
        let dir = tempfile::tempdir().unwrap();
        // Deliberately malformed fixture: the loader must not read it.
        write(dir.path(), "broken.json", "{not json");
        write(
            dir.path(),
            "broken-config.yml",
            "skip:\n  reason: tracked upstream\n  link: https://example.com/9\n",
        );
        let loaded = load_test_case(dir.path(), "broken.json").unwrap();
        let LoadedTestCase::Skipped { name, skip } = loaded else {
            panic!("expected a skip");
        };
        assert_eq!(name, "broken");
        assert_eq!(skip.reason, "tracked upstream");
    }

    #[test]
    fn common_config_applies_to_every_case() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.log", "x\n");
        write(
            dir.path(),
            COMMON_CONFIG_FILE,
            "fields:\n  service.name: nginx\n",
        );
        let LoadedTestCase::Ready(case) = load_test_case(dir.path(), "a.log").unwrap() else {
            panic!("expected a runnable case");
        };
        assert_eq!(case.events[0]["service.name"], Value::from("nginx"));
    }

    #[test]
    fn case_config_overrides_common_per_key() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.log", "x\n");
        write(
            dir.path(),
            COMMON_CONFIG_FILE,
            "fields:\n  service.name: common\n  input.type: log\n",
        );
        write(
            dir.path(),
            "a-config.yml",
            "fields:\n  service.name: case\n",
        );
        let LoadedTestCase::Ready(case) = load_test_case(dir.path(), "a.log").unwrap() else {
            panic!("expected a runnable case");
        };
        assert_eq!(case.events[0]["service.name"], Value::from("case"));
        assert_eq!(case.events[0]["input.type"], Value::from("log"));
    }

    #[test]
    fn invalid_multiline_pattern_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.log", "x\n");
        write(
            dir.path(),
            "a-config.yml",
            "multiline:\n  first_line_pattern: \"([\"\n",
        );
        let err = load_test_case(dir.path(), "a.log").unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
    }
}
