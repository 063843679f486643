//! Pipeline source parsing: processor line spans and semantic inspection.
//!
//! Coverage granularity is per processor, so every top-level entry of the
//! `processors` list must be attributed to the exact first/last source
//! lines it occupies. The span scanner works on the raw text (YAML block
//! style or JSON) while the semantic view (processor type, `on_failure`,
//! `reroute` datasets) comes from a regular serde parse; the two views are
//! zipped and must agree on the processor count.

use std::path::Path;

use pipetest_error::{PipetestError, Result};
use pipetest_types::{Processor, ResourceFormat};

/// Semantic facts about one processor entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorInfo {
    pub processor_type: String,
    /// The processor declares an `on_failure` handler list.
    pub has_on_failure: bool,
    /// The processor is a loop construct (`foreach`).
    pub is_loop: bool,
    /// `dataset` attribute values of a `reroute` processor.
    pub reroute_datasets: Vec<String>,
}

impl ProcessorInfo {
    /// The engine reports this processor under the generic `compound` type.
    #[must_use]
    pub fn reported_as_compound(&self) -> bool {
        self.has_on_failure || self.is_loop
    }
}

/// A pipeline definition parsed for coverage and dataset derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPipeline {
    /// Processors with line spans, in source order.
    pub processors: Vec<Processor>,
    /// Semantic facts, index-aligned with `processors`.
    pub infos: Vec<ProcessorInfo>,
}

impl ParsedPipeline {
    /// Datasets this pipeline may route documents into: the `dataset`
    /// attribute values of its `reroute` processors, in source order.
    #[must_use]
    pub fn expected_datasets(&self) -> Vec<String> {
        self.infos
            .iter()
            .flat_map(|info| info.reroute_datasets.iter().cloned())
            .collect()
    }
}

/// Parse a pipeline definition, attributing each top-level processor to its
/// source line span.
pub fn parse_pipeline(
    format: ResourceFormat,
    path: &Path,
    source: &str,
) -> Result<ParsedPipeline> {
    let (spans, infos) = match format {
        ResourceFormat::Yaml => (yaml_processor_spans(source), yaml_processor_infos(path, source)?),
        ResourceFormat::Json => (json_processor_spans(source), json_processor_infos(path, source)?),
    };
    if spans.len() != infos.len() {
        return Err(PipetestError::Internal(format!(
            "processor span scan of '{}' found {} entries but the parser found {}",
            path.display(),
            spans.len(),
            infos.len()
        )));
    }
    let processors = spans
        .iter()
        .zip(infos.iter())
        .map(|(&(first_line, last_line), info)| Processor {
            processor_type: info.processor_type.clone(),
            first_line,
            last_line,
        })
        .collect();
    Ok(ParsedPipeline { processors, infos })
}

/// Spans of the top-level `processors` list items in YAML block style.
fn yaml_processor_spans(source: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut in_block = false;
    let mut item_indent: Option<usize> = None;
    let mut current: Option<(usize, usize)> = None;

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = raw.trim();
        if !in_block {
            if raw.starts_with("processors:") {
                in_block = true;
            }
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = raw.len() - raw.trim_start().len();
        let is_item = trimmed.starts_with("- ") || trimmed == "-";

        match item_indent {
            None => {
                if is_item {
                    item_indent = Some(indent);
                    current = Some((line_no, line_no));
                } else {
                    // Next top-level key right after `processors:` — an
                    // empty or flow-style list carries no spans.
                    break;
                }
            }
            Some(expected) => {
                if is_item && indent == expected {
                    if let Some(span) = current.take() {
                        spans.push(span);
                    }
                    current = Some((line_no, line_no));
                } else if indent < expected {
                    break;
                } else if let Some(span) = &mut current {
                    span.1 = line_no;
                }
            }
        }
    }
    if let Some(span) = current {
        spans.push(span);
    }
    spans
}

/// Spans of the `"processors"` array elements in JSON, via a string-aware
/// depth scan.
fn json_processor_spans(source: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut line = 1_usize;
    let mut depth = 0_i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut current_string = String::new();
    let mut last_string_depth = -1_i32;
    let mut saw_processors_key = false;
    let mut array_depth = -1_i32;
    let mut element: Option<(usize, usize)> = None;

    for c in source.chars() {
        if c == '\n' {
            line += 1;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            } else {
                current_string.push(c);
            }
            if !in_string {
                last_string_depth = depth;
            }
            if array_depth >= 0 {
                if let Some(span) = &mut element {
                    span.1 = line;
                }
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                current_string.clear();
                if array_depth >= 0 && element.is_none() {
                    element = Some((line, line));
                }
            }
            ':' => {
                if current_string == "processors" && last_string_depth == 1 && array_depth < 0 {
                    saw_processors_key = true;
                }
            }
            '[' => {
                depth += 1;
                if saw_processors_key {
                    saw_processors_key = false;
                    array_depth = depth;
                } else if array_depth >= 0 && depth > array_depth {
                    if element.is_none() {
                        element = Some((line, line));
                    } else if let Some(span) = &mut element {
                        span.1 = line;
                    }
                }
            }
            '{' => {
                depth += 1;
                if array_depth >= 0 && depth > array_depth {
                    if element.is_none() {
                        element = Some((line, line));
                    } else if let Some(span) = &mut element {
                        span.1 = line;
                    }
                }
            }
            ']' | '}' => {
                if array_depth >= 0 && depth == array_depth && c == ']' {
                    if let Some(span) = element.take() {
                        spans.push(span);
                    }
                    array_depth = -1;
                }
                depth -= 1;
                if array_depth >= 0 && depth >= array_depth {
                    if let Some(span) = &mut element {
                        span.1 = line;
                    }
                }
            }
            ',' => {
                if array_depth >= 0 && depth == array_depth {
                    if let Some(span) = element.take() {
                        spans.push(span);
                    }
                }
            }
            c if !c.is_whitespace() => {
                if array_depth >= 0 && depth >= array_depth && element.is_none() {
                    element = Some((line, line));
                } else if array_depth >= 0 {
                    if let Some(span) = &mut element {
                        span.1 = line;
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

fn yaml_processor_infos(path: &Path, source: &str) -> Result<Vec<ProcessorInfo>> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(source).map_err(|err| PipetestError::MalformedYaml {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;
    let mut infos = Vec::new();
    let Some(processors) = doc.get("processors").and_then(|v| v.as_sequence()) else {
        return Ok(infos);
    };
    for entry in processors {
        let Some(mapping) = entry.as_mapping() else {
            return Err(malformed_entry(path, "processor entry is not a map"));
        };
        if mapping.len() != 1 {
            return Err(malformed_entry(path, "processor entry is not a single-key map"));
        }
        let (key, body) = mapping
            .iter()
            .next()
            .ok_or_else(|| malformed_entry(path, "empty processor entry"))?;
        let Some(processor_type) = key.as_str() else {
            return Err(malformed_entry(path, "processor type is not a string"));
        };
        let has_on_failure = body.get("on_failure").is_some();
        let reroute_datasets = if processor_type == "reroute" {
            yaml_dataset_values(body.get("dataset"))
        } else {
            Vec::new()
        };
        infos.push(ProcessorInfo {
            processor_type: processor_type.to_owned(),
            has_on_failure,
            is_loop: processor_type == "foreach",
            reroute_datasets,
        });
    }
    Ok(infos)
}

fn yaml_dataset_values(value: Option<&serde_yaml::Value>) -> Vec<String> {
    match value {
        Some(serde_yaml::Value::String(s)) => vec![s.clone()],
        Some(serde_yaml::Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(ToOwned::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

fn json_processor_infos(path: &Path, source: &str) -> Result<Vec<ProcessorInfo>> {
    let doc: serde_json::Value =
        serde_json::from_str(source).map_err(|err| PipetestError::MalformedJson {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;
    let mut infos = Vec::new();
    let Some(processors) = doc.get("processors").and_then(|v| v.as_array()) else {
        return Ok(infos);
    };
    for entry in processors {
        let Some(mapping) = entry.as_object() else {
            return Err(malformed_entry(path, "processor entry is not an object"));
        };
        if mapping.len() != 1 {
            return Err(malformed_entry(path, "processor entry is not a single-key object"));
        }
        let (processor_type, body) = mapping
            .iter()
            .next()
            .map(|(k, v)| (k.clone(), v))
            .ok_or_else(|| malformed_entry(path, "empty processor entry"))?;
        let has_on_failure = body.get("on_failure").is_some();
        let reroute_datasets = if processor_type == "reroute" {
            json_dataset_values(body.get("dataset"))
        } else {
            Vec::new()
        };
        infos.push(ProcessorInfo {
            is_loop: processor_type == "foreach",
            processor_type,
            has_on_failure,
            reroute_datasets,
        });
    }
    Ok(infos)
}

fn json_dataset_values(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(ToOwned::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

fn malformed_entry(path: &Path, detail: &str) -> PipetestError {
    PipetestError::MalformedYaml {
        path: path.to_path_buf(),
        detail: detail.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML_PIPELINE: &str = "\
description: Test pipeline
processors:
  - set:
      field: event.kind
      value: event
  - grok:
      field: message
      patterns:
        - '%{IP:source.ip}'
      on_failure:
        - set:
            field: error.message
            value: grok failed
  - geoip:
      field: source.ip
on_failure:
  - set:
      field: event.outcome
      value: failure
";

    #[test]
    fn yaml_spans_cover_each_processor_block() {
        let parsed = parse_pipeline(
            ResourceFormat::Yaml,
            Path::new("default.yml"),
            YAML_PIPELINE,
        )
        .unwrap();
        assert_eq!(parsed.processors.len(), 3);
        assert_eq!(parsed.processors[0].processor_type, "set");
        assert_eq!(parsed.processors[0].first_line, 3);
        assert_eq!(parsed.processors[0].last_line, 5);
        assert_eq!(parsed.processors[1].processor_type, "grok");
        assert_eq!(parsed.processors[1].first_line, 6);
        assert_eq!(parsed.processors[1].last_line, 13);
        assert_eq!(parsed.processors[2].processor_type, "geoip");
        assert_eq!(parsed.processors[2].first_line, 14);
        assert_eq!(parsed.processors[2].last_line, 15);
    }

    #[test]
    fn top_level_on_failure_is_not_a_processor() {
        let parsed = parse_pipeline(
            ResourceFormat::Yaml,
            Path::new("default.yml"),
            YAML_PIPELINE,
        )
        .unwrap();
        assert!(parsed
            .infos
            .iter()
            .all(|i| i.processor_type != "on_failure"));
    }

    #[test]
    fn on_failure_handler_marks_compound_reporting() {
        let parsed = parse_pipeline(
            ResourceFormat::Yaml,
            Path::new("default.yml"),
            YAML_PIPELINE,
        )
        .unwrap();
        assert!(!parsed.infos[0].reported_as_compound());
        assert!(parsed.infos[1].reported_as_compound());
    }

    #[test]
    fn foreach_is_a_loop_construct() {
        let source = "\
processors:
  - foreach:
      field: tags
      processor:
        set:
          field: _ingest._value
          value: x
";
        let parsed =
            parse_pipeline(ResourceFormat::Yaml, Path::new("loop.yml"), source).unwrap();
        assert_eq!(parsed.processors.len(), 1);
        assert!(parsed.infos[0].is_loop);
        assert!(parsed.infos[0].reported_as_compound());
    }

    #[test]
    fn reroute_datasets_string_and_array_forms() {
        let source = "\
processors:
  - reroute:
      dataset: foo.bar
  - reroute:
      dataset:
        - alpha
        - beta
";
        let parsed =
            parse_pipeline(ResourceFormat::Yaml, Path::new("reroute.yml"), source).unwrap();
        assert_eq!(
            parsed.expected_datasets(),
            vec!["foo.bar".to_owned(), "alpha".to_owned(), "beta".to_owned()]
        );
    }

    #[test]
    fn json_spans_cover_each_processor_object() {
        let source = r#"{
  "description": "Test pipeline",
  "processors": [
    {
      "set": {
        "field": "event.kind",
        "value": "event"
      }
    },
    { "geoip": { "field": "source.ip" } }
  ]
}"#;
        let parsed =
            parse_pipeline(ResourceFormat::Json, Path::new("default.json"), source).unwrap();
        assert_eq!(parsed.processors.len(), 2);
        assert_eq!(parsed.processors[0].processor_type, "set");
        assert_eq!(parsed.processors[0].first_line, 4);
        assert_eq!(parsed.processors[0].last_line, 9);
        assert_eq!(parsed.processors[1].processor_type, "geoip");
        assert_eq!(parsed.processors[1].first_line, 10);
        assert_eq!(parsed.processors[1].last_line, 10);
    }

    #[test]
    fn json_brackets_inside_strings_do_not_confuse_the_scanner() {
        let source = r#"{
  "processors": [
    {
      "grok": {
        "patterns": ["\\[%{IP:ip}\\] } ["]
      }
    }
  ]
}"#;
        let parsed =
            parse_pipeline(ResourceFormat::Json, Path::new("grok.json"), source).unwrap();
        assert_eq!(parsed.processors.len(), 1);
        assert_eq!(parsed.processors[0].first_line, 3);
        assert_eq!(parsed.processors[0].last_line, 7);
    }

    #[test]
    fn empty_processor_list_yields_no_spans() {
        let parsed = parse_pipeline(
            ResourceFormat::Yaml,
            Path::new("empty.yml"),
            "description: nothing\nprocessors: []\n",
        )
        .unwrap();
        assert!(parsed.processors.is_empty());
    }

    #[test]
    fn multi_key_processor_entry_is_rejected() {
        let source = "\
processors:
  - set:
      field: a
    rename:
      field: b
";
        let err =
            parse_pipeline(ResourceFormat::Yaml, Path::new("bad.yml"), source).unwrap_err();
        assert!(err.to_string().contains("single-key"));
    }
}
