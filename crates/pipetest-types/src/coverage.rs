//! Coverage report model: two concrete report shapes behind one enum.
//!
//! Both variants model a forest of source-path to covered-line-set. The
//! `Detailed` shape is Cobertura-style (classes, methods, per-line hit
//! counts); the `Generic` shape is a flat covered/uncovered line list per
//! file. Merging unions line records by line number and never loses a
//! previously recorded hit; summary totals are always recomputed from the
//! merged line sets at read time, never carried forward.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use pipetest_error::{PipetestError, Result};
use serde::{Deserialize, Serialize};

/// Which coverage report shape to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageFormat {
    /// Cobertura-style XML with classes, methods and hit counts.
    Detailed,
    /// `<coverage version="1">` XML with boolean covered lines.
    Generic,
}

/// A line record with a hit count (Detailed shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoberturaLine {
    pub number: usize,
    pub hits: i64,
}

/// One method entry: a named processor and the lines of its span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoberturaMethod {
    pub name: String,
    pub lines: Vec<CoberturaLine>,
}

/// One class entry: a pipeline file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoberturaClass {
    pub name: String,
    pub filename: String,
    pub methods: Vec<CoberturaMethod>,
    pub lines: Vec<CoberturaLine>,
}

/// One package entry: the integration package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoberturaPackage {
    pub name: String,
    pub classes: Vec<CoberturaClass>,
}

/// Cobertura-style report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoberturaReport {
    /// Nanoseconds since the Unix epoch at report creation.
    pub timestamp_nanos: u64,
    /// Source roots.
    pub sources: Vec<String>,
    pub packages: Vec<CoberturaPackage>,
}

/// A line record with a boolean covered flag (Generic shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericLine {
    pub number: usize,
    pub covered: bool,
}

/// One covered file in the generic report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericFile {
    pub path: String,
    pub lines: Vec<GenericLine>,
}

/// Generic `<coverage version="1">` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericReport {
    /// Nanoseconds since the Unix epoch at report creation.
    pub timestamp_nanos: u64,
    pub files: Vec<GenericFile>,
}

/// A coverage report in one of the two supported shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum CoverageReport {
    Detailed(CoberturaReport),
    Generic(GenericReport),
}

impl CoverageReport {
    /// Shape of this report.
    #[must_use]
    pub fn format(&self) -> CoverageFormat {
        match self {
            Self::Detailed(_) => CoverageFormat::Detailed,
            Self::Generic(_) => CoverageFormat::Generic,
        }
    }

    fn format_name(&self) -> &'static str {
        match self {
            Self::Detailed(_) => "detailed",
            Self::Generic(_) => "generic",
        }
    }

    /// Creation timestamp, nanoseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Detailed(r) => r.timestamp_nanos,
            Self::Generic(r) => r.timestamp_nanos,
        }
    }

    /// Merge `other` into `self`.
    ///
    /// Entities are matched by name/path string equality; line records are
    /// unioned by line number, summing hit counts (Detailed) or OR-ing the
    /// covered flag (Generic). Merging reports of different shapes is an
    /// error. The merged report keeps the earlier timestamp.
    pub fn merge(&mut self, other: CoverageReport) -> Result<()> {
        match (self, other) {
            (Self::Detailed(left), Self::Detailed(right)) => {
                left.merge(right);
                Ok(())
            }
            (Self::Generic(left), Self::Generic(right)) => {
                left.merge(right);
                Ok(())
            }
            (left, right) => Err(PipetestError::CoverageFormatMismatch {
                left: left.format_name(),
                right: match right {
                    Self::Detailed(_) => "detailed",
                    Self::Generic(_) => "generic",
                },
            }),
        }
    }

    /// `(valid, covered)` line counts, recomputed from the line sets.
    #[must_use]
    pub fn line_summary(&self) -> (usize, usize) {
        match self {
            Self::Detailed(r) => r.line_summary(),
            Self::Generic(r) => r.line_summary(),
        }
    }

    /// Render the report as XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        match self {
            Self::Detailed(r) => r.to_xml(),
            Self::Generic(r) => r.to_xml(),
        }
    }
}

fn merge_cobertura_lines(into: &mut Vec<CoberturaLine>, from: Vec<CoberturaLine>) {
    let mut by_number: BTreeMap<usize, i64> =
        into.iter().map(|l| (l.number, l.hits)).collect();
    for line in from {
        *by_number.entry(line.number).or_insert(0) += line.hits;
    }
    *into = by_number
        .into_iter()
        .map(|(number, hits)| CoberturaLine { number, hits })
        .collect();
}

impl CoberturaReport {
    fn merge(&mut self, other: CoberturaReport) {
        self.timestamp_nanos = self.timestamp_nanos.min(other.timestamp_nanos);
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
        for package in other.packages {
            if let Some(existing) = self.packages.iter_mut().find(|p| p.name == package.name) {
                existing.merge(package);
            } else {
                self.packages.push(package);
            }
        }
    }

    /// `(valid, covered)` recomputed from the per-class line sets.
    #[must_use]
    pub fn line_summary(&self) -> (usize, usize) {
        let mut valid = 0;
        let mut covered = 0;
        for package in &self.packages {
            for class in &package.classes {
                valid += class.lines.len();
                covered += class.lines.iter().filter(|l| l.hits > 0).count();
            }
        }
        (valid, covered)
    }

    /// Render as Cobertura XML with a DTD reference. Rates are computed
    /// from the line sets at render time.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let (valid, covered) = self.line_summary();
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(
            "<!DOCTYPE coverage SYSTEM \"http://cobertura.sourceforge.net/xml/coverage-04.dtd\">\n",
        );
        let _ = writeln!(
            out,
            "<coverage line-rate=\"{}\" branch-rate=\"0\" version=\"1.9\" timestamp=\"{}\" lines-covered=\"{}\" lines-valid=\"{}\">",
            line_rate(valid, covered),
            self.timestamp_nanos,
            covered,
            valid,
        );
        out.push_str("  <sources>\n");
        for source in &self.sources {
            let _ = writeln!(out, "    <source>{}</source>", xml_escape(source));
        }
        out.push_str("  </sources>\n");
        out.push_str("  <packages>\n");
        for package in &self.packages {
            let _ = writeln!(
                out,
                "    <package name=\"{}\">",
                xml_escape(&package.name)
            );
            out.push_str("      <classes>\n");
            for class in &package.classes {
                let class_valid = class.lines.len();
                let class_covered = class.lines.iter().filter(|l| l.hits > 0).count();
                let _ = writeln!(
                    out,
                    "        <class name=\"{}\" filename=\"{}\" line-rate=\"{}\" branch-rate=\"0\">",
                    xml_escape(&class.name),
                    xml_escape(&class.filename),
                    line_rate(class_valid, class_covered),
                );
                out.push_str("          <methods>\n");
                for method in &class.methods {
                    let _ = writeln!(
                        out,
                        "            <method name=\"{}\">",
                        xml_escape(&method.name)
                    );
                    out.push_str("              <lines>\n");
                    for line in &method.lines {
                        let _ = writeln!(
                            out,
                            "                <line number=\"{}\" hits=\"{}\"/>",
                            line.number, line.hits
                        );
                    }
                    out.push_str("              </lines>\n");
                    out.push_str("            </method>\n");
                }
                out.push_str("          </methods>\n");
                out.push_str("          <lines>\n");
                for line in &class.lines {
                    let _ = writeln!(
                        out,
                        "            <line number=\"{}\" hits=\"{}\"/>",
                        line.number, line.hits
                    );
                }
                out.push_str("          </lines>\n");
                out.push_str("        </class>\n");
            }
            out.push_str("      </classes>\n");
            out.push_str("    </package>\n");
        }
        out.push_str("  </packages>\n");
        out.push_str("</coverage>\n");
        out
    }
}

impl CoberturaPackage {
    fn merge(&mut self, other: CoberturaPackage) {
        for class in other.classes {
            if let Some(existing) = self
                .classes
                .iter_mut()
                .find(|c| c.name == class.name && c.filename == class.filename)
            {
                existing.merge(class);
            } else {
                self.classes.push(class);
            }
        }
    }
}

impl CoberturaClass {
    fn merge(&mut self, other: CoberturaClass) {
        for method in other.methods {
            if let Some(existing) = self.methods.iter_mut().find(|m| m.name == method.name) {
                merge_cobertura_lines(&mut existing.lines, method.lines);
            } else {
                self.methods.push(method);
            }
        }
        merge_cobertura_lines(&mut self.lines, other.lines);
    }
}

impl GenericReport {
    fn merge(&mut self, other: GenericReport) {
        self.timestamp_nanos = self.timestamp_nanos.min(other.timestamp_nanos);
        for file in other.files {
            if let Some(existing) = self.files.iter_mut().find(|f| f.path == file.path) {
                let mut by_number: BTreeMap<usize, bool> =
                    existing.lines.iter().map(|l| (l.number, l.covered)).collect();
                for line in file.lines {
                    let entry = by_number.entry(line.number).or_insert(false);
                    *entry = *entry || line.covered;
                }
                existing.lines = by_number
                    .into_iter()
                    .map(|(number, covered)| GenericLine { number, covered })
                    .collect();
            } else {
                self.files.push(file);
            }
        }
    }

    /// `(valid, covered)` recomputed from the per-file line sets.
    #[must_use]
    pub fn line_summary(&self) -> (usize, usize) {
        let mut valid = 0;
        let mut covered = 0;
        for file in &self.files {
            valid += file.lines.len();
            covered += file.lines.iter().filter(|l| l.covered).count();
        }
        (valid, covered)
    }

    /// Render as generic coverage XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<coverage version=\"1\">\n");
        for file in &self.files {
            let _ = writeln!(out, "  <file path=\"{}\">", xml_escape(&file.path));
            for line in &file.lines {
                let _ = writeln!(
                    out,
                    "    <lineToCover lineNumber=\"{}\" covered=\"{}\"/>",
                    line.number, line.covered
                );
            }
            out.push_str("  </file>\n");
        }
        out.push_str("</coverage>\n");
        out
    }
}

fn line_rate(valid: usize, covered: usize) -> String {
    if valid == 0 {
        "0".to_owned()
    } else {
        #[allow(clippy::cast_precision_loss)]
        let rate = covered as f64 / valid as f64;
        format!("{rate:.4}")
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generic(path: &str, lines: &[(usize, bool)]) -> CoverageReport {
        CoverageReport::Generic(GenericReport {
            timestamp_nanos: 1,
            files: vec![GenericFile {
                path: path.to_owned(),
                lines: lines
                    .iter()
                    .map(|&(number, covered)| GenericLine { number, covered })
                    .collect(),
            }],
        })
    }

    fn detailed(filename: &str, lines: &[(usize, i64)]) -> CoverageReport {
        CoverageReport::Detailed(CoberturaReport {
            timestamp_nanos: 1,
            sources: vec![".".to_owned()],
            packages: vec![CoberturaPackage {
                name: "pkg".to_owned(),
                classes: vec![CoberturaClass {
                    name: "default".to_owned(),
                    filename: filename.to_owned(),
                    methods: Vec::new(),
                    lines: lines
                        .iter()
                        .map(|&(number, hits)| CoberturaLine { number, hits })
                        .collect(),
                }],
            }],
        })
    }

    #[test]
    fn generic_merge_unions_lines_and_ors_covered() {
        let mut a = generic("default.yml", &[(1, true), (2, false)]);
        let b = generic("default.yml", &[(2, true), (3, false)]);
        a.merge(b).unwrap();
        let CoverageReport::Generic(report) = &a else {
            panic!("shape changed");
        };
        assert_eq!(
            report.files[0].lines,
            vec![
                GenericLine { number: 1, covered: true },
                GenericLine { number: 2, covered: true },
                GenericLine { number: 3, covered: false },
            ]
        );
    }

    #[test]
    fn generic_merge_is_order_insensitive_on_covered_sets() {
        let a = generic("f.yml", &[(1, true), (4, false)]);
        let b = generic("f.yml", &[(2, true)]);
        let c = generic("f.yml", &[(4, true), (5, false)]);

        let mut left = a.clone();
        left.merge(b.clone()).unwrap();
        left.merge(c.clone()).unwrap();

        let mut right = c;
        right.merge(a).unwrap();
        right.merge(b).unwrap();

        assert_eq!(left.line_summary(), right.line_summary());
        let (CoverageReport::Generic(l), CoverageReport::Generic(r)) = (&left, &right) else {
            panic!("shape changed");
        };
        assert_eq!(l.files[0].lines, r.files[0].lines);
    }

    #[test]
    fn detailed_merge_sums_hits_per_line() {
        let mut a = detailed("default.yml", &[(1, 13), (2, 0)]);
        let b = detailed("default.yml", &[(1, 4), (2, 17)]);
        a.merge(b).unwrap();
        let CoverageReport::Detailed(report) = &a else {
            panic!("shape changed");
        };
        assert_eq!(
            report.packages[0].classes[0].lines,
            vec![
                CoberturaLine { number: 1, hits: 17 },
                CoberturaLine { number: 2, hits: 17 },
            ]
        );
    }

    #[test]
    fn summary_is_recomputed_not_accumulated() {
        let mut a = detailed("default.yml", &[(1, 1), (2, 0)]);
        assert_eq!(a.line_summary(), (2, 1));
        let b = detailed("default.yml", &[(2, 5)]);
        a.merge(b).unwrap();
        // Line 2 became covered; the totals must reflect the merged set.
        assert_eq!(a.line_summary(), (2, 2));
    }

    #[test]
    fn merging_mismatched_shapes_is_an_error() {
        let mut a = detailed("default.yml", &[(1, 1)]);
        let b = generic("default.yml", &[(1, true)]);
        let err = a.merge(b).unwrap_err();
        assert!(err.to_string().contains("different formats"));
    }

    #[test]
    fn merge_keeps_earlier_timestamp() {
        let mut a = generic("f.yml", &[(1, true)]);
        let mut b = generic("f.yml", &[(2, true)]);
        if let CoverageReport::Generic(r) = &mut b {
            r.timestamp_nanos = 99;
        }
        if let CoverageReport::Generic(r) = &mut a {
            r.timestamp_nanos = 50;
        }
        a.merge(b).unwrap();
        assert_eq!(a.timestamp(), 50);
    }

    #[test]
    fn cobertura_xml_has_dtd_and_recomputed_rates() {
        let report = detailed("default.yml", &[(1, 3), (2, 0)]);
        let xml = report.to_xml();
        assert!(xml.contains("coverage-04.dtd"));
        assert!(xml.contains("lines-valid=\"2\""));
        assert!(xml.contains("lines-covered=\"1\""));
        assert!(xml.contains("line-rate=\"0.5000\""));
        assert!(xml.contains("filename=\"default.yml\""));
    }

    #[test]
    fn generic_xml_matches_schema_shape() {
        let report = generic("manifest.yml", &[(2, false)]);
        let xml = report.to_xml();
        assert!(xml.contains("<coverage version=\"1\">"));
        assert!(xml.contains("<file path=\"manifest.yml\">"));
        assert!(xml.contains("<lineToCover lineNumber=\"2\" covered=\"false\"/>"));
    }

    #[test]
    fn xml_escapes_attribute_text() {
        let report = generic("a&b<c>.yml", &[(1, true)]);
        let xml = report.to_xml();
        assert!(xml.contains("a&amp;b&lt;c&gt;.yml"));
    }

    mod merge_properties {
        use proptest::prelude::*;

        use super::*;

        fn line_pairs(map: &BTreeMap<usize, bool>) -> Vec<(usize, bool)> {
            map.iter().map(|(&number, &covered)| (number, covered)).collect()
        }

        proptest! {
            #[test]
            fn prop_generic_merge_is_a_covered_union(
                a in proptest::collection::btree_map(1_usize..40, proptest::bool::ANY, 0..20),
                b in proptest::collection::btree_map(1_usize..40, proptest::bool::ANY, 0..20),
            ) {
                let mut merged = generic("f.yml", &line_pairs(&a));
                merged.merge(generic("f.yml", &line_pairs(&b))).unwrap();

                let mut expected = a.clone();
                for (&number, &covered) in &b {
                    let entry = expected.entry(number).or_insert(false);
                    *entry = *entry || covered;
                }
                let CoverageReport::Generic(report) = &merged else {
                    panic!("shape changed");
                };
                let got: BTreeMap<usize, bool> = report.files[0]
                    .lines
                    .iter()
                    .map(|l| (l.number, l.covered))
                    .collect();
                prop_assert_eq!(&got, &expected);

                let covered = expected.values().filter(|c| **c).count();
                prop_assert_eq!(merged.line_summary(), (expected.len(), covered));
            }

            #[test]
            fn prop_detailed_merge_sums_hits_per_line(
                a in proptest::collection::btree_map(1_usize..40, 0_i64..100, 0..20),
                b in proptest::collection::btree_map(1_usize..40, 0_i64..100, 0..20),
            ) {
                let mut merged = detailed(
                    "default.yml",
                    &a.iter().map(|(&n, &h)| (n, h)).collect::<Vec<_>>(),
                );
                merged
                    .merge(detailed(
                        "default.yml",
                        &b.iter().map(|(&n, &h)| (n, h)).collect::<Vec<_>>(),
                    ))
                    .unwrap();

                let mut expected = a.clone();
                for (&number, &hits) in &b {
                    *expected.entry(number).or_insert(0) += hits;
                }
                let CoverageReport::Detailed(report) = &merged else {
                    panic!("shape changed");
                };
                let got: BTreeMap<usize, i64> = report.packages[0].classes[0]
                    .lines
                    .iter()
                    .map(|l| (l.number, l.hits))
                    .collect();
                prop_assert_eq!(&got, &expected);

                let covered = expected.values().filter(|h| **h > 0).count();
                prop_assert_eq!(merged.line_summary(), (expected.len(), covered));
            }
        }
    }
}
