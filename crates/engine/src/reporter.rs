//! Result collection and report output

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use testforge_common::TestSuite;
use tracing::info;

use crate::error::EngineResult;

/// Response bodies above this size are cut in report snapshots
const SNAPSHOT_BODY_LIMIT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitKind {
    TestData,
    TestStep,
}

/// Response captured for a test data item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl ResponseSnapshot {
    pub fn new(status: u16, headers: BTreeMap<String, String>, body_text: &str, parsed: Option<&Value>) -> Self {
        let body = match parsed {
            Some(json) if body_text.len() <= SNAPSHOT_BODY_LIMIT => json.clone(),
            _ => {
                let mut end = body_text.len().min(SNAPSHOT_BODY_LIMIT);
                while !body_text.is_char_boundary(end) {
                    end -= 1;
                }
                let mut text = body_text[..end].to_string();
                if end < body_text.len() {
                    text.push_str("...");
                }
                Value::String(text)
            }
        };
        Self { status, headers, body }
    }
}

/// Result of one execution unit (test data item or UI step)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub suite_id: String,
    pub suite_name: String,
    pub test_case_id: String,
    pub test_case_name: String,
    pub unit: UnitKind,
    pub index: usize,
    pub name: String,
    pub status: Status,
    pub assertions_passed: u32,
    pub assertions_failed: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub suite_name: String,
    pub tags: Vec<BTreeMap<String, String>>,
    pub total_test_cases: usize,
    pub total_data_sets: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_assertions_passed: u32,
    pub total_assertions_failed: u32,
    pub execution_time_ms: u64,
}

/// Report file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub results: Vec<ReportEntry>,
}

impl Report {
    /// Write `<suite>-<timestamp>.json` into `dir`
    pub fn write_to(&self, dir: &Path) -> EngineResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let stem: String = self
            .summary
            .suite_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
        let path = dir.join(format!("{}-{}.json", stem, stamp));

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Report written to: {}", path.display());
        Ok(path)
    }
}

/// Accumulates entries for one suite run
pub struct Reporter {
    suite_name: String,
    tags: Vec<BTreeMap<String, String>>,
    started: Instant,
    results: Vec<ReportEntry>,
}

impl Reporter {
    pub fn new(suite: &TestSuite) -> Self {
        Self::named(&suite.suite_name, suite.tags.clone())
    }

    pub fn named(suite_name: &str, tags: Vec<BTreeMap<String, String>>) -> Self {
        Self {
            suite_name: suite_name.to_string(),
            tags,
            started: Instant::now(),
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: ReportEntry) {
        self.results.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ReportEntry>) {
        self.results.extend(entries);
    }

    pub fn summary(&self) -> ReportSummary {
        let count = |status: Status| self.results.iter().filter(|r| r.status == status).count();
        let cases: BTreeSet<(&str, &str)> = self
            .results
            .iter()
            .map(|r| (r.test_case_id.as_str(), r.test_case_name.as_str()))
            .collect();

        ReportSummary {
            suite_name: self.suite_name.clone(),
            tags: self.tags.clone(),
            total_test_cases: cases.len(),
            total_data_sets: self.results.len(),
            passed: count(Status::Pass),
            failed: count(Status::Fail),
            skipped: count(Status::Skipped),
            total_assertions_passed: self.results.iter().map(|r| r.assertions_passed).sum(),
            total_assertions_failed: self.results.iter().map(|r| r.assertions_failed).sum(),
            execution_time_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    pub fn finish(self) -> Report {
        Report {
            summary: self.summary(),
            results: self.results,
        }
    }
}

/// Totals across every suite of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub execution_time_ms: u64,
}

impl RunSummary {
    pub fn add(&mut self, summary: &ReportSummary) {
        self.total += summary.total_data_sets;
        self.passed += summary.passed;
        self.failed += summary.failed;
        self.skipped += summary.skipped;
    }

    /// Count a suite that could not run at all as one failure
    pub fn add_failed_suite(&mut self) {
        self.total += 1;
        self.failed += 1;
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Fixed-format lines parsed by external tooling
    pub fn render(&self) -> String {
        format!(
            "Total: {}\n{} passed\n{} failed\nExecution time: {}ms",
            self.total, self.passed, self.failed, self.execution_time_ms
        )
    }

    pub fn print(&self) {
        println!("{}", self.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(case: &str, status: Status, passed: u32, failed: u32) -> ReportEntry {
        ReportEntry {
            suite_id: "s1".into(),
            suite_name: "Suite".into(),
            test_case_id: case.into(),
            test_case_name: case.into(),
            unit: UnitKind::TestData,
            index: 0,
            name: "item".into(),
            status,
            assertions_passed: passed,
            assertions_failed: failed,
            duration_ms: 1,
            error: None,
            response: None,
            screenshot: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut reporter = Reporter::named("Suite", vec![]);
        reporter.record(entry("a", Status::Pass, 3, 0));
        reporter.record(entry("a", Status::Fail, 1, 2));
        reporter.record(entry("b", Status::Skipped, 0, 0));

        let summary = reporter.summary();
        assert_eq!(summary.total_test_cases, 2);
        assert_eq!(summary.total_data_sets, 3);
        assert_eq!((summary.passed, summary.failed, summary.skipped), (1, 1, 1));
        assert_eq!((summary.total_assertions_passed, summary.total_assertions_failed), (4, 2));
    }

    #[test]
    fn test_report_file_and_summary_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = Reporter::named("Users API", vec![]);
        reporter.record(entry("a", Status::Pass, 1, 0));
        let report = reporter.finish();
        let path = report.write_to(dir.path()).unwrap();
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["summary"]["suiteName"], "Users API");
        assert_eq!(written["results"][0]["status"], "PASS");

        let mut run = RunSummary::default();
        run.add(&report.summary);
        run.execution_time_ms = 12;
        assert_eq!(run.render(), "Total: 1\n1 passed\n0 failed\nExecution time: 12ms");
    }

    #[test]
    fn test_snapshot_truncates_large_bodies() {
        let big = "x".repeat(SNAPSHOT_BODY_LIMIT + 10);
        let snapshot = ResponseSnapshot::new(200, BTreeMap::new(), &big, None);
        assert!(snapshot.body.as_str().unwrap().ends_with("..."));
    }
}
