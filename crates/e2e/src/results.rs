//! Playwright JSON reporter output → normalized test summary

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use fleetqa_common::util::now_rfc3339;

use crate::classify::{classify, Classification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Passed => f.write_str("passed"),
            RunStatus::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    pub title_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub classification: Classification,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaywrightSummary {
    pub started_at: String,
    pub finished_at: String,
    pub status: RunStatus,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub flaky: u64,
    pub skipped: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    pub failures: Vec<FailureDetail>,
}

// Subset of the Playwright JSON reporter schema. Everything defaults so a
// partially written document still yields counts.

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ReportDoc {
    stats: Stats,
    suites: Vec<Suite>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Stats {
    start_time: Option<String>,
    duration: Option<f64>,
    expected: u64,
    unexpected: u64,
    flaky: u64,
    skipped: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Suite {
    title: String,
    suites: Vec<Suite>,
    specs: Vec<Spec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Spec {
    title: String,
    file: Option<String>,
    tests: Vec<Test>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Test {
    project_name: Option<String>,
    results: Vec<TestRun>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TestRun {
    status: String,
    error: Option<TestError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TestError {
    message: Option<String>,
    stack: Option<String>,
}

impl TestRun {
    fn is_failure(&self) -> bool {
        self.status == "failed" || self.status == "timedOut"
    }
}

/// Where the runner is configured to drop its JSON report for an audit dir.
/// Retargeting to another runner means re-establishing this contract.
pub fn expected_results_path(audit_dir: &Path) -> PathBuf {
    audit_dir.join("evidence").join("playwright-results.json")
}

/// Read and summarize a results document. `None` when the file is missing
/// or is not a Playwright JSON report.
pub fn read_summary(json_path: &Path) -> Option<PlaywrightSummary> {
    let raw = std::fs::read_to_string(json_path).ok()?;
    match parse_summary(&raw) {
        Ok(summary) => Some(summary),
        Err(e) => {
            warn!("Unparseable runner output at {}: {}", json_path.display(), e);
            None
        }
    }
}

pub fn parse_summary(raw: &str) -> Result<PlaywrightSummary, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if value.get("stats").is_none() && value.get("suites").is_none() {
        return Err(serde::de::Error::custom("document has neither stats nor suites"));
    }
    let doc: ReportDoc = serde_json::from_value(value)?;

    let stats = &doc.stats;
    let passed = stats.expected;
    let failed = stats.unexpected;
    let flaky = stats.flaky;
    let skipped = stats.skipped;

    let mut failures = Vec::new();
    for suite in &doc.suites {
        collect_failures(suite, &mut Vec::new(), &mut failures);
    }

    Ok(PlaywrightSummary {
        started_at: stats.start_time.clone().unwrap_or_else(now_rfc3339),
        finished_at: now_rfc3339(),
        status: if failed > 0 { RunStatus::Failed } else { RunStatus::Passed },
        total: passed + failed + flaky + skipped,
        passed,
        failed,
        flaky,
        skipped,
        duration_ms: stats.duration,
        failures,
    })
}

fn collect_failures(suite: &Suite, titles: &mut Vec<String>, out: &mut Vec<FailureDetail>) {
    let pushed = !suite.title.is_empty();
    if pushed {
        titles.push(suite.title.clone());
    }

    for spec in &suite.specs {
        for test in &spec.tests {
            let Some(run) = test.results.iter().find(|r| r.is_failure()) else {
                continue;
            };
            let error_message = run
                .error
                .as_ref()
                .and_then(|e| e.message.clone().or_else(|| e.stack.clone()));
            let verdict = classify(error_message.as_deref().unwrap_or(""));

            let mut title_path = titles.clone();
            if !spec.title.is_empty() {
                title_path.push(spec.title.clone());
            }

            out.push(FailureDetail {
                title_path,
                file: spec.file.clone(),
                project: test.project_name.clone(),
                error_message,
                classification: verdict.classification,
                confidence: verdict.confidence,
            });
        }
    }

    for child in &suite.suites {
        collect_failures(child, titles, out);
    }

    if pushed {
        titles.pop();
    }
}
