//! Run index: one row per audited module

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use fleetqa_common::util::{write_json, write_text, GitMeta};
use fleetqa_common::SeverityCounts;

use crate::error::AuditResult;
use crate::options::OptionsEcho;
use crate::report::{md_cell, ModuleReport, ModuleStatus, StatusReason};
use crate::results::{PlaywrightSummary, RunStatus};

/// Playwright counts without the failure details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaywrightCounts {
    pub status: RunStatus,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub flaky: u64,
    pub skipped: u64,
}

impl From<&PlaywrightSummary> for PlaywrightCounts {
    fn from(s: &PlaywrightSummary) -> Self {
        Self {
            status: s.status,
            total: s.total,
            passed: s.passed,
            failed: s.failed,
            flaky: s.flaky,
            skipped: s.skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleIndexEntry {
    pub id: String,
    pub label: String,
    pub status: ModuleStatus,
    pub status_reasons: Vec<StatusReason>,
    pub report_dir: String,
    pub report_md_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playwright: Option<PlaywrightCounts>,
    pub findings_by_severity: SeverityCounts,
}

impl ModuleIndexEntry {
    pub fn from_report(report: &ModuleReport, report_dir: &Path, report_md_path: &Path) -> Self {
        Self {
            id: report.metadata.module.id.clone(),
            label: report.metadata.module.label.clone(),
            status: report.metadata.status,
            status_reasons: report.metadata.status_reasons.clone(),
            report_dir: report_dir.display().to_string(),
            report_md_path: report_md_path.display().to_string(),
            playwright: report.playwright.as_ref().map(PlaywrightCounts::from),
            findings_by_severity: report.severity_counts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub run_id: String,
    pub generated_at: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub run_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSetup {
    pub skipped: bool,
    pub commands_run: Vec<String>,
    /// `"<cmd> (exit N)"` for the command that stopped setup
    pub setup_failed: Vec<String>,
}

impl RunSetup {
    pub fn failed(&self) -> bool {
        !self.setup_failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunIndex {
    pub metadata: RunMetadata,
    pub options: OptionsEcho,
    pub setup: RunSetup,
    pub modules: Vec<ModuleIndexEntry>,
}

impl RunIndex {
    pub fn any_red(&self) -> bool {
        self.modules.iter().any(|m| m.status.is_red())
    }
}

/// Path of `target` relative to the directory `base`. Both must be rooted
/// the same way (both absolute or both relative to one directory).
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = target.components().collect();
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for component in &target[common..] {
        rel.push(component.as_os_str());
    }
    rel
}

pub fn render_index_markdown(index: &RunIndex, run_dir: &Path) -> String {
    let meta = &index.metadata;
    let mut md = String::new();
    let _ = writeln!(md, "# QA Audit Index\n");
    let _ = writeln!(md, "**Run ID:** {}  ", meta.run_id);
    let _ = writeln!(md, "**Generated:** {}  ", meta.generated_at);
    let _ = writeln!(md, "**Base URL:** {}  ", meta.base_url);
    let _ = writeln!(md, "**Run dir:** {}  ", meta.run_dir);
    if index.setup.failed() {
        let _ = writeln!(md, "**Setup failed:** {}  ", md_cell(&index.setup.setup_failed.join("; ")));
    }

    let _ = writeln!(md, "\n## Modules\n");
    let _ = writeln!(md, "| Module | Label | Status | Playwright | P0 | P1 | P2 | P3 | Reasons | Report |");
    let _ = writeln!(md, "|---|---|---|---|---:|---:|---:|---:|---|---|");
    if index.modules.is_empty() {
        let _ = writeln!(md, "| _none_ |  |  |  |  |  |  |  |  |  |");
    }
    for m in &index.modules {
        let playwright = match &m.playwright {
            Some(pw) => format!("{} ({}/{})", pw.status, pw.failed, pw.total),
            None => "skipped".to_string(),
        };
        let reasons: Vec<&str> = m.status_reasons.iter().map(StatusReason::as_str).collect();
        let report = relative_path(run_dir, Path::new(&m.report_md_path));
        let report = md_cell(&report.to_string_lossy());
        let f = &m.findings_by_severity;
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | [{}]({}) |",
            md_cell(&m.id),
            md_cell(&m.label),
            m.status,
            md_cell(&playwright),
            f.p0,
            f.p1,
            f.p2,
            f.p3,
            md_cell(&reasons.join(", ")),
            report,
            report,
        );
    }
    md
}

pub fn write_run_index(run_dir: &Path, index: &RunIndex) -> AuditResult<()> {
    write_json(&run_dir.join("index.json"), index)?;
    write_text(&run_dir.join("index.md"), &render_index_markdown(index, run_dir))?;
    Ok(())
}
