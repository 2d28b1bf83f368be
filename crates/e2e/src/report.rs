//! Per-module audit report: status verdict, test backlog, JSON and Markdown

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use fleetqa_common::util::{write_json, write_text, GitMeta};
use fleetqa_common::{Area, Finding, FindingType, Module, Severity, SeverityCounts};

use crate::error::AuditResult;
use crate::explore::ExplorationReport;
use crate::results::{PlaywrightSummary, RunStatus};

const MAX_ERROR_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Green,
    Red,
}

impl ModuleStatus {
    pub fn is_red(&self) -> bool {
        matches!(self, ModuleStatus::Red)
    }
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleStatus::Green => f.write_str("GREEN"),
            ModuleStatus::Red => f.write_str("RED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusReason {
    #[serde(rename = "setup_failed")]
    SetupFailed,
    #[serde(rename = "test_setup_failed")]
    TestSetupFailed,
    #[serde(rename = "playwright_failed")]
    PlaywrightFailed,
    #[serde(rename = "p0_p1_findings")]
    BlockingFindings,
}

impl StatusReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReason::SetupFailed => "setup_failed",
            StatusReason::TestSetupFailed => "test_setup_failed",
            StatusReason::PlaywrightFailed => "playwright_failed",
            StatusReason::BlockingFindings => "p0_p1_findings",
        }
    }
}

/// Facts the verdict is computed from
#[derive(Debug, Clone, Copy)]
pub struct StatusInputs<'a> {
    pub env_setup_failed: bool,
    pub test_setup_failed: bool,
    pub playwright: Option<&'a PlaywrightSummary>,
    pub findings: &'a [Finding],
}

/// Red iff any reason applies. Never set by hand.
pub fn derive_status(inputs: StatusInputs<'_>) -> (ModuleStatus, Vec<StatusReason>) {
    let mut reasons = Vec::new();
    if inputs.env_setup_failed {
        reasons.push(StatusReason::SetupFailed);
    }
    if inputs.test_setup_failed {
        reasons.push(StatusReason::TestSetupFailed);
    }
    if inputs.playwright.is_some_and(|s| s.status == RunStatus::Failed) {
        reasons.push(StatusReason::PlaywrightFailed);
    }
    if inputs.findings.iter().any(|f| f.severity.is_blocking()) {
        reasons.push(StatusReason::BlockingFindings);
    }
    let status = if reasons.is_empty() {
        ModuleStatus::Green
    } else {
        ModuleStatus::Red
    };
    (status, reasons)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub id: String,
    pub label: String,
    pub areas: Vec<Area>,
    pub test_files: Vec<String>,
}

impl From<&Module> for ModuleInfo {
    fn from(module: &Module) -> Self {
        Self {
            id: module.id.to_string(),
            label: module.label.to_string(),
            areas: module.areas.to_vec(),
            test_files: module.test_files.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub generated_at: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub audit_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitMeta>,
    pub module: ModuleInfo,
    pub status: ModuleStatus,
    pub status_reasons: Vec<StatusReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupSection {
    pub skipped: bool,
    pub commands_run: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    #[serde(rename = "E2E")]
    E2e,
    Functional,
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestKind::E2e => f.write_str("E2E"),
            TestKind::Functional => f.write_str("Functional"),
        }
    }
}

/// A proposed test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestBacklogItem {
    pub id: String,
    pub description: String,
    pub priority: Severity,
    #[serde(rename = "type")]
    pub kind: TestKind,
    pub steps: Vec<String>,
    pub expected_results: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReport {
    pub metadata: ReportMetadata,
    pub setup: SetupSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playwright: Option<PlaywrightSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploration: Option<ExplorationReport>,
    pub findings: Vec<Finding>,
    pub test_backlog: Vec<TestBacklogItem>,
}

impl ModuleReport {
    pub fn severity_counts(&self) -> SeverityCounts {
        SeverityCounts::tally(&self.findings)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Two standing negative tests, then one regression test per functional
/// P0-P2 finding.
pub fn build_test_backlog(findings: &[Finding]) -> Vec<TestBacklogItem> {
    let mut backlog: Vec<TestBacklogItem> = Vec::new();
    let mut add = |description: String,
                   priority: Severity,
                   kind: TestKind,
                   steps: Vec<String>,
                   expected_results: Vec<String>,
                   tags: Vec<String>| {
        let id = format!("TC-AUDIT-{:03}", backlog.len() + 1);
        backlog.push(TestBacklogItem {
            id,
            description,
            priority,
            kind,
            steps,
            expected_results,
            tags,
        });
    };

    add(
        "Auth: login fails with wrong password shows actionable error".to_string(),
        Severity::P1,
        TestKind::E2e,
        strings(&["Go to /login", "Enter valid email + wrong password", "Submit"]),
        strings(&["User stays on login", "Error message displayed", "No token stored"]),
        strings(&["auth", "negative"]),
    );
    add(
        "API: protected route without Authorization returns 401".to_string(),
        Severity::P1,
        TestKind::Functional,
        strings(&["Call GET /api/dashboard/overview without Authorization header"]),
        strings(&["HTTP 401", "Body contains success=false and auth error"]),
        strings(&["api", "auth", "middleware"]),
    );

    for finding in findings {
        if finding.finding_type != FindingType::Functional || finding.severity == Severity::P3 {
            continue;
        }
        let mut steps = vec![match finding.role {
            Some(role) => format!("Login as {}", role),
            None => "Login".to_string(),
        }];
        if let Some(url) = &finding.url {
            steps.push(format!("Navigate to {}", url));
        }
        steps.push("Verify no console/page errors".to_string());

        let mut tags = vec!["regression".to_string()];
        tags.extend(finding.tags.iter().cloned());

        add(
            format!("Regression: {}", finding.title),
            finding.severity,
            TestKind::E2e,
            steps,
            strings(&["No uncaught exceptions", "Page renders expected content"]),
            tags,
        );
    }

    backlog
}

/// Escape a value for a Markdown table cell.
pub fn md_cell(text: &str) -> String {
    text.replace('|', "\\|").replace("\r\n", " ").replace('\n', " ")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max).collect();
        out.push('…');
        out
    }
}

pub fn render_markdown(report: &ModuleReport) -> String {
    let meta = &report.metadata;
    let counts = report.severity_counts();
    let mut md = String::new();

    let _ = writeln!(md, "# QA Audit: {} ({})\n", meta.module.label, meta.module.id);
    let _ = writeln!(md, "**Generated:** {}  ", meta.generated_at);
    let _ = writeln!(md, "**Base URL:** {}  ", meta.base_url);
    let _ = writeln!(md, "**Audit dir:** {}  ", meta.audit_dir);
    if let Some(git) = &meta.git {
        let _ = writeln!(
            md,
            "**Git:** {} @ {}  ",
            git.branch.as_deref().unwrap_or("?"),
            git.commit.as_deref().unwrap_or("?")
        );
    }

    let _ = writeln!(md, "\n## Executive summary\n");
    let _ = writeln!(md, "- **Status:** {}", meta.status);
    if !meta.status_reasons.is_empty() {
        let reasons: Vec<&str> = meta.status_reasons.iter().map(StatusReason::as_str).collect();
        let _ = writeln!(md, "- **Reasons:** {}", reasons.join(", "));
    }
    let _ = writeln!(
        md,
        "- **Findings:** P0 {} · P1 {} · P2 {} · P3 {}",
        counts.p0, counts.p1, counts.p2, counts.p3
    );
    match &report.playwright {
        Some(pw) => {
            let _ = writeln!(
                md,
                "- **Playwright:** {} ({} passed, {} failed, {} flaky, {} skipped of {})",
                pw.status, pw.passed, pw.failed, pw.flaky, pw.skipped, pw.total
            );
        }
        None => {
            let _ = writeln!(md, "- **Playwright:** not run");
        }
    }
    let pages = report.exploration.as_ref().map_or(0, |e| e.pages.len());
    let _ = writeln!(md, "- **Pages explored:** {}", pages);

    let _ = writeln!(md, "\n## Findings\n");
    if report.findings.is_empty() {
        let _ = writeln!(md, "_No findings._");
    } else {
        let _ = writeln!(md, "| Severity | ID | Type | Title | Role | URL | Observed |");
        let _ = writeln!(md, "|---|---|---|---|---|---|---|");
        let mut sorted: Vec<&Finding> = report.findings.iter().collect();
        sorted.sort_by_key(|f| f.severity);
        for f in sorted {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} | {} |",
                f.severity,
                md_cell(&f.id),
                f.finding_type,
                md_cell(&f.title),
                f.role.map(|r| r.to_string()).unwrap_or_default(),
                md_cell(f.url.as_deref().unwrap_or("")),
                md_cell(&truncate(f.observed.as_deref().unwrap_or(""), MAX_ERROR_CHARS)),
            );
        }
    }

    let _ = writeln!(md, "\n## Setup\n");
    if report.setup.skipped {
        let _ = writeln!(md, "Environment setup skipped.\n");
    }
    if report.setup.commands_run.is_empty() {
        let _ = writeln!(md, "_No commands run._");
    } else {
        for cmd in &report.setup.commands_run {
            let _ = writeln!(md, "- `{}`", cmd);
        }
    }

    if let Some(pw) = &report.playwright {
        let _ = writeln!(md, "\n## Playwright\n");
        let _ = writeln!(md, "- Started: {}", pw.started_at);
        let _ = writeln!(md, "- Finished: {}", pw.finished_at);
        if let Some(ms) = pw.duration_ms {
            let _ = writeln!(md, "- Duration: {:.0} ms", ms);
        }
        let _ = writeln!(
            md,
            "- Total {} / passed {} / failed {} / flaky {} / skipped {}",
            pw.total, pw.passed, pw.failed, pw.flaky, pw.skipped
        );
        if !pw.failures.is_empty() {
            let _ = writeln!(md, "\n### Failure triage\n");
            let _ = writeln!(md, "| Test | Classification | Confidence | Error |");
            let _ = writeln!(md, "|---|---|---:|---|");
            for failure in &pw.failures {
                let _ = writeln!(
                    md,
                    "| {} | {} | {:.2} | {} |",
                    md_cell(&failure.title_path.join(" › ")),
                    failure.classification,
                    failure.confidence,
                    md_cell(&truncate(failure.error_message.as_deref().unwrap_or(""), MAX_ERROR_CHARS)),
                );
            }
        }
    }

    if let Some(exploration) = &report.exploration {
        let _ = writeln!(md, "\n## Exploration\n");
        let _ = writeln!(
            md,
            "| Role | Route | Final URL | HTTP | Console | Page errors | API errors | Unlabeled | Empty buttons | H1 | goto ms |"
        );
        let _ = writeln!(md, "|---|---|---|---:|---:|---:|---:|---:|---:|---|---:|");
        for page in &exploration.pages {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                page.role,
                md_cell(&page.route),
                md_cell(&page.final_url),
                page.http_status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                page.console_errors.len(),
                page.page_errors.len(),
                page.api_errors.len(),
                page.ux_signals.unlabeled_form_controls,
                page.ux_signals.empty_buttons,
                if page.ux_signals.missing_h1 { "missing" } else { "ok" },
                page.timings_ms.goto,
            );
        }
    }

    let _ = writeln!(md, "\n## Test backlog\n");
    for item in &report.test_backlog {
        let _ = writeln!(
            md,
            "### {} [{} · {}] {}\n",
            item.id, item.priority, item.kind, item.description
        );
        let _ = writeln!(md, "Steps:");
        for (i, step) in item.steps.iter().enumerate() {
            let _ = writeln!(md, "{}. {}", i + 1, step);
        }
        let _ = writeln!(md, "\nExpected:");
        for expected in &item.expected_results {
            let _ = writeln!(md, "- {}", expected);
        }
        if !item.tags.is_empty() {
            let _ = writeln!(md, "\nTags: {}", item.tags.join(", "));
        }
        md.push('\n');
    }

    md
}

/// Write `report.json` and `report.md` into the module directory and
/// return the Markdown path.
pub fn write_module_report(module_dir: &Path, report: &ModuleReport) -> AuditResult<PathBuf> {
    write_json(&module_dir.join("report.json"), report)?;
    let md_path = module_dir.join("report.md");
    write_text(&md_path, &render_markdown(report))?;
    Ok(md_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::FailureDetail;
    use crate::classify::Classification;
    use fleetqa_common::{get_module_by_id, Role};

    fn summary(status: RunStatus) -> PlaywrightSummary {
        PlaywrightSummary {
            started_at: "2026-03-01T10:00:00.000Z".to_string(),
            finished_at: "2026-03-01T10:01:00.000Z".to_string(),
            status,
            total: 3,
            passed: 2,
            failed: if status == RunStatus::Failed { 1 } else { 0 },
            flaky: 0,
            skipped: 0,
            duration_ms: Some(60_000.0),
            failures: Vec::new(),
        }
    }

    fn finding(severity: Severity) -> Finding {
        Finding::new("X", FindingType::Functional, severity, "Console error")
    }

    fn inputs<'a>(
        playwright: Option<&'a PlaywrightSummary>,
        findings: &'a [Finding],
    ) -> StatusInputs<'a> {
        StatusInputs {
            env_setup_failed: false,
            test_setup_failed: false,
            playwright,
            findings,
        }
    }

    #[test]
    fn test_green_with_only_p2_findings() {
        let passed = summary(RunStatus::Passed);
        let findings = [finding(Severity::P2), finding(Severity::P3)];
        let (status, reasons) = derive_status(inputs(Some(&passed), &findings));
        assert_eq!(status, ModuleStatus::Green);
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_red_reasons() {
        let failed = summary(RunStatus::Failed);
        let findings = [finding(Severity::P1)];
        let (status, reasons) = derive_status(StatusInputs {
            env_setup_failed: true,
            test_setup_failed: true,
            playwright: Some(&failed),
            findings: &findings,
        });
        assert_eq!(status, ModuleStatus::Red);
        assert_eq!(
            reasons,
            vec![
                StatusReason::SetupFailed,
                StatusReason::TestSetupFailed,
                StatusReason::PlaywrightFailed,
                StatusReason::BlockingFindings,
            ]
        );
    }

    #[test]
    fn test_red_on_single_p0() {
        let findings = [finding(Severity::P0)];
        let (status, reasons) = derive_status(inputs(None, &findings));
        assert!(status.is_red());
        assert_eq!(reasons, vec![StatusReason::BlockingFindings]);
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&[StatusReason::BlockingFindings, StatusReason::TestSetupFailed]).unwrap();
        assert_eq!(json, r#"["p0_p1_findings","test_setup_failed"]"#);
    }

    #[test]
    fn test_backlog_fixed_items_then_regressions() {
        let findings = vec![
            finding(Severity::P1)
                .with_role(Some(Role::Driver))
                .with_url("http://app/fuel")
                .with_tags(&["exploration", "console"]),
            finding(Severity::P3),
            Finding::new("PW-NOJSON-FUEL", FindingType::Test, Severity::P0, "no json"),
            finding(Severity::P2),
        ];
        let backlog = build_test_backlog(&findings);
        assert_eq!(backlog.len(), 4);
        assert_eq!(backlog[0].id, "TC-AUDIT-001");
        assert_eq!(backlog[1].kind, TestKind::Functional);

        let regression = &backlog[2];
        assert_eq!(regression.id, "TC-AUDIT-003");
        assert_eq!(regression.description, "Regression: Console error");
        assert_eq!(regression.priority, Severity::P1);
        assert_eq!(
            regression.steps,
            vec!["Login as DRIVER", "Navigate to http://app/fuel", "Verify no console/page errors"]
        );
        assert_eq!(regression.tags, vec!["regression", "exploration", "console"]);

        assert_eq!(backlog[3].steps, vec!["Login", "Verify no console/page errors"]);
    }

    #[test]
    fn test_md_cell_escapes() {
        assert_eq!(md_cell("a|b\nc"), "a\\|b c");
    }

    #[test]
    fn test_markdown_sorts_findings_and_truncates_errors() {
        let module = get_module_by_id("fuel").unwrap();
        let mut pw = summary(RunStatus::Failed);
        pw.failures.push(FailureDetail {
            title_path: vec!["fuel.spec.ts".into(), "adds entry".into()],
            file: Some("fuel.spec.ts".into()),
            project: None,
            error_message: Some("x".repeat(500)),
            classification: Classification::Unknown,
            confidence: 0.3,
        });
        let findings = vec![
            Finding::new("LOW", FindingType::Functional, Severity::P3, "low"),
            Finding::new("HIGH", FindingType::Test, Severity::P0, "high"),
        ];
        let (status, status_reasons) = derive_status(inputs(Some(&pw), &findings));
        let report = ModuleReport {
            metadata: ReportMetadata {
                generated_at: "now".into(),
                base_url: "http://app".into(),
                audit_dir: "/tmp/fuel".into(),
                git: None,
                module: module.into(),
                status,
                status_reasons,
            },
            setup: SetupSection::default(),
            test_backlog: build_test_backlog(&findings),
            playwright: Some(pw),
            exploration: None,
            findings,
        };
        let md = render_markdown(&report);
        let high = md.find("| P0 | HIGH").unwrap();
        let low = md.find("| P3 | LOW").unwrap();
        assert!(high < low);
        assert!(md.contains("**Status:** RED"));
        assert!(md.contains("playwright_failed, p0_p1_findings"));
        assert!(md.contains(&format!("{}…", "x".repeat(200))));
        assert!(!md.contains(&"x".repeat(201)));
        assert!(md.contains("### TC-AUDIT-001"));
    }

    #[test]
    fn test_write_module_report() {
        let tmp = tempfile::TempDir::new().unwrap();
        let module = get_module_by_id("auth").unwrap();
        let report = ModuleReport {
            metadata: ReportMetadata {
                generated_at: "now".into(),
                base_url: "http://app".into(),
                audit_dir: tmp.path().display().to_string(),
                git: Some(GitMeta::default()),
                module: module.into(),
                status: ModuleStatus::Green,
                status_reasons: Vec::new(),
            },
            setup: SetupSection {
                skipped: true,
                commands_run: Vec::new(),
            },
            playwright: None,
            exploration: None,
            findings: Vec::new(),
            test_backlog: build_test_backlog(&[]),
        };
        let md_path = write_module_report(tmp.path(), &report).unwrap();
        assert!(md_path.ends_with("report.md"));

        let raw = std::fs::read_to_string(tmp.path().join("report.json")).unwrap();
        assert!(raw.ends_with("}\n"));
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["metadata"]["status"], "green");
        assert_eq!(json["metadata"]["baseURL"], "http://app");
        assert_eq!(json["metadata"]["module"]["testFiles"][0], "tests/login-onboarding.spec.ts");
        assert_eq!(json["testBacklog"][1]["type"], "Functional");
        assert!(json.get("playwright").is_none());
    }
}
