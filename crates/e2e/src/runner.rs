//! External E2E runner adapter: setup/spec split, invocation and result pickup

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use fleetqa_common::util::{ensure_dir, try_run, write_json};

use crate::error::AuditResult;
use crate::results::{expected_results_path, read_summary, PlaywrightSummary};

pub const DEFAULT_RUNNER_COMMAND: &str = "npx playwright test -c qa/playwright.qa.config.ts";

/// Configuration for the external test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Command prefix; the file list is appended
    pub command: String,

    /// Base URL handed to the suites through `QA_BASE_URL`
    pub base_url: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_RUNNER_COMMAND.to_string(),
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// A module's test files split by role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestFiles {
    pub setup: Vec<String>,
    pub specs: Vec<String>,
}

/// Seed/prerequisite suites live under `tests/setup/` or end in `.setup.ts`.
pub fn is_setup_file(path: &str) -> bool {
    path.starts_with("tests/setup/") || path.contains("/tests/setup/") || path.ends_with(".setup.ts")
}

pub fn split_test_files(files: &[&str]) -> TestFiles {
    let (setup, specs): (Vec<&str>, Vec<&str>) = files.iter().copied().partition(|f| is_setup_file(f));
    TestFiles {
        setup: setup.into_iter().map(String::from).collect(),
        specs: specs.into_iter().map(String::from).collect(),
    }
}

/// Outcome of a spec-file invocation
#[derive(Debug, Clone)]
pub struct SpecRun {
    pub command: String,
    pub exit_code: i32,
    pub results_path: PathBuf,
    /// `None` when the runner left no readable JSON behind
    pub summary: Option<PlaywrightSummary>,
}

/// Outcome of a setup-file invocation
#[derive(Debug, Clone)]
pub struct SetupRun {
    pub command: String,
    pub exit_code: i32,
}

impl SetupRun {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

pub struct PlaywrightRunner {
    config: RunnerConfig,
}

impl PlaywrightRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn command_line(&self, files: &[String], extra: Option<&str>) -> String {
        let mut cmd = format!("{} {}", self.config.command, files.join(" "));
        if let Some(extra) = extra {
            cmd.push(' ');
            cmd.push_str(extra);
        }
        cmd
    }

    fn env_for(&self, audit_dir: &Path) -> Vec<(&'static str, String)> {
        vec![
            ("QA_AUDIT_DIR", audit_dir.to_string_lossy().to_string()),
            ("QA_BASE_URL", self.config.base_url.clone()),
        ]
    }

    /// Run setup suites in one invocation against their own output directory.
    pub async fn run_setup(&self, files: &[String], setup_dir: &Path) -> AuditResult<SetupRun> {
        ensure_dir(setup_dir)?;
        let command = self.command_line(files, Some("--reporter=line"));
        info!("Running {} setup file(s)", files.len());
        let exit_code = try_run(&command, &self.env_for(setup_dir)).await;
        Ok(SetupRun { command, exit_code })
    }

    /// Run spec suites in one invocation and pick up the JSON report from
    /// its fixed location. A missing report is replaced by a placeholder
    /// so downstream readers always find a JSON document.
    pub async fn run_specs(&self, files: &[String], module_dir: &Path) -> AuditResult<SpecRun> {
        ensure_dir(&module_dir.join("evidence"))?;
        let command = self.command_line(files, None);
        info!("Running {} spec file(s)", files.len());
        let exit_code = try_run(&command, &self.env_for(module_dir)).await;

        let results_path = expected_results_path(module_dir);
        let summary = read_summary(&results_path);
        if summary.is_none() {
            warn!(
                "Runner exited with {} and produced no JSON at {}",
                exit_code,
                results_path.display()
            );
            write_json(
                &results_path,
                &serde_json::json!({
                    "error": format!(
                        "Playwright run exited with code {} and did not produce JSON.",
                        exit_code
                    ),
                    "files": files,
                }),
            )?;
        }

        Ok(SpecRun {
            command,
            exit_code,
            results_path,
            summary,
        })
    }
}
