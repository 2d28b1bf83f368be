//! Run and module orchestration
//!
//! A run prepares the environment once, makes sure the application is
//! serving, then audits each module in turn. A module audit moves through
//! `Setup → Testing → Exploring → Reported` and always ends with a report
//! on disk, whatever failed along the way.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use fleetqa_common::util::{ensure_dir, iso_date_local, now_rfc3339, time_slug, try_run, unique_run_dir, GitMeta};
use fleetqa_common::{Area, Finding, FindingType, Module, Severity};

use crate::browser::BrowserDriver;
use crate::error::AuditResult;
use crate::explore::{run_exploration, ExplorationParams, ExplorationReport};
use crate::index::{write_run_index, ModuleIndexEntry, RunIndex, RunMetadata, RunSetup};
use crate::options::AuditOptions;
use crate::report::{
    build_test_backlog, derive_status, write_module_report, ModuleInfo, ModuleReport, ReportMetadata, SetupSection,
    StatusInputs,
};
use crate::results::PlaywrightSummary;
use crate::runner::{split_test_files, PlaywrightRunner, RunnerConfig};
use crate::server::{ensure_server, ServerConfig};

/// Progress of a single module audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModulePhase {
    Setup,
    Testing,
    Exploring,
    Reported,
}

/// Result of a whole run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub index: RunIndex,
}

impl RunOutcome {
    /// Process exit code: 1 only when strict mode saw a red module.
    pub fn exit_code(&self, strict: bool) -> i32 {
        if strict && self.index.any_red() {
            1
        } else {
            0
        }
    }
}

/// Drives a full audit run
pub struct Auditor {
    options: AuditOptions,
    driver: Arc<dyn BrowserDriver>,
    runner: PlaywrightRunner,
}

impl Auditor {
    pub fn new(options: AuditOptions, driver: Arc<dyn BrowserDriver>) -> Self {
        let runner = PlaywrightRunner::new(RunnerConfig {
            command: options.runner_command.clone(),
            base_url: options.base_url.clone(),
        });
        Self {
            options,
            driver,
            runner,
        }
    }

    pub fn options(&self) -> &AuditOptions {
        &self.options
    }

    /// Audit `modules` in order. Fails only when the options are invalid or
    /// the application never became ready; everything else ends up in the
    /// reports.
    pub async fn run(&self, modules: &[&'static Module]) -> AuditResult<RunOutcome> {
        self.options.validate()?;

        // <root>/<date>/<runId>/index.* and <root>/<date>/<module>/<runId>/report.*
        let date = iso_date_local();
        let date_dir = self.options.audit_root.join(&date);
        ensure_dir(&date_dir)?;
        let (run_id, run_dir) = unique_run_dir(&date_dir, &format!("{}-{}", date, time_slug()));
        ensure_dir(&run_dir)?;
        info!("Audit run {} ({} module(s))", run_id, modules.len());

        let setup = self.prepare_environment().await;

        let needs_server = !setup.failed() && (!self.options.skip_explore || !self.options.skip_playwright);
        let mut server = if needs_server {
            ensure_server(&ServerConfig::for_base_url(&self.options.base_url)).await?
        } else {
            None
        };

        let git = GitMeta::collect();
        let mut entries = Vec::new();
        for module in modules {
            let module_dir = date_dir.join(module.id).join(&run_id);
            let audit = ModuleAudit::new(self, module, &module_dir, &setup, &git);
            let (entry, bailed) = audit.run().await?;
            let red = entry.status.is_red();
            entries.push(entry);
            if bailed || (self.options.bail && red) {
                warn!("Module {} is red, stopping (--bail)", module.id);
                break;
            }
        }

        let index = RunIndex {
            metadata: RunMetadata {
                run_id: run_id.clone(),
                generated_at: now_rfc3339(),
                base_url: self.options.base_url.clone(),
                run_dir: run_dir.display().to_string(),
                git: Some(git),
            },
            options: self.options.echo(modules),
            setup,
            modules: entries,
        };
        write_run_index(&run_dir, &index)?;

        if let Some(server) = server.as_mut() {
            server.stop().await;
        }

        Ok(RunOutcome { run_id, run_dir, index })
    }

    /// Run the setup commands in order, stopping at the first failure.
    async fn prepare_environment(&self) -> RunSetup {
        let mut setup = RunSetup {
            skipped: self.options.skip_setup,
            ..Default::default()
        };
        if self.options.skip_setup {
            return setup;
        }
        for cmd in &self.options.setup_commands {
            setup.commands_run.push(cmd.clone());
            let code = try_run(cmd, &[]).await;
            if code != 0 {
                error!("Environment setup failed: {} (exit {})", cmd, code);
                setup.setup_failed.push(format!("{} (exit {})", cmd, code));
                break;
            }
        }
        setup
    }
}

/// State of one module while it is being audited
struct ModuleAudit<'a> {
    auditor: &'a Auditor,
    module: &'static Module,
    module_dir: &'a Path,
    env_setup: &'a RunSetup,
    git: &'a GitMeta,
    phase: ModulePhase,
    commands_run: Vec<String>,
    findings: Vec<Finding>,
    playwright: Option<PlaywrightSummary>,
    exploration: Option<ExplorationReport>,
    test_setup_failed: bool,
}

impl<'a> ModuleAudit<'a> {
    fn new(
        auditor: &'a Auditor,
        module: &'static Module,
        module_dir: &'a Path,
        env_setup: &'a RunSetup,
        git: &'a GitMeta,
    ) -> Self {
        Self {
            auditor,
            module,
            module_dir,
            env_setup,
            git,
            phase: ModulePhase::Setup,
            commands_run: env_setup.commands_run.clone(),
            findings: Vec::new(),
            playwright: None,
            exploration: None,
            test_setup_failed: false,
        }
    }

    fn options(&self) -> &AuditOptions {
        &self.auditor.options
    }

    fn upper_id(&self) -> String {
        self.module.id.to_uppercase()
    }

    fn enter(&mut self, phase: ModulePhase) {
        debug_assert!(phase > self.phase);
        self.phase = phase;
        info!("[{}] {:?}", self.module.id, phase);
    }

    fn env_failure(&self) -> String {
        self.env_setup.setup_failed.join("; ")
    }

    /// Returns the index entry and whether the run must stop here.
    async fn run(mut self) -> AuditResult<(ModuleIndexEntry, bool)> {
        ensure_dir(&self.module_dir.join("evidence"))?;
        info!("[{}] {:?}", self.module.id, self.phase);

        let env_failed = self.env_setup.failed();
        if env_failed {
            self.record_setup_skips();
        }

        self.enter(ModulePhase::Testing);
        if !self.options().skip_playwright && !env_failed {
            let bail_now = self.run_tests().await?;
            if bail_now {
                return Ok((self.finish()?, true));
            }
        }

        self.enter(ModulePhase::Exploring);
        if !self.options().skip_explore && !env_failed {
            self.explore().await;
        }

        if self.options().docs_reports_routes_disabled
            && (self.module.covers(Area::Documents) || self.module.covers(Area::Reports))
        {
            self.findings.push(
                Finding::new(
                    "NOTE-MW-DOCS-REPORTS",
                    FindingType::Test,
                    Severity::P3,
                    "Documents/Reports routes disabled by config",
                )
                .with_observed(
                    "FLEETMADA_DISABLE_DOCS_REPORTS_ROUTES=1 is set; middleware redirects /documents and /reports to /. This is expected in this configuration.",
                )
                .with_tags(&["middleware", "routing", "config"]),
            );
        }

        if env_failed {
            self.findings.push(
                Finding::new(
                    "SETUP-FAILED",
                    FindingType::Test,
                    Severity::P0,
                    "Setup failed; audit results may be incomplete",
                )
                .with_observed(self.env_failure())
                .with_tags(&["setup"]),
            );
        }

        Ok((self.finish()?, false))
    }

    fn record_setup_skips(&mut self) {
        let observed = self.env_failure();
        if !self.options().skip_playwright {
            self.findings.push(
                Finding::new(
                    format!("SETUP-SKIPPED-PW-{}", self.upper_id()),
                    FindingType::Test,
                    Severity::P0,
                    "Setup failed; Playwright skipped",
                )
                .with_observed(observed.clone())
                .with_tags(&["setup", "playwright"]),
            );
        }
        if !self.options().skip_explore {
            self.findings.push(
                Finding::new(
                    format!("SETUP-SKIPPED-EXPLORE-{}", self.upper_id()),
                    FindingType::Test,
                    Severity::P0,
                    "Setup failed; exploration skipped",
                )
                .with_observed(observed)
                .with_tags(&["setup", "exploration"]),
            );
        }
    }

    /// Setup suites, then spec suites. Returns true when a setup failure
    /// should end the run.
    async fn run_tests(&mut self) -> AuditResult<bool> {
        let files = split_test_files(self.module.test_files);
        let runner = &self.auditor.runner;

        if !files.setup.is_empty() {
            let run = runner.run_setup(&files.setup, &self.module_dir.join(".setup")).await?;
            self.commands_run.push(run.command.clone());
            if !run.succeeded() {
                self.test_setup_failed = true;
                self.findings.push(
                    Finding::new(
                        format!("PW-SETUP-{}", self.upper_id()),
                        FindingType::Test,
                        Severity::P0,
                        "Playwright setup failed",
                    )
                    .with_observed(format!(
                        "Setup files failed with exit {}: {}",
                        run.exit_code,
                        files.setup.join(", ")
                    ))
                    .with_tags(&["playwright", "setup"]),
                );
                if self.options().bail {
                    return Ok(true);
                }
            }
        }

        if !files.specs.is_empty() {
            let run = runner.run_specs(&files.specs, self.module_dir).await?;
            self.commands_run.push(run.command.clone());
            if run.summary.is_none() {
                self.findings.push(
                    Finding::new(
                        format!("PW-NOJSON-{}", self.upper_id()),
                        FindingType::Test,
                        Severity::P0,
                        "Playwright did not produce JSON results",
                    )
                    .with_observed(format!(
                        "Playwright exit {}. Expected JSON at {}.",
                        run.exit_code,
                        run.results_path.display()
                    ))
                    .with_tags(&["playwright", "reporting"]),
                );
            }
            self.playwright = run.summary;
        }

        Ok(false)
    }

    async fn explore(&mut self) {
        let params = ExplorationParams {
            audit_dir: self.module_dir.to_path_buf(),
            base_url: self.options().base_url.clone(),
            roles: self.options().roles_for(self.module),
            areas: Some(self.module.areas.to_vec()),
        };
        match run_exploration(self.auditor.driver.as_ref(), &params).await {
            Ok(outcome) => {
                self.findings.extend(outcome.findings);
                self.exploration = Some(outcome.exploration);
            }
            Err(e) => {
                error!("[{}] Exploration failed: {}", self.module.id, e);
                self.findings.push(
                    Finding::new(
                        format!("EXPLORE-FAILED-{}", self.upper_id()),
                        FindingType::Test,
                        Severity::P0,
                        "Exploration failed (automation error)",
                    )
                    .with_observed(e.to_string())
                    .with_tags(&["exploration"]),
                );
            }
        }
    }

    /// Derive the verdict, write the report and build the index entry.
    fn finish(mut self) -> AuditResult<ModuleIndexEntry> {
        self.phase = ModulePhase::Reported;

        let (status, status_reasons) = derive_status(StatusInputs {
            env_setup_failed: self.env_setup.failed(),
            test_setup_failed: self.test_setup_failed,
            playwright: self.playwright.as_ref(),
            findings: &self.findings,
        });

        let report = ModuleReport {
            metadata: ReportMetadata {
                generated_at: now_rfc3339(),
                base_url: self.options().base_url.clone(),
                audit_dir: self.module_dir.display().to_string(),
                git: Some(self.git.clone()),
                module: ModuleInfo::from(self.module),
                status,
                status_reasons,
            },
            setup: SetupSection {
                skipped: self.env_setup.skipped,
                commands_run: std::mem::take(&mut self.commands_run),
            },
            test_backlog: build_test_backlog(&self.findings),
            playwright: self.playwright.take(),
            exploration: self.exploration.take(),
            findings: std::mem::take(&mut self.findings),
        };

        let md_path = write_module_report(self.module_dir, &report)?;
        info!(
            "[{}] {} ({} finding(s)) -> {}",
            self.module.id,
            report.metadata.status,
            report.findings.len(),
            md_path.display()
        );
        Ok(ModuleIndexEntry::from_report(&report, self.module_dir, &md_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert!(ModulePhase::Setup < ModulePhase::Testing);
        assert!(ModulePhase::Testing < ModulePhase::Exploring);
        assert!(ModulePhase::Exploring < ModulePhase::Reported);
    }
}
