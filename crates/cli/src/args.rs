//! Command-line arguments and their conversion into audit options

use clap::Parser;
use std::path::PathBuf;

use fleetqa_common::{Module, Role};
use fleetqa_e2e::options::{DEFAULT_AUDIT_ROOT, DEFAULT_BASE_URL};
use fleetqa_e2e::runner::DEFAULT_RUNNER_COMMAND;
use fleetqa_e2e::{AuditOptions, AuditResult, ModuleScope};

use crate::output::OutputFormat;

/// Environment variable the app reads to switch off `/documents` and `/reports`
pub const DISABLE_DOCS_REPORTS_ENV: &str = "FLEETMADA_DISABLE_DOCS_REPORTS_ROUTES";

const GREEN_CRITERIA: &str = "\
A module is GREEN when:
  - environment setup succeeded (or was skipped)
  - the E2E suite ran and reported no failures (or was skipped)
  - exploration produced no P0/P1 findings

With --strict the process exits 1 if any audited module is RED.
Reports land in <audit-root>/<date>/<module>/<run-id>/report.{md,json},
with a run index at <audit-root>/<date>/<run-id>/index.{md,json}.";

/// FleetQA - module-oriented QA audits for FleetMada
#[derive(Parser, Debug)]
#[command(name = "fleetqa")]
#[command(author, version, about, long_about = None)]
#[command(after_help = GREEN_CRITERIA)]
pub struct Cli {
    /// Audit a single module
    #[arg(long, value_name = "ID")]
    pub module: Option<String>,

    /// Audit a comma separated list of modules
    #[arg(long, value_name = "IDS")]
    pub modules: Option<String>,

    /// Audit every registered module
    #[arg(long)]
    pub all: bool,

    /// Print the module registry and exit
    #[arg(long)]
    pub list_modules: bool,

    /// Output format for --list-modules
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,

    /// Exit 1 when any audited module is RED
    #[arg(long)]
    pub strict: bool,

    /// Stop after the first RED module
    #[arg(long)]
    pub bail: bool,

    /// Skip docker, database and seed preparation
    #[arg(long)]
    pub skip_setup: bool,

    /// Skip the module's E2E suite
    #[arg(long)]
    pub skip_playwright: bool,

    /// Skip the role-based crawl
    #[arg(long)]
    pub skip_explore: bool,

    /// Application under audit
    #[arg(long, env = "QA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Roles to crawl as, comma separated
    #[arg(long, env = "QA_ROLES", default_value = "ADMIN,MANAGER,TECHNICIAN,DRIVER")]
    pub roles: String,

    /// Directory reports are written under
    #[arg(long, env = "QA_AUDIT_ROOT", default_value = DEFAULT_AUDIT_ROOT)]
    pub audit_root: PathBuf,

    /// Command that runs the E2E suite; test files are appended
    #[arg(long, env = "QA_RUNNER_COMMAND", default_value = DEFAULT_RUNNER_COMMAND)]
    pub runner_command: String,

    /// Show the browser while exploring
    #[arg(long)]
    pub headed: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve scope and options. Nothing touches the filesystem or spawns
    /// a process here, so usage errors surface before any side effect.
    pub fn resolve(&self, docs_reports_routes_disabled: bool) -> AuditResult<(AuditOptions, Vec<&'static Module>)> {
        let scope = ModuleScope::from_flags(self.all, self.modules.as_deref(), self.module.as_deref())?;
        let modules = scope.resolve()?;
        let roles = Role::parse_list(&self.roles)?;

        let options = AuditOptions {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            roles,
            audit_root: self.audit_root.clone(),
            strict: self.strict,
            bail: self.bail,
            skip_setup: self.skip_setup,
            skip_playwright: self.skip_playwright,
            skip_explore: self.skip_explore,
            runner_command: self.runner_command.clone(),
            docs_reports_routes_disabled,
            ..AuditOptions::default()
        };
        options.validate()?;
        Ok((options, modules))
    }
}

/// `FLEETMADA_DISABLE_DOCS_REPORTS_ROUTES=1` in the environment
pub fn docs_reports_routes_disabled() -> bool {
    std::env::var(DISABLE_DOCS_REPORTS_ENV).map(|v| v == "1").unwrap_or(false)
}
