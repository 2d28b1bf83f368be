//! FleetQA CLI - Main Entry Point
//!
//! Audits FleetMada modules: environment setup, the module's E2E suite and
//! a role-based crawl, with one report per module and an index per run.

use clap::{CommandFactory, Parser};
use std::sync::Arc;
use tracing::debug;

use fleetqa_cli::args::{docs_reports_routes_disabled, Cli};
use fleetqa_cli::output::{self, print_error, print_success};
use fleetqa_common::MODULES;
use fleetqa_e2e::{AuditError, Auditor, PlaywrightConfig, PlaywrightDriver};

/// Exit code for invalid invocations
const EXIT_USAGE: i32 = 2;

fn usage_error(err: &AuditError) -> ! {
    print_error(&err.to_string());
    eprintln!("{}", Cli::command().render_usage());
    std::process::exit(EXIT_USAGE);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Same precedence as the app: real environment, then .env, then .env.local.
    dotenvy::dotenv().ok();
    dotenvy::from_filename(".env.local").ok();

    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    if cli.list_modules {
        output::print_list(MODULES, cli.format);
        return Ok(());
    }

    let (options, modules) = match cli.resolve(docs_reports_routes_disabled()) {
        Ok(resolved) => resolved,
        Err(e) if e.is_usage() => usage_error(&e),
        Err(e) => return Err(e.into()),
    };
    debug!("Auditing {:?} as {:?}", modules.iter().map(|m| m.id).collect::<Vec<_>>(), options.roles);

    let strict = options.strict;
    let driver = Arc::new(PlaywrightDriver::new(PlaywrightConfig {
        headless: !cli.headed,
        ..Default::default()
    }));
    let auditor = Auditor::new(options, driver);

    match auditor.run(&modules).await {
        Ok(outcome) => {
            output::print_run_summary(&outcome.index);
            print_success(&format!(
                "QA audit {} written to {}",
                outcome.run_id,
                outcome.run_dir.display()
            ));
            let code = outcome.exit_code(strict);
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(e) if e.is_usage() => usage_error(&e),
        Err(e) => {
            print_error(&format!("QA audit failed: {}", e));
            std::process::exit(1);
        }
    }

    Ok(())
}
