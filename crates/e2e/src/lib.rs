//! FleetQA audit engine
//!
//! This crate drives a module-oriented QA audit of the FleetMada web app:
//! - Prepares the environment and boots (or reuses) the dev server
//! - Runs each module's Playwright suites and summarizes their JSON output
//! - Crawls the module's routes per role through a browser driver
//! - Turns everything into deduplicated, severity-ranked findings
//! - Writes per-module reports and a run index
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Auditor (run orchestrator)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  prepare_environment() -> RunSetup                          │
//! │  ensure_server()       -> Option<DevServer>                 │
//! │  for each module: ModuleAudit                               │
//! │    ├── Setup      setup-skip findings                       │
//! │    ├── Testing    PlaywrightRunner -> PlaywrightSummary     │
//! │    ├── Exploring  run_exploration(driver) -> findings       │
//! │    └── Reported   derive_status -> report.{json,md}         │
//! │  write_run_index() -> index.{json,md}                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod browser;
pub mod classify;
pub mod error;
pub mod explore;
pub mod index;
pub mod options;
pub mod playwright;
pub mod report;
pub mod results;
pub mod runner;
pub mod server;

pub use audit::{Auditor, ModulePhase, RunOutcome};
pub use browser::{BrowserDriver, BrowserSession, PageEvents};
pub use error::{AuditError, AuditResult};
pub use options::{AuditOptions, ModuleScope};
pub use playwright::{PlaywrightConfig, PlaywrightDriver};
