//! Role-aware crawl over the route registry
//!
//! Every role gets its own browser session. Routes reachable before login
//! are visited first, then the session signs in with the role's seed
//! account and walks the rest. Each visit drains the session's event
//! buffer into a [`PageResult`]; once all roles are done the raw events
//! are grouped into deduplicated findings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use fleetqa_common::registry::{PRE_AUTH_ROUTES, WATCHED_REDIRECT_ROUTES};
use fleetqa_common::util::{ensure_dir, now_rfc3339, safe_file_slug, write_json};
use fleetqa_common::{routes_for_role, seed_credentials, Area, Credentials, Finding, FindingType, Role, Severity};

use crate::browser::{ApiError, BrowserDriver, BrowserSession, LoadState, PageEvents};
use crate::error::AuditResult;

/// Response URLs containing this are treated as API calls.
pub const API_MARKER: &str = "/api/";

const MAX_EVENTS_PER_CATEGORY: usize = 50;
const MAX_OCCURRENCES: usize = 20;
const MAX_ID_SLUG: usize = 60;

const SETTLE_DELAY: Duration = Duration::from_millis(250);
const DOM_TIMEOUT: Duration = Duration::from_secs(30);
const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(60);

const EMAIL_INPUT: &str = r#"[data-testid="email-input"]"#;
const PASSWORD_INPUT: &str = r#"[data-testid="password-input"]"#;
const LOGIN_BUTTON: &str = r#"[data-testid="login-button"]"#;
const LOGIN_BUTTON_ENABLED: &str = r#"[data-testid="login-button"]:not([disabled])"#;

/// Console errors that are known framework noise. Each entry lists
/// substrings that must all be present.
pub const BENIGN_CONSOLE_ERRORS: &[&[&str]] = &[&[
    "Failed to fetch RSC payload",
    "Falling back to browser navigation",
]];

const SCREENSHOT_DIR: &str = "evidence/exploration/screenshots";

const UX_SIGNALS_SCRIPT: &str = r#"(() => {
  const controls = Array.from(document.querySelectorAll('input, select, textarea'));
  const isLabeled = el => {
    if (el.getAttribute('aria-label') || el.getAttribute('aria-labelledby')) return true;
    const id = el.getAttribute('id');
    if (id && document.querySelector(`label[for="${CSS.escape(id)}"]`)) return true;
    return !!el.closest('label');
  };
  const buttons = Array.from(document.querySelectorAll('button, [role="button"]'));
  const emptyButtons = buttons.filter(el => {
    const text = (el.textContent || '').trim();
    return !text && !el.getAttribute('aria-label') && !el.getAttribute('title');
  }).length;
  return {
    unlabeledFormControls: controls.filter(el => !isLabeled(el)).length,
    emptyButtons,
    missingH1: !document.querySelector('h1'),
  };
})()"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UxSignals {
    pub unlabeled_form_controls: u32,
    pub empty_buttons: u32,
    #[serde(rename = "missingH1")]
    pub missing_h1: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    pub goto: u64,
}

/// Everything captured for one (role, route) visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub role: Role,
    pub route: String,
    pub final_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub timings_ms: Timings,
    pub console_errors: Vec<String>,
    pub page_errors: Vec<String>,
    pub request_failures: Vec<String>,
    pub api_errors: Vec<ApiError>,
    pub ux_signals: UxSignals,
    /// Relative to the module directory
    pub screenshot: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationNode {
    pub visited: Vec<String>,
}

pub type NavigationTree = BTreeMap<Role, NavigationNode>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorationReport {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub started_at: String,
    pub finished_at: String,
    pub roles: Vec<Role>,
    pub pages: Vec<PageResult>,
    pub navigation_tree: NavigationTree,
}

#[derive(Debug, Clone)]
pub struct ExplorationParams {
    /// Module directory that receives screenshots and JSON artifacts
    pub audit_dir: PathBuf,
    pub base_url: String,
    pub roles: Vec<Role>,
    /// Restrict the crawl to these areas; `None` visits everything
    pub areas: Option<Vec<Area>>,
}

#[derive(Debug, Clone)]
pub struct ExplorationOutcome {
    pub exploration: ExplorationReport,
    pub findings: Vec<Finding>,
}

/// Crawl every requested role and synthesize findings.
///
/// Errors are returned only when the browser itself cannot be driven
/// (launch or session creation). Anything that goes wrong on a page is
/// recorded on that page.
pub async fn run_exploration(
    driver: &dyn BrowserDriver,
    params: &ExplorationParams,
) -> AuditResult<ExplorationOutcome> {
    let started_at = now_rfc3339();
    ensure_dir(&params.audit_dir.join(SCREENSHOT_DIR))?;

    driver.launch().await?;
    let crawled = crawl(driver, params).await;
    if let Err(e) = driver.close().await {
        warn!("Failed to close browser: {}", e);
    }
    let pages = crawled?;

    let navigation_tree = params
        .roles
        .iter()
        .map(|role| {
            let visited = pages
                .iter()
                .filter(|p| p.role == *role)
                .map(|p| p.final_url.clone())
                .collect();
            (*role, NavigationNode { visited })
        })
        .collect();

    let exploration = ExplorationReport {
        base_url: params.base_url.clone(),
        started_at,
        finished_at: now_rfc3339(),
        roles: params.roles.clone(),
        pages,
        navigation_tree,
    };

    write_json(&params.audit_dir.join("navigation-tree.json"), &exploration.navigation_tree)?;
    write_json(
        &params.audit_dir.join("evidence").join("exploration").join("exploration.json"),
        &exploration,
    )?;

    let mut log = OccurrenceLog::default();
    for page in &exploration.pages {
        log.record(page);
    }
    let findings = log.into_findings(&params.base_url);
    info!(
        "Explored {} page(s) across {} role(s), {} finding(s)",
        exploration.pages.len(),
        exploration.roles.len(),
        findings.len()
    );

    Ok(ExplorationOutcome { exploration, findings })
}

async fn crawl(driver: &dyn BrowserDriver, params: &ExplorationParams) -> AuditResult<Vec<PageResult>> {
    let mut pages = Vec::new();
    for role in &params.roles {
        let mut session = driver.new_session(API_MARKER).await?;
        crawl_role(session.as_mut(), params, *role, &mut pages).await;
        if let Err(e) = session.close().await {
            debug!("Failed to close {} session: {}", role, e);
        }
    }
    Ok(pages)
}

async fn crawl_role(
    session: &mut dyn BrowserSession,
    params: &ExplorationParams,
    role: Role,
    pages: &mut Vec<PageResult>,
) {
    let (pre_auth, post_auth): (Vec<&str>, Vec<&str>) = routes_for_role(role)
        .into_iter()
        .filter(|r| params.areas.as_ref().map_or(true, |areas| areas.contains(&r.area)))
        .map(|r| r.path)
        .partition(|path| PRE_AUTH_ROUTES.contains(path));

    info!(
        "Exploring as {}: {} public, {} authenticated route(s)",
        role,
        pre_auth.len(),
        post_auth.len()
    );

    for route in pre_auth {
        pages.push(visit(session, params, role, route, Vec::new()).await);
    }

    if post_auth.is_empty() {
        return;
    }

    let mut carried = Vec::new();
    if let Err(e) = login(session, &params.base_url, &seed_credentials(role)).await {
        warn!("Login as {} failed: {}", role, e);
        carried.push(format!("Login failed for {}: {}", role, e));
    }

    for route in post_auth {
        pages.push(visit(session, params, role, route, std::mem::take(&mut carried)).await);
    }
}

/// DOM ready, a short pause, then a best-effort wait for network idle.
async fn settle(session: &mut dyn BrowserSession) -> AuditResult<()> {
    session
        .wait_for_load_state(LoadState::DomContentLoaded, DOM_TIMEOUT)
        .await?;
    session.wait_for_timeout(SETTLE_DELAY).await?;
    if let Err(e) = session
        .wait_for_load_state(LoadState::NetworkIdle, NETWORK_IDLE_TIMEOUT)
        .await
    {
        debug!("Network did not go idle: {}", e);
    }
    Ok(())
}

async fn login(session: &mut dyn BrowserSession, base_url: &str, creds: &Credentials) -> AuditResult<()> {
    session.goto(&format!("{}/login", base_url)).await?;
    settle(session).await?;

    session.wait_for_selector(EMAIL_INPUT, LOGIN_TIMEOUT).await?;
    session.fill(EMAIL_INPUT, creds.email).await?;
    session.fill(PASSWORD_INPUT, creds.password).await?;

    // Auth bootstrapping keeps the button disabled for a moment in dev.
    session.wait_for_selector(LOGIN_BUTTON_ENABLED, LOGIN_TIMEOUT).await?;
    session.click(LOGIN_BUTTON).await?;
    settle(session).await
}

async fn visit(
    session: &mut dyn BrowserSession,
    params: &ExplorationParams,
    role: Role,
    route: &str,
    carried_page_errors: Vec<String>,
) -> PageResult {
    let mut buffer = VisitBuffer::with_page_errors(carried_page_errors);
    if let Err(e) = session.drain_events().await {
        debug!("Failed to reset event buffer: {}", e);
    }

    let url = format!("{}{}", params.base_url, route);
    let started = Instant::now();
    let http_status = match navigate(session, &url).await {
        Ok(status) => status,
        Err(e) => {
            buffer.push_page_error(format!("Navigation error for {}: {}", url, e));
            None
        }
    };
    let goto_ms = started.elapsed().as_millis() as u64;

    let final_url = match session.current_url().await {
        Ok(u) => u,
        Err(e) => {
            debug!("Failed to read URL for {}: {}", url, e);
            url.clone()
        }
    };
    let title = match session.title().await {
        Ok(t) => Some(t),
        Err(e) => {
            debug!("Failed to read title for {}: {}", url, e);
            None
        }
    };
    let ux_signals = collect_ux_signals(session).await;

    let screenshot = screenshot_rel_path(role, route);
    if let Err(e) = session
        .screenshot(&params.audit_dir.join(&screenshot), true)
        .await
    {
        debug!("Screenshot failed for {}: {}", url, e);
    }

    match session.drain_events().await {
        Ok(events) => buffer.absorb(events),
        Err(e) => debug!("Failed to drain events for {}: {}", url, e),
    }
    let events = buffer.finish();

    PageResult {
        role,
        route: route.to_string(),
        final_url,
        http_status,
        title,
        timings_ms: Timings { goto: goto_ms },
        console_errors: events.console_errors,
        page_errors: events.page_errors,
        request_failures: events.request_failures,
        api_errors: events.api_errors,
        ux_signals,
        screenshot,
    }
}

async fn navigate(session: &mut dyn BrowserSession, url: &str) -> AuditResult<Option<u16>> {
    let status = session.goto(url).await?;
    settle(session).await?;
    Ok(status)
}

async fn collect_ux_signals(session: &mut dyn BrowserSession) -> UxSignals {
    match session.evaluate(UX_SIGNALS_SCRIPT).await {
        Ok(value) => serde_json::from_value(value).unwrap_or_default(),
        Err(e) => {
            debug!("UX signal evaluation failed: {}", e);
            UxSignals::default()
        }
    }
}

/// `evidence/exploration/screenshots/<ROLE>_<slug>.png`, `/` becoming `root`.
pub fn screenshot_rel_path(role: Role, route: &str) -> String {
    let slug = match safe_file_slug(route) {
        s if s.is_empty() => "root".to_string(),
        s => s,
    };
    format!("{}/{}_{}.png", SCREENSHOT_DIR, role, slug)
}

/// Events belonging to a single visit
#[derive(Debug, Default)]
struct VisitBuffer {
    events: PageEvents,
}

impl VisitBuffer {
    fn with_page_errors(page_errors: Vec<String>) -> Self {
        Self {
            events: PageEvents {
                page_errors,
                ..Default::default()
            },
        }
    }

    fn push_page_error(&mut self, message: String) {
        self.events.page_errors.push(message);
    }

    fn absorb(&mut self, events: PageEvents) {
        self.events.console_errors.extend(events.console_errors);
        self.events.page_errors.extend(events.page_errors);
        self.events.request_failures.extend(events.request_failures);
        self.events.api_errors.extend(events.api_errors);
    }

    /// Keep only the most recent entries of each category.
    fn finish(self) -> PageEvents {
        let PageEvents {
            console_errors,
            page_errors,
            request_failures,
            api_errors,
        } = self.events;
        PageEvents {
            console_errors: keep_last(console_errors, MAX_EVENTS_PER_CATEGORY),
            page_errors: keep_last(page_errors, MAX_EVENTS_PER_CATEGORY),
            request_failures: keep_last(request_failures, MAX_EVENTS_PER_CATEGORY),
            api_errors: keep_last(api_errors, MAX_EVENTS_PER_CATEGORY),
        }
    }
}

fn keep_last<T>(mut items: Vec<T>, max: usize) -> Vec<T> {
    if items.len() > max {
        items.drain(..items.len() - max);
    }
    items
}

/// Trim and collapse internal whitespace so cosmetic differences do not
/// split one problem into several findings.
pub fn normalize_message(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_benign_console_error(message: &str) -> bool {
    BENIGN_CONSOLE_ERRORS
        .iter()
        .any(|parts| parts.iter().all(|p| message.contains(p)))
}

pub fn console_severity(message: &str) -> Severity {
    if message.contains("status of 500") || message.contains("(Internal Server Error)") {
        Severity::P1
    } else if is_benign_console_error(message) {
        Severity::P3
    } else {
        Severity::P2
    }
}

pub fn api_severity(status: u16) -> Severity {
    if status >= 500 {
        Severity::P1
    } else {
        Severity::P2
    }
}

fn finding_id(prefix: &str, key: &str) -> String {
    let slug: String = safe_file_slug(key).chars().take(MAX_ID_SLUG).collect();
    format!("{}-{}", prefix, slug)
}

#[derive(Debug, Clone)]
struct Occurrence {
    role: Role,
    route: String,
    url: String,
    screenshot: String,
}

#[derive(Debug, Default)]
struct Tally {
    count: usize,
    occurrences: Vec<Occurrence>,
}

impl Tally {
    fn record(&mut self, occurrence: &Occurrence) {
        self.count += 1;
        if self.occurrences.len() < MAX_OCCURRENCES {
            self.occurrences.push(occurrence.clone());
        }
    }

    fn hypothesis(&self) -> String {
        let details = self
            .occurrences
            .iter()
            .map(|o| format!("{} {} ({})", o.role, o.route, o.url))
            .collect::<Vec<_>>()
            .join("; ");
        format!("Observed {} time(s). Occurrences: {}", self.count, details)
    }

    /// Attach the first occurrence's role, URL and screenshot.
    fn annotate(&self, finding: Finding) -> Finding {
        let finding = finding.with_hypothesis(self.hypothesis());
        match self.occurrences.first() {
            Some(first) => finding
                .with_role(Some(first.role))
                .with_url(first.url.clone())
                .with_evidence(vec![first.screenshot.clone()]),
            None => finding,
        }
    }
}

/// Raw occurrences grouped by normalized key, per category
#[derive(Debug, Default)]
struct OccurrenceLog {
    page_errors: BTreeMap<String, Tally>,
    console_errors: BTreeMap<String, Tally>,
    api_errors: BTreeMap<(u16, String), Tally>,
    redirects: BTreeMap<(String, String), Tally>,
}

impl OccurrenceLog {
    fn record(&mut self, page: &PageResult) {
        let occurrence = Occurrence {
            role: page.role,
            route: page.route.clone(),
            url: page.final_url.clone(),
            screenshot: page.screenshot.clone(),
        };

        for message in &page.page_errors {
            self.page_errors
                .entry(normalize_message(message))
                .or_default()
                .record(&occurrence);
        }
        for message in &page.console_errors {
            self.console_errors
                .entry(normalize_message(message))
                .or_default()
                .record(&occurrence);
        }
        for api in &page.api_errors {
            self.api_errors
                .entry((api.status, api.url.clone()))
                .or_default()
                .record(&occurrence);
        }
        if WATCHED_REDIRECT_ROUTES.contains(&page.route.as_str()) && !page.final_url.ends_with(&page.route) {
            self.redirects
                .entry((page.route.clone(), page.final_url.clone()))
                .or_default()
                .record(&occurrence);
        }
    }

    fn into_findings(self, base_url: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        for (message, tally) in &self.page_errors {
            let finding = Finding::new(
                finding_id("PAGEERROR", message),
                FindingType::Functional,
                Severity::P1,
                "Page error (uncaught exception)",
            )
            .with_observed(message.clone())
            .with_tags(&["exploration", "pageerror"]);
            findings.push(tally.annotate(finding));
        }

        for (message, tally) in &self.console_errors {
            let title = if is_benign_console_error(message) {
                "Console error (Next.js RSC fallback)"
            } else {
                "Console error"
            };
            let finding = Finding::new(
                finding_id("CONSOLE", message),
                FindingType::Functional,
                console_severity(message),
                title,
            )
            .with_observed(message.clone())
            .with_tags(&["exploration", "console"]);
            findings.push(tally.annotate(finding));
        }

        for ((status, url), tally) in &self.api_errors {
            let key = format!("{} {}", status, url);
            let finding = Finding::new(
                finding_id("API", &key),
                FindingType::Functional,
                api_severity(*status),
                "API error response during page load",
            )
            .with_observed(key)
            .with_tags(&["exploration", "api"]);
            findings.push(tally.annotate(finding));
        }

        for ((route, final_url), tally) in &self.redirects {
            let key = format!("{} -> {}", route, final_url);
            let finding = Finding::new(
                finding_id("REDIRECT", &key),
                FindingType::Functional,
                Severity::P2,
                "Route redirected (middleware / guard)",
            )
            .with_expected(format!(
                "Access {} for authenticated users (or show an explicit 403/blocked page)",
                route
            ))
            .with_observed(key)
            .with_tags(&["middleware", "routing"]);
            // The requested route, not where the guard sent us.
            findings.push(tally.annotate(finding).with_url(format!("{}{}", base_url, route)));
        }

        findings
    }
}
