//! Browser automation capability used by the exploration engine

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::AuditResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::Load => "load",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// An API response with status >= 400
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub url: String,
    pub status: u16,
}

/// Events captured by a session since the last drain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageEvents {
    /// Console messages at `error` level
    pub console_errors: Vec<String>,
    /// Uncaught page exceptions
    pub page_errors: Vec<String>,
    /// `METHOD url (reason)` for failed requests
    pub request_failures: Vec<String>,
    pub api_errors: Vec<ApiError>,
}

impl PageEvents {
    pub fn is_empty(&self) -> bool {
        self.console_errors.is_empty()
            && self.page_errors.is_empty()
            && self.request_failures.is_empty()
            && self.api_errors.is_empty()
    }
}

/// One isolated browsing context with a single page. Cookies and storage
/// are never shared between sessions.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and return the main document's HTTP status, if any.
    async fn goto(&mut self, url: &str) -> AuditResult<Option<u16>>;

    async fn wait_for_load_state(&mut self, state: LoadState, timeout: Duration) -> AuditResult<()>;

    async fn wait_for_timeout(&mut self, duration: Duration) -> AuditResult<()>;

    async fn current_url(&mut self) -> AuditResult<String>;

    async fn title(&mut self) -> AuditResult<String>;

    /// Evaluate a JavaScript expression in the page and return its JSON value.
    async fn evaluate(&mut self, expression: &str) -> AuditResult<serde_json::Value>;

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> AuditResult<()>;

    async fn fill(&mut self, selector: &str, value: &str) -> AuditResult<()>;

    async fn click(&mut self, selector: &str) -> AuditResult<()>;

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> AuditResult<()>;

    /// Return everything recorded since the previous drain and clear it.
    async fn drain_events(&mut self) -> AuditResult<PageEvents>;

    async fn close(&mut self) -> AuditResult<()>;
}

/// A headless browser able to open isolated sessions
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self) -> AuditResult<()>;

    /// Open an isolated session. `api_marker` selects which response URLs
    /// count as API calls for error capture.
    async fn new_session(&self, api_marker: &str) -> AuditResult<Box<dyn BrowserSession>>;

    async fn close(&self) -> AuditResult<()>;
}
