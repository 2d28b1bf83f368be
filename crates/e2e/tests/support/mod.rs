//! Shared fixtures: a scripted browser driver and a tiny HTTP server that
//! looks like a compiled Next.js app to the readiness probe.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use fleetqa_e2e::browser::{ApiError, BrowserDriver, BrowserSession, LoadState, PageEvents};
use fleetqa_e2e::{AuditError, AuditResult};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("fleetqa_e2e=debug")
        .with_test_writer()
        .try_init();
}

/// What the fake application does when a path is loaded
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub console_errors: HashMap<String, Vec<String>>,
    pub api_errors: HashMap<String, Vec<ApiError>>,
    /// Requested path -> path the app ends up on
    pub redirects: HashMap<String, String>,
    pub fail_launch: bool,
    pub fail_login: bool,
}

impl Script {
    pub fn console_error(mut self, path: &str, message: &str) -> Self {
        self.console_errors
            .entry(path.to_string())
            .or_default()
            .push(message.to_string());
        self
    }

    pub fn api_error(mut self, path: &str, url: &str, status: u16) -> Self {
        self.api_errors.entry(path.to_string()).or_default().push(ApiError {
            url: url.to_string(),
            status,
        });
        self
    }

    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }
}

#[derive(Debug, Default)]
pub struct DriverLog {
    pub launches: usize,
    pub sessions: usize,
    pub closed_sessions: usize,
    pub visits: Vec<String>,
}

pub struct ScriptedDriver {
    base_url: String,
    script: Script,
    pub log: Arc<Mutex<DriverLog>>,
}

impl ScriptedDriver {
    pub fn new(base_url: &str, script: Script) -> Self {
        Self {
            base_url: base_url.to_string(),
            script,
            log: Arc::new(Mutex::new(DriverLog::default())),
        }
    }

    pub fn launches(&self) -> usize {
        self.log.lock().unwrap().launches
    }

    pub fn visits(&self) -> Vec<String> {
        self.log.lock().unwrap().visits.clone()
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn launch(&self) -> AuditResult<()> {
        if self.script.fail_launch {
            return Err(AuditError::Browser("Executable doesn't exist at /ms-playwright/chromium".to_string()));
        }
        self.log.lock().unwrap().launches += 1;
        Ok(())
    }

    async fn new_session(&self, _api_marker: &str) -> AuditResult<Box<dyn BrowserSession>> {
        self.log.lock().unwrap().sessions += 1;
        Ok(Box::new(ScriptedSession {
            base_url: self.base_url.clone(),
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            current: "about:blank".to_string(),
            pending: PageEvents::default(),
        }))
    }

    async fn close(&self) -> AuditResult<()> {
        Ok(())
    }
}

struct ScriptedSession {
    base_url: String,
    script: Script,
    log: Arc<Mutex<DriverLog>>,
    current: String,
    pending: PageEvents,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn goto(&mut self, url: &str) -> AuditResult<Option<u16>> {
        self.log.lock().unwrap().visits.push(url.to_string());
        let path = url.strip_prefix(&self.base_url).unwrap_or(url).to_string();
        let landed = self.script.redirects.get(&path).cloned().unwrap_or_else(|| path.clone());
        self.current = format!("{}{}", self.base_url, landed);

        if let Some(messages) = self.script.console_errors.get(&path) {
            self.pending.console_errors.extend(messages.iter().cloned());
        }
        if let Some(errors) = self.script.api_errors.get(&path) {
            self.pending.api_errors.extend(errors.iter().cloned());
        }
        Ok(Some(200))
    }

    async fn wait_for_load_state(&mut self, state: LoadState, _timeout: Duration) -> AuditResult<()> {
        match state {
            // Mirrors an app that keeps polling in the background.
            LoadState::NetworkIdle => Err(AuditError::Browser("Timeout 10000ms exceeded".to_string())),
            _ => Ok(()),
        }
    }

    async fn wait_for_timeout(&mut self, _duration: Duration) -> AuditResult<()> {
        Ok(())
    }

    async fn current_url(&mut self) -> AuditResult<String> {
        Ok(self.current.clone())
    }

    async fn title(&mut self) -> AuditResult<String> {
        Ok("FleetMada".to_string())
    }

    async fn evaluate(&mut self, _expression: &str) -> AuditResult<serde_json::Value> {
        Ok(json!({ "unlabeledFormControls": 1, "emptyButtons": 0, "missingH1": false }))
    }

    async fn screenshot(&mut self, path: &Path, _full_page: bool) -> AuditResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"\x89PNG")?;
        Ok(())
    }

    async fn fill(&mut self, _selector: &str, _value: &str) -> AuditResult<()> {
        Ok(())
    }

    async fn click(&mut self, _selector: &str) -> AuditResult<()> {
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> AuditResult<()> {
        if self.script.fail_login && selector.contains("email-input") {
            return Err(AuditError::Browser(format!(
                "Timeout {}ms exceeded waiting for {}",
                timeout.as_millis(),
                selector
            )));
        }
        Ok(())
    }

    async fn drain_events(&mut self) -> AuditResult<PageEvents> {
        Ok(std::mem::take(&mut self.pending))
    }

    async fn close(&mut self) -> AuditResult<()> {
        self.log.lock().unwrap().closed_sessions += 1;
        Ok(())
    }
}

/// Answer every request with `status` and `body`.
pub async fn http_fixture(status: u16, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}", addr)
}

pub const NEXT_PAGE: &str = r#"<html><head><script src="/_next/static/chunks/main.js"></script></head></html>"#;

/// Serve a page that references compiled Next.js assets on every request.
pub async fn ready_app() -> String {
    http_fixture(200, NEXT_PAGE).await
}

/// A base URL nothing listens on.
pub fn dead_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

/// Runner command that reports one passing test. Setup invocations (whose
/// audit dir ends in `.setup`) fail when `fail_setup` is set. The trailing
/// `#` comments out the file list the adapter appends.
pub fn runner_command(fail_setup: bool) -> String {
    let setup_guard = if fail_setup {
        r#"case "$QA_AUDIT_DIR" in */.setup) exit 1;; esac; "#
    } else {
        ""
    };
    format!(
        r#"{}mkdir -p "$QA_AUDIT_DIR/evidence" && echo '{{"stats":{{"expected":1,"unexpected":0,"flaky":0,"skipped":0}},"suites":[]}}' > "$QA_AUDIT_DIR/evidence/playwright-results.json" #"#,
        setup_guard
    )
}
