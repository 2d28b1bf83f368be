//! Playwright browser automation
//!
//! Playwright is driven through a small Node.js bridge script that is
//! staged in a temp dir and spawned once per exploration. Requests and
//! responses are newline-delimited JSON over the child's stdin/stdout; the
//! bridge keeps a per-context event buffer that `drainEvents` hands back
//! and clears.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::{BrowserDriver, BrowserSession, LoadState, PageEvents};
use crate::error::{AuditError, AuditResult};

#[derive(Debug, Clone, Copy, Default)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Default timeout applied to every page action, in milliseconds
    pub default_timeout_ms: u64,
    pub node_binary: String,
    /// Directory whose `node_modules` provides the `playwright` package
    pub project_root: PathBuf,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            default_timeout_ms: 30_000,
            node_binary: "node".to_string(),
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

const browserName = process.argv[2] || 'chromium';
const headless = process.argv[3] !== 'headed';
let browser;
let nextContext = 1;
const contexts = new Map();

const freshEvents = () => ({ consoleErrors: [], pageErrors: [], requestFailures: [], apiErrors: [] });

function reply(id, ok, payload) {
  const msg = ok ? { id, ok: true, result: payload === undefined ? null : payload } : { id, ok: false, error: payload };
  process.stdout.write(JSON.stringify(msg) + '\n');
}

function entryFor(p) {
  const entry = contexts.get(p.context);
  if (!entry) throw new Error(`unknown context ${p.context}`);
  return entry;
}

async function ensureBrowser() {
  if (!browser) browser = await playwright[browserName].launch({ headless });
  return browser;
}

async function handle(op, p) {
  switch (op) {
    case 'launch':
      await ensureBrowser();
      return null;
    case 'newContext': {
      const context = await (await ensureBrowser()).newContext({ viewport: { width: p.width, height: p.height } });
      const page = await context.newPage();
      page.setDefaultTimeout(p.defaultTimeoutMs);
      const entry = { context, page, events: freshEvents() };
      page.on('console', msg => { if (msg.type() === 'error') entry.events.consoleErrors.push(msg.text()); });
      page.on('pageerror', err => entry.events.pageErrors.push(String(err)));
      page.on('requestfailed', req => {
        const failure = req.failure();
        entry.events.requestFailures.push(`${req.method()} ${req.url()} (${(failure && failure.errorText) || 'failed'})`);
      });
      page.on('response', resp => {
        if (resp.url().includes(p.apiMarker) && resp.status() >= 400) {
          entry.events.apiErrors.push({ url: resp.url(), status: resp.status() });
        }
      });
      const id = nextContext++;
      contexts.set(id, entry);
      return { context: id };
    }
    case 'goto': {
      const resp = await entryFor(p).page.goto(p.url, { waitUntil: 'domcontentloaded' });
      return { status: resp ? resp.status() : null };
    }
    case 'waitForLoadState':
      await entryFor(p).page.waitForLoadState(p.state, { timeout: p.timeoutMs });
      return null;
    case 'waitForTimeout':
      await entryFor(p).page.waitForTimeout(p.ms);
      return null;
    case 'url':
      return entryFor(p).page.url();
    case 'title':
      return await entryFor(p).page.title();
    case 'evaluate':
      return await entryFor(p).page.evaluate(p.expression);
    case 'screenshot':
      await entryFor(p).page.screenshot({ path: p.path, fullPage: p.fullPage });
      return null;
    case 'fill':
      await entryFor(p).page.fill(p.selector, p.value);
      return null;
    case 'click':
      await entryFor(p).page.click(p.selector);
      return null;
    case 'waitForSelector':
      await entryFor(p).page.waitForSelector(p.selector, { timeout: p.timeoutMs });
      return null;
    case 'drainEvents': {
      const entry = entryFor(p);
      const events = entry.events;
      entry.events = freshEvents();
      return events;
    }
    case 'closeContext': {
      const entry = contexts.get(p.context);
      contexts.delete(p.context);
      if (entry) await entry.context.close();
      return null;
    }
    case 'close':
      if (browser) await browser.close();
      browser = undefined;
      return null;
    default:
      throw new Error(`unknown op ${op}`);
  }
}

const rl = readline.createInterface({ input: process.stdin });
let queue = Promise.resolve();
rl.on('line', line => {
  queue = queue.then(async () => {
    let msg;
    try { msg = JSON.parse(line); } catch (e) { return; }
    try { reply(msg.id, true, await handle(msg.op, msg.params || {})); }
    catch (e) { reply(msg.id, false, e && e.message ? e.message : String(e)); }
  });
});
rl.on('close', () => {
  queue.then(async () => {
    if (browser) await browser.close().catch(() => {});
    process.exit(0);
  });
});
"#;

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// A running bridge process
struct Bridge {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    _script_dir: tempfile::TempDir,
}

impl Bridge {
    async fn spawn(config: &PlaywrightConfig) -> AuditResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("fleetqa-bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        debug!("Spawning Playwright bridge: {}", script_path.display());

        let mut child = Command::new(&config.node_binary)
            .arg(&script_path)
            .arg(config.browser.as_str())
            .arg(if config.headless { "headless" } else { "headed" })
            .env("NODE_PATH", config.project_root.join("node_modules"))
            .current_dir(&config.project_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AuditError::Browser(format!("failed to spawn {}: {}", config.node_binary, e)))?;

        let stdin = child.stdin.take().ok_or(AuditError::BridgeClosed)?;
        let stdout = child.stdout.take().ok_or(AuditError::BridgeClosed)?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            _script_dir: script_dir,
        })
    }

    async fn call(&mut self, op: &str, params: Value) -> AuditResult<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let mut line = serde_json::to_string(&json!({ "id": id, "op": op, "params": params }))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(AuditError::BridgeClosed);
            };
            let resp = match serde_json::from_str::<BridgeResponse>(&line) {
                Ok(resp) => resp,
                Err(_) => {
                    debug!("[bridge] {}", line);
                    continue;
                }
            };
            if resp.id != id {
                continue;
            }
            return if resp.ok {
                Ok(resp.result.unwrap_or(Value::Null))
            } else {
                Err(AuditError::Browser(format!(
                    "{}: {}",
                    op,
                    resp.error.unwrap_or_else(|| "unknown error".to_string())
                )))
            };
        }
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.call("close", json!({})).await {
            debug!("Bridge close: {}", e);
        }
        drop(self.stdin);
        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("Playwright bridge did not exit, killing it");
                let _ = self.child.kill().await;
            }
        }
    }
}

type SharedBridge = Arc<Mutex<Option<Bridge>>>;

/// [`BrowserDriver`] backed by a Playwright bridge process
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
    bridge: SharedBridge,
}

impl PlaywrightDriver {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self {
            config,
            bridge: Arc::new(Mutex::new(None)),
        }
    }

    /// Check if Playwright is installed
    async fn check_playwright_installed(&self) -> AuditResult<()> {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .current_dir(&self.config.project_root)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(AuditError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn launch(&self) -> AuditResult<()> {
        let mut guard = self.bridge.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        self.check_playwright_installed().await?;

        let mut bridge = Bridge::spawn(&self.config).await?;
        bridge.call("launch", json!({})).await?;
        info!("Launched {} (headless: {})", self.config.browser.as_str(), self.config.headless);
        *guard = Some(bridge);
        Ok(())
    }

    async fn new_session(&self, api_marker: &str) -> AuditResult<Box<dyn BrowserSession>> {
        let mut guard = self.bridge.lock().await;
        let bridge = guard
            .as_mut()
            .ok_or_else(|| AuditError::Browser("browser not launched".to_string()))?;
        let result = bridge
            .call(
                "newContext",
                json!({
                    "width": self.config.viewport_width,
                    "height": self.config.viewport_height,
                    "defaultTimeoutMs": self.config.default_timeout_ms,
                    "apiMarker": api_marker,
                }),
            )
            .await?;
        let context = result
            .get("context")
            .and_then(Value::as_u64)
            .ok_or_else(|| AuditError::Browser("newContext returned no id".to_string()))?;

        Ok(Box::new(PlaywrightSession {
            bridge: Arc::clone(&self.bridge),
            context,
        }))
    }

    async fn close(&self) -> AuditResult<()> {
        let bridge = self.bridge.lock().await.take();
        if let Some(bridge) = bridge {
            bridge.shutdown().await;
        }
        Ok(())
    }
}

/// One browser context owned by the bridge
pub struct PlaywrightSession {
    bridge: SharedBridge,
    context: u64,
}

impl PlaywrightSession {
    async fn call(&self, op: &str, mut params: Value) -> AuditResult<Value> {
        params["context"] = json!(self.context);
        let mut guard = self.bridge.lock().await;
        let bridge = guard.as_mut().ok_or(AuditError::BridgeClosed)?;
        bridge.call(op, params).await
    }
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn goto(&mut self, url: &str) -> AuditResult<Option<u16>> {
        let result = self.call("goto", json!({ "url": url })).await?;
        Ok(result
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok()))
    }

    async fn wait_for_load_state(&mut self, state: LoadState, timeout: Duration) -> AuditResult<()> {
        self.call(
            "waitForLoadState",
            json!({ "state": state.as_str(), "timeoutMs": timeout.as_millis() as u64 }),
        )
        .await?;
        Ok(())
    }

    async fn wait_for_timeout(&mut self, duration: Duration) -> AuditResult<()> {
        self.call("waitForTimeout", json!({ "ms": duration.as_millis() as u64 }))
            .await?;
        Ok(())
    }

    async fn current_url(&mut self) -> AuditResult<String> {
        let result = self.call("url", json!({})).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    async fn title(&mut self) -> AuditResult<String> {
        let result = self.call("title", json!({})).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    async fn evaluate(&mut self, expression: &str) -> AuditResult<Value> {
        self.call("evaluate", json!({ "expression": expression })).await
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> AuditResult<()> {
        self.call(
            "screenshot",
            json!({ "path": path.to_string_lossy(), "fullPage": full_page }),
        )
        .await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> AuditResult<()> {
        self.call("fill", json!({ "selector": selector, "value": value }))
            .await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> AuditResult<()> {
        self.call("click", json!({ "selector": selector })).await?;
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> AuditResult<()> {
        self.call(
            "waitForSelector",
            json!({ "selector": selector, "timeoutMs": timeout.as_millis() as u64 }),
        )
        .await?;
        Ok(())
    }

    async fn drain_events(&mut self) -> AuditResult<PageEvents> {
        let result = self.call("drainEvents", json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn close(&mut self) -> AuditResult<()> {
        self.call("closeContext", json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PlaywrightConfig::default();
        assert!(config.headless);
        assert_eq!(config.viewport_width, 1280);
        assert_eq!(config.browser.as_str(), "chromium");
    }

    #[test]
    fn test_bridge_script_handles_every_session_op() {
        for op in [
            "'launch'",
            "'newContext'",
            "'goto'",
            "'waitForLoadState'",
            "'waitForTimeout'",
            "'url'",
            "'title'",
            "'evaluate'",
            "'screenshot'",
            "'fill'",
            "'click'",
            "'waitForSelector'",
            "'drainEvents'",
            "'closeContext'",
            "'close'",
        ] {
            assert!(BRIDGE_SCRIPT.contains(&format!("case {}", op)), "missing {}", op);
        }
    }

    #[test]
    fn test_bridge_response_parsing() {
        let ok: BridgeResponse = serde_json::from_str(r#"{"id":3,"ok":true,"result":{"status":200}}"#).unwrap();
        assert!(ok.ok);
        assert_eq!(ok.result.unwrap()["status"], 200);

        let err: BridgeResponse = serde_json::from_str(r#"{"id":4,"ok":false,"error":"boom"}"#).unwrap();
        assert_eq!(err.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_session_requires_launch() {
        let driver = PlaywrightDriver::new(PlaywrightConfig::default());
        let err = driver.new_session("/api/").await.err().unwrap();
        assert!(matches!(err, AuditError::Browser(_)));
    }
}
