//! Server management - readiness probing and owning the dev server process

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{AuditError, AuditResult};

/// Configuration for probing and (optionally) spawning the application
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Program used to launch the dev server
    pub program: String,

    /// Arguments for `program`
    pub args: Vec<String>,

    /// Path fetched by the readiness probe
    pub probe_path: String,

    /// Substring the probe body must contain. A dev server answers HTTP
    /// before its first compile finishes; the compiled asset reference is
    /// what proves the page can hydrate.
    pub asset_marker: String,

    /// Fixed interval between probes
    pub poll_interval: Duration,

    /// Give up after this long
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            program: "npm".to_string(),
            args: vec!["run".to_string(), "dev".to_string()],
            probe_path: "/login".to_string(),
            asset_marker: "/_next/static/".to_string(),
            poll_interval: Duration::from_millis(750),
            startup_timeout: Duration::from_secs(120),
        }
    }
}

impl ServerConfig {
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Port the dev server should bind, taken from the base URL (3000 when the
/// URL has no explicit port).
pub fn port_from_base_url(base_url: &str) -> AuditResult<u16> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| AuditError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
    Ok(url.port().unwrap_or(3000))
}

/// HTTP readiness probe
pub struct ReadinessProbe {
    client: reqwest::Client,
    probe_url: String,
    asset_marker: String,
}

impl ReadinessProbe {
    pub fn new(config: &ServerConfig) -> AuditResult<Self> {
        let base = reqwest::Url::parse(&config.base_url)
            .map_err(|e| AuditError::InvalidBaseUrl(format!("{}: {}", config.base_url, e)))?;
        let probe_url = base
            .join(&config.probe_path)
            .map_err(|e| AuditError::InvalidBaseUrl(e.to_string()))?;
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            probe_url: probe_url.to_string(),
            asset_marker: config.asset_marker.clone(),
        })
    }

    /// True only for a status in [200, 400) whose body carries the asset
    /// marker. Transport errors count as "not up".
    pub async fn is_up(&self) -> bool {
        let resp = match self.client.get(&self.probe_url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!("Probe {} failed: {}", self.probe_url, e);
                return false;
            }
        };
        let status = resp.status().as_u16();
        if !(200..400).contains(&status) {
            debug!("Probe {} returned {}", self.probe_url, status);
            return false;
        }
        match resp.text().await {
            Ok(body) => body.contains(&self.asset_marker),
            Err(_) => false,
        }
    }

    /// Poll on a fixed interval until the server is up or `timeout` elapses.
    pub async fn wait(&self, base_url: &str, timeout: Duration, interval: Duration) -> AuditResult<()> {
        let start = Instant::now();
        let mut attempts = 0usize;
        while start.elapsed() < timeout {
            attempts += 1;
            if self.is_up().await {
                info!("Server ready at {} after {} probe(s)", base_url, attempts);
                return Ok(());
            }
            if attempts == 1 {
                info!("Waiting for server at {}...", base_url);
            }
            sleep(interval).await;
        }
        Err(AuditError::ServerNotReady {
            url: base_url.to_string(),
            waited_ms: start.elapsed().as_millis() as u64,
        })
    }
}

pub async fn is_server_up(base_url: &str) -> bool {
    match ReadinessProbe::new(&ServerConfig::for_base_url(base_url)) {
        Ok(probe) => probe.is_up().await,
        Err(e) => {
            warn!("{}", e);
            false
        }
    }
}

pub async fn wait_for_server(base_url: &str, timeout: Duration) -> AuditResult<()> {
    let config = ServerConfig::for_base_url(base_url);
    ReadinessProbe::new(&config)?
        .wait(base_url, timeout, config.poll_interval)
        .await
}

/// Handle to a dev server this process spawned. Stopped at most once:
/// explicitly through [`DevServer::stop`] or on drop.
#[derive(Debug)]
pub struct DevServer {
    child: Child,
    stopped: bool,
}

impl DevServer {
    /// Launch the dev server bound to the base URL's port. Does not wait.
    pub fn start(config: &ServerConfig) -> AuditResult<Self> {
        let port = port_from_base_url(&config.base_url)?;
        info!("Starting dev server: {} {} (PORT={})", config.program, config.args.join(" "), port);

        let child = Command::new(&config.program)
            .args(&config.args)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| AuditError::ServerStartup(format!("Failed to spawn {}: {}", config.program, e)))?;

        Ok(Self { child, stopped: false })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Stop the server: SIGTERM, a short grace period, then kill.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        info!("Stopping dev server (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                sleep(Duration::from_millis(500)).await;
            }
        }

        self.reap();
    }

    fn reap(&mut self) {
        self.stopped = true;
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        if !self.stopped {
            warn!("Dev server (pid: {}) dropped without stop, killing", self.child.id());
            self.reap();
        }
    }
}

/// Make sure the application is serving. Returns the spawned handle only
/// when this call started it; a server that was already up is never owned.
pub async fn ensure_server(config: &ServerConfig) -> AuditResult<Option<DevServer>> {
    let probe = ReadinessProbe::new(config)?;
    if probe.is_up().await {
        info!("Server already running at {}", config.base_url);
        return Ok(None);
    }

    // Dropped on a wait error, which kills the process.
    let server = DevServer::start(config)?;
    probe
        .wait(&config.base_url, config.startup_timeout, config.poll_interval)
        .await?;
    Ok(Some(server))
}
