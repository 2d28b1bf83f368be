//! Process and filesystem helpers shared by the audit phases

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Create a directory and all of its parents.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Local calendar date, `YYYY-MM-DD`.
pub fn iso_date_local() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Local wall-clock time, `HHMMSS`.
pub fn time_slug() -> String {
    chrono::Local::now().format("%H%M%S").to_string()
}

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Reduce arbitrary text to `[A-Za-z0-9_-]`, collapsing runs of anything
/// else into a single dash.
pub fn safe_file_slug(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}

/// Pick a run directory under `parent` named `<base_id>`, or
/// `<base_id>-2`, `<base_id>-3`, ... when earlier ones already exist.
pub fn unique_run_dir(parent: &Path, base_id: &str) -> (String, PathBuf) {
    let mut run_id = base_id.to_string();
    let mut run_dir = parent.join(&run_id);
    let mut suffix = 2;
    while run_dir.exists() {
        run_id = format!("{}-{}", base_id, suffix);
        run_dir = parent.join(&run_id);
        suffix += 1;
    }
    (run_id, run_dir)
}

/// Write a value as pretty JSON with a trailing newline, creating parent
/// directories as needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    write_text(path, &json)
}

pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    std::fs::write(path, contents)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Run a shell command to completion with inherited stdio and return its
/// exit code. There is no timeout: a hung command hangs the caller.
///
/// A command that cannot be spawned reports 127, one killed by a signal
/// reports -1.
pub async fn try_run(cmd: &str, env: &[(&str, String)]) -> i32 {
    info!("$ {}", cmd);
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    for (key, value) in env {
        command.env(key, value);
    }

    match command.status().await {
        Ok(status) => {
            let code = status.code().unwrap_or(-1);
            if code != 0 {
                warn!("Command exited with {}: {}", code, cmd);
            }
            code
        }
        Err(e) => {
            warn!("Failed to spawn `{}`: {}", cmd, e);
            127
        }
    }
}

/// Branch and commit of the working tree, when it is a git checkout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl GitMeta {
    pub fn collect() -> Self {
        Self {
            branch: git_output(&["rev-parse", "--abbrev-ref", "HEAD"]),
            commit: git_output(&["rev-parse", "HEAD"]),
        }
    }
}

fn git_output(args: &[&str]) -> Option<String> {
    let output = std::process::Command::new("git")
        .args(args)
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_safe_file_slug() {
        assert_eq!(safe_file_slug("/vehicles/list/create"), "vehicles-list-create");
        assert_eq!(safe_file_slug("500 http://x/api/a?b=1"), "500-http-x-api-a-b-1");
        assert_eq!(safe_file_slug("///"), "");
    }

    #[test]
    fn test_unique_run_dir_appends_suffix() {
        let tmp = TempDir::new().unwrap();
        let (id, dir) = unique_run_dir(tmp.path(), "2026-01-02-101500");
        assert_eq!(id, "2026-01-02-101500");
        std::fs::create_dir_all(&dir).unwrap();

        let (id, dir) = unique_run_dir(tmp.path(), "2026-01-02-101500");
        assert_eq!(id, "2026-01-02-101500-2");
        std::fs::create_dir_all(&dir).unwrap();

        let (id, _) = unique_run_dir(tmp.path(), "2026-01-02-101500");
        assert_eq!(id, "2026-01-02-101500-3");
    }

    #[test]
    fn test_write_json_trailing_newline() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/out.json");
        write_json(&path, &serde_json::json!({ "ok": true })).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\"ok\": true"));
    }

    #[test]
    fn test_date_slugs_shape() {
        assert_eq!(iso_date_local().len(), 10);
        assert_eq!(time_slug().len(), 6);
    }

    #[tokio::test]
    async fn test_try_run_exit_codes() {
        assert_eq!(try_run("true", &[]).await, 0);
        assert_eq!(try_run("exit 3", &[]).await, 3);
        assert_eq!(try_run("test \"$QA_FLAG\" = on", &[("QA_FLAG", "on".to_string())]).await, 0);
    }
}
