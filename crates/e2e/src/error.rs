//! Error types for the audit engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Server did not become ready at {url} within {waited_ms}ms")]
    ServerNotReady { url: String, waited_ms: u64 },

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("{0}")]
    Usage(String),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Playwright bridge exited unexpectedly")]
    BridgeClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] fleetqa_common::Error),
}

pub type AuditResult<T> = Result<T, AuditError>;

impl AuditError {
    /// Invalid invocation, reported before any side effect.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            AuditError::Usage(_)
                | AuditError::InvalidBaseUrl(_)
                | AuditError::Common(
                    fleetqa_common::Error::UnknownModule(_)
                        | fleetqa_common::Error::UnknownRole(_)
                        | fleetqa_common::Error::UnknownArea(_)
                )
        )
    }
}
