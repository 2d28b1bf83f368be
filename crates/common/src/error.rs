//! Error types for FleetQA shared infrastructure

use thiserror::Error;

/// Result type alias using the FleetQA common error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the registry and process utilities
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown role: {0} (expected one of ADMIN, MANAGER, TECHNICIAN, DRIVER)")]
    UnknownRole(String),

    #[error("Unknown area: {0}")]
    UnknownArea(String),

    #[error("Unknown module \"{0}\". Use --list-modules.")]
    UnknownModule(String),
}
