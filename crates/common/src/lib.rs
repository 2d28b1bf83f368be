//! FleetQA Common Library
//!
//! Static route/module registry, the shared audit data model and the
//! process/filesystem helpers every audit phase builds on.

pub mod error;
pub mod registry;
pub mod types;
pub mod util;

pub use error::{Error, Result};
pub use registry::{get_module_by_id, routes_for_role, seed_credentials, Credentials, MODULES, ROUTES};
pub use types::*;
