//! Invocation options and module scope resolution

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use fleetqa_common::{get_module_by_id, Error, Module, Role, MODULES};

use crate::error::{AuditError, AuditResult};
use crate::runner::DEFAULT_RUNNER_COMMAND;
use crate::server::port_from_base_url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_AUDIT_ROOT: &str = "qa/audits";

/// Environment preparation run once per invocation, in order.
pub const DEFAULT_SETUP_COMMANDS: &[&str] = &[
    "npm run docker:up",
    "npm run test:infra",
    "npm run db:generate",
    "npm run db:migrate",
    "npm run db:seed",
];

/// Which modules an invocation covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleScope {
    All,
    List(Vec<String>),
    Single(String),
}

impl ModuleScope {
    /// `--all` wins over `--modules`, which wins over `--module`.
    pub fn from_flags(all: bool, modules: Option<&str>, module: Option<&str>) -> AuditResult<Self> {
        if all {
            return Ok(ModuleScope::All);
        }
        if let Some(csv) = modules {
            return Ok(ModuleScope::List(
                csv.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            ));
        }
        if let Some(id) = module {
            return Ok(ModuleScope::Single(id.trim().to_string()));
        }
        Err(AuditError::Usage(
            "Missing required scope. Provide --module, --modules, or --all.".to_string(),
        ))
    }

    /// Look up every requested id, keeping first-seen order and dropping
    /// repeats.
    pub fn resolve(&self) -> AuditResult<Vec<&'static Module>> {
        let ids: Vec<&str> = match self {
            ModuleScope::All => return Ok(MODULES.iter().collect()),
            ModuleScope::List(ids) => ids.iter().map(String::as_str).collect(),
            ModuleScope::Single(id) => vec![id.as_str()],
        };

        let mut selected: Vec<&'static Module> = Vec::new();
        for id in ids.into_iter().filter(|id| !id.is_empty()) {
            let module = get_module_by_id(id).ok_or_else(|| Error::UnknownModule(id.to_string()))?;
            if !selected.iter().any(|m| m.id == module.id) {
                selected.push(module);
            }
        }
        if selected.is_empty() {
            return Err(AuditError::Usage("No modules selected.".to_string()));
        }
        Ok(selected)
    }
}

/// Options for a whole audit run
#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub base_url: String,
    pub roles: Vec<Role>,
    /// Root under which `<date>/...` directories are created
    pub audit_root: PathBuf,
    pub strict: bool,
    pub bail: bool,
    pub skip_setup: bool,
    pub skip_playwright: bool,
    pub skip_explore: bool,
    pub runner_command: String,
    pub setup_commands: Vec<String>,
    /// The app was started with documents/reports routes switched off
    pub docs_reports_routes_disabled: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            roles: Role::ALL.to_vec(),
            audit_root: PathBuf::from(DEFAULT_AUDIT_ROOT),
            strict: false,
            bail: false,
            skip_setup: false,
            skip_playwright: false,
            skip_explore: false,
            runner_command: DEFAULT_RUNNER_COMMAND.to_string(),
            setup_commands: DEFAULT_SETUP_COMMANDS.iter().map(|c| c.to_string()).collect(),
            docs_reports_routes_disabled: false,
        }
    }
}

impl AuditOptions {
    /// Reject options that cannot drive a run.
    pub fn validate(&self) -> AuditResult<()> {
        if self.roles.is_empty() {
            return Err(AuditError::Usage("No roles given.".to_string()));
        }
        port_from_base_url(&self.base_url)?;
        Ok(())
    }

    /// Roles to crawl for a module: its own override, else the run's
    /// roles, without duplicates.
    pub fn roles_for(&self, module: &Module) -> Vec<Role> {
        let source = match module.roles {
            Some(roles) => roles,
            None => self.roles.as_slice(),
        };
        let mut roles = Vec::with_capacity(source.len());
        for role in source {
            if !roles.contains(role) {
                roles.push(*role);
            }
        }
        roles
    }

    pub fn echo(&self, modules: &[&Module]) -> OptionsEcho {
        OptionsEcho {
            strict: self.strict,
            bail: self.bail,
            skip_setup: self.skip_setup,
            skip_playwright: self.skip_playwright,
            skip_explore: self.skip_explore,
            roles: self.roles.clone(),
            modules_requested: modules.iter().map(|m| m.id.to_string()).collect(),
        }
    }
}

/// Options as recorded in the run index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsEcho {
    pub strict: bool,
    pub bail: bool,
    pub skip_setup: bool,
    pub skip_playwright: bool,
    pub skip_explore: bool,
    pub roles: Vec<Role>,
    pub modules_requested: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_precedence() {
        assert_eq!(
            ModuleScope::from_flags(true, Some("vehicles"), Some("auth")).unwrap(),
            ModuleScope::All
        );
        assert_eq!(
            ModuleScope::from_flags(false, Some("vehicles, fuel"), Some("auth")).unwrap(),
            ModuleScope::List(vec!["vehicles".to_string(), "fuel".to_string()])
        );
        assert_eq!(
            ModuleScope::from_flags(false, None, Some("auth")).unwrap(),
            ModuleScope::Single("auth".to_string())
        );
    }

    #[test]
    fn test_missing_scope_is_usage_error() {
        let err = ModuleScope::from_flags(false, None, None).unwrap_err();
        assert!(err.is_usage());
        assert!(err.to_string().contains("--module, --modules, or --all"));
    }

    #[test]
    fn test_resolve_dedupes_in_order() {
        let scope = ModuleScope::List(vec!["fuel".into(), "auth".into(), "fuel".into()]);
        let ids: Vec<&str> = scope.resolve().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["fuel", "auth"]);
    }

    #[test]
    fn test_resolve_unknown_module() {
        let err = ModuleScope::Single("nope".into()).resolve().unwrap_err();
        assert!(err.is_usage());
        assert_eq!(err.to_string(), "Unknown module \"nope\". Use --list-modules.");
    }

    #[test]
    fn test_resolve_all() {
        assert_eq!(ModuleScope::All.resolve().unwrap().len(), MODULES.len());
    }

    #[test]
    fn test_roles_for_module() {
        let options = AuditOptions {
            roles: vec![Role::Driver, Role::Admin, Role::Driver],
            ..Default::default()
        };
        let auth = get_module_by_id("auth").unwrap();
        assert_eq!(options.roles_for(auth), vec![Role::Admin]);
        let fuel = get_module_by_id("fuel").unwrap();
        assert_eq!(options.roles_for(fuel), vec![Role::Driver, Role::Admin]);
    }

    #[test]
    fn test_validate() {
        assert!(AuditOptions::default().validate().is_ok());
        let no_roles = AuditOptions {
            roles: Vec::new(),
            ..Default::default()
        };
        assert!(no_roles.validate().unwrap_err().is_usage());
        let bad_url = AuditOptions {
            base_url: "localhost".to_string(),
            ..Default::default()
        };
        assert!(bad_url.validate().unwrap_err().is_usage());
    }
}
