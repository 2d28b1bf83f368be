//! Core types for FleetQA

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Application role. Drives which routes are exercised and which seed
/// account is used to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    Technician,
    Driver,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::Technician, Role::Driver];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Technician => "TECHNICIAN",
            Role::Driver => "DRIVER",
        }
    }

    /// Parse a comma separated role list, ignoring blanks.
    pub fn parse_list(csv: &str) -> Result<Vec<Role>, Error> {
        csv.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Role::from_str)
            .collect()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "MANAGER" => Ok(Role::Manager),
            "TECHNICIAN" => Ok(Role::Technician),
            "DRIVER" => Ok(Role::Driver),
            _ => Err(Error::UnknownRole(s.to_string())),
        }
    }
}

/// Functional area of the application a route belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Area {
    Auth,
    Onboarding,
    Dashboard,
    Vehicles,
    Inspections,
    Service,
    Issues,
    Fuel,
    Parts,
    Places,
    Contacts,
    Vendors,
    Reminders,
    Settings,
    Documents,
    Reports,
}

impl Area {
    pub fn as_str(&self) -> &'static str {
        match self {
            Area::Auth => "auth",
            Area::Onboarding => "onboarding",
            Area::Dashboard => "dashboard",
            Area::Vehicles => "vehicles",
            Area::Inspections => "inspections",
            Area::Service => "service",
            Area::Issues => "issues",
            Area::Fuel => "fuel",
            Area::Parts => "parts",
            Area::Places => "places",
            Area::Contacts => "contacts",
            Area::Vendors => "vendors",
            Area::Reminders => "reminders",
            Area::Settings => "settings",
            Area::Documents => "documents",
            Area::Reports => "reports",
        }
    }
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page the crawler may open, and the roles allowed to reach it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub path: &'static str,
    pub area: Area,
    pub allowed_roles: &'static [Role],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub destructive: bool,
}

impl Route {
    pub fn allows(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }
}

/// A named audit bundle: functional areas to explore plus the E2E files to run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: &'static str,
    pub label: &'static str,
    pub areas: &'static [Area],
    pub test_files: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<&'static [Role]>,
}

impl Module {
    pub fn covers(&self, area: Area) -> bool {
        self.areas.contains(&area)
    }
}

/// Finding severity, P0 being the most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    P0,
    P1,
    P2,
    P3,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::P0, Severity::P1, Severity::P2, Severity::P3];

    /// P0 and P1 turn a module red.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::P0 | Severity::P1)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::P0 => "P0",
            Severity::P1 => "P1",
            Severity::P2 => "P2",
            Severity::P3 => "P3",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingType {
    Functional,
    Ux,
    A11y,
    Test,
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FindingType::Functional => "functional",
            FindingType::Ux => "ux",
            FindingType::A11y => "a11y",
            FindingType::Test => "test",
        };
        f.write_str(s)
    }
}

/// One deduplicated issue surfaced by an audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub severity: Severity,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Finding {
    pub fn new(
        id: impl Into<String>,
        finding_type: FindingType,
        severity: Severity,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            finding_type,
            severity,
            title: title.into(),
            role: None,
            url: None,
            expected: None,
            observed: None,
            evidence: Vec::new(),
            hypothesis: None,
            tags: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: Option<Role>) -> Self {
        self.role = role;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_observed(mut self, observed: impl Into<String>) -> Self {
        self.observed = Some(observed.into());
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_hypothesis(mut self, hypothesis: impl Into<String>) -> Self {
        self.hypothesis = Some(hypothesis.into());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Finding counts keyed by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(rename = "P0")]
    pub p0: usize,
    #[serde(rename = "P1")]
    pub p1: usize,
    #[serde(rename = "P2")]
    pub p2: usize,
    #[serde(rename = "P3")]
    pub p3: usize,
}

impl SeverityCounts {
    pub fn tally(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::P0 => counts.p0 += 1,
                Severity::P1 => counts.p1 += 1,
                Severity::P2 => counts.p2 += 1,
                Severity::P3 => counts.p3 += 1,
            }
        }
        counts
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::P0 => self.p0,
            Severity::P1 => self.p1,
            Severity::P2 => self.p2,
            Severity::P3 => self.p3,
        }
    }

    pub fn total(&self) -> usize {
        self.p0 + self.p1 + self.p2 + self.p3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_list() {
        let roles = Role::parse_list("admin, DRIVER,,").unwrap();
        assert_eq!(roles, vec![Role::Admin, Role::Driver]);
        assert!(Role::parse_list("ADMIN,PILOT").is_err());
    }

    #[test]
    fn test_role_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Role::Technician).unwrap(), "\"TECHNICIAN\"");
    }

    #[test]
    fn test_severity_ordering() {
        let mut severities = vec![Severity::P2, Severity::P0, Severity::P3, Severity::P1];
        severities.sort();
        assert_eq!(severities, Severity::ALL.to_vec());
        assert!(Severity::P1.is_blocking());
        assert!(!Severity::P2.is_blocking());
    }

    #[test]
    fn test_finding_serialization_shape() {
        let finding = Finding::new("SETUP-FAILED", FindingType::Test, Severity::P0, "Setup failed")
            .with_observed("npm run db:seed (exit 1)")
            .with_tags(&["setup"]);
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["type"], "test");
        assert_eq!(json["severity"], "P0");
        assert!(json.get("role").is_none());
        assert_eq!(json["tags"][0], "setup");
    }

    #[test]
    fn test_severity_counts_tally() {
        let findings = vec![
            Finding::new("a", FindingType::Functional, Severity::P1, "a"),
            Finding::new("b", FindingType::Functional, Severity::P1, "b"),
            Finding::new("c", FindingType::Test, Severity::P3, "c"),
        ];
        let counts = SeverityCounts::tally(&findings);
        assert_eq!(counts.p1, 2);
        assert_eq!(counts.get(Severity::P3), 1);
        assert_eq!(counts.total(), 3);
        let json = serde_json::to_value(counts).unwrap();
        assert_eq!(json["P1"], 2);
    }
}
