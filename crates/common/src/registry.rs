//! Static route and module catalog
//!
//! Only pages that are safe to open are listed. Create pages are opened but
//! never submitted, so none of the entries is marked destructive.

use crate::types::{Area, Module, Role, Route};

const ALL: &[Role] = &[Role::Admin, Role::Manager, Role::Technician, Role::Driver];
const STAFF: &[Role] = &[Role::Admin, Role::Manager, Role::Technician];
const MANAGEMENT: &[Role] = &[Role::Admin, Role::Manager];
const ADMIN_ONLY: &[Role] = &[Role::Admin];

const fn route(path: &'static str, area: Area, allowed_roles: &'static [Role]) -> Route {
    Route {
        path,
        area,
        allowed_roles,
        destructive: false,
    }
}

pub const ROUTES: &[Route] = &[
    route("/login", Area::Auth, ALL),
    route("/register", Area::Onboarding, ALL),
    route("/onboarding", Area::Onboarding, ALL),
    route("/", Area::Dashboard, ALL),
    route("/dashboard", Area::Dashboard, ALL),
    route("/vehicles/list", Area::Vehicles, ALL),
    route("/vehicles/list/create", Area::Vehicles, ALL),
    route("/vehicles/assignments", Area::Vehicles, STAFF),
    route("/vehicles/meter-history", Area::Vehicles, STAFF),
    route("/vehicles/expense", Area::Vehicles, MANAGEMENT),
    route("/vehicles/expense/create", Area::Vehicles, MANAGEMENT),
    route("/vehicles/replacement", Area::Vehicles, MANAGEMENT),
    route("/inspections", Area::Inspections, ALL),
    route("/inspections/history", Area::Inspections, ALL),
    route("/inspections/history/create", Area::Inspections, ALL),
    route("/inspections/schedules", Area::Inspections, MANAGEMENT),
    route("/inspections/forms", Area::Inspections, MANAGEMENT),
    route("/inspections/forms/create", Area::Inspections, MANAGEMENT),
    route("/service", Area::Service, STAFF),
    route("/service/history", Area::Service, STAFF),
    route("/service/history/create", Area::Service, STAFF),
    route("/service/work-orders", Area::Service, STAFF),
    route("/service/work-orders/create", Area::Service, STAFF),
    route("/service/tasks", Area::Service, STAFF),
    route("/service/tasks/create", Area::Service, STAFF),
    route("/service/programs", Area::Service, MANAGEMENT),
    route("/service/programs/create", Area::Service, MANAGEMENT),
    route("/issues", Area::Issues, ALL),
    route("/issues/create", Area::Issues, ALL),
    route("/fuel/history", Area::Fuel, ALL),
    route("/fuel/history/create", Area::Fuel, ALL),
    route("/fuel/charging", Area::Fuel, ALL),
    route("/fuel/charging/create", Area::Fuel, ALL),
    route("/parts", Area::Parts, STAFF),
    route("/parts/create", Area::Parts, STAFF),
    route("/places", Area::Places, STAFF),
    route("/places/create", Area::Places, STAFF),
    route("/contacts", Area::Contacts, STAFF),
    route("/contacts/create", Area::Contacts, STAFF),
    route("/vendors", Area::Vendors, STAFF),
    route("/vendors/create", Area::Vendors, STAFF),
    route("/reminders/service", Area::Reminders, STAFF),
    route("/reminders/service/create", Area::Reminders, STAFF),
    route("/reminders/vehicle-renewals", Area::Reminders, STAFF),
    route("/reminders/vehicle-renewals/create", Area::Reminders, STAFF),
    route("/settings/general", Area::Settings, ALL),
    route("/settings/user-profile", Area::Settings, ALL),
    route("/settings/login-password", Area::Settings, ALL),
    route("/settings/groups", Area::Settings, MANAGEMENT),
    route("/documents", Area::Documents, ALL),
    route("/reports", Area::Reports, ALL),
];

/// Routes that the middleware is known to redirect away from even for
/// authenticated users. Landing elsewhere is reported as a P2 finding.
pub const WATCHED_REDIRECT_ROUTES: &[&str] = &["/documents", "/reports"];

/// Routes visited without a session, before the crawler logs in.
pub const PRE_AUTH_ROUTES: &[&str] = &["/login", "/register"];

const FLEET_DATA_SETUP: &str = "tests/setup/fleet-data.setup.ts";

pub const MODULES: &[Module] = &[
    Module {
        id: "auth",
        label: "Authentication",
        areas: &[Area::Auth],
        test_files: &["tests/login-onboarding.spec.ts"],
        roles: Some(ADMIN_ONLY),
    },
    Module {
        id: "onboarding",
        label: "Registration & onboarding",
        areas: &[Area::Onboarding],
        test_files: &["tests/registration-flow.spec.ts"],
        roles: Some(ADMIN_ONLY),
    },
    Module {
        id: "dashboard",
        label: "Dashboard & navigation",
        areas: &[Area::Dashboard],
        test_files: &[
            FLEET_DATA_SETUP,
            "tests/dashboard.spec.ts",
            "tests/navigation-after-login.spec.ts",
        ],
        roles: None,
    },
    Module {
        id: "vehicles",
        label: "Vehicles",
        areas: &[Area::Vehicles],
        test_files: &[
            FLEET_DATA_SETUP,
            "tests/vehicles.spec.ts",
            "tests/vehicle-filters.spec.ts",
        ],
        roles: None,
    },
    Module {
        id: "inspections",
        label: "Inspections",
        areas: &[Area::Inspections],
        test_files: &[FLEET_DATA_SETUP, "tests/inspections.spec.ts"],
        roles: None,
    },
    Module {
        id: "service",
        label: "Service & work orders",
        areas: &[Area::Service],
        test_files: &[FLEET_DATA_SETUP, "tests/service.spec.ts"],
        roles: None,
    },
    Module {
        id: "issues",
        label: "Issues",
        areas: &[Area::Issues],
        test_files: &[FLEET_DATA_SETUP, "tests/issues.spec.ts"],
        roles: None,
    },
    Module {
        id: "fuel",
        label: "Fuel & charging",
        areas: &[Area::Fuel],
        test_files: &[FLEET_DATA_SETUP, "tests/fuel.spec.ts"],
        roles: None,
    },
    Module {
        id: "parts",
        label: "Parts & inventory",
        areas: &[Area::Parts],
        test_files: &["tests/parts.spec.ts"],
        roles: None,
    },
    Module {
        id: "directory",
        label: "Places, contacts & vendors",
        areas: &[Area::Places, Area::Contacts, Area::Vendors],
        test_files: &[],
        roles: None,
    },
    Module {
        id: "reminders",
        label: "Reminders",
        areas: &[Area::Reminders],
        test_files: &[FLEET_DATA_SETUP, "tests/reminders.spec.ts"],
        roles: None,
    },
    Module {
        id: "settings",
        label: "Settings",
        areas: &[Area::Settings],
        test_files: &["tests/settings.spec.ts"],
        roles: None,
    },
    Module {
        id: "documents",
        label: "Documents",
        areas: &[Area::Documents],
        test_files: &["tests/documents.spec.ts"],
        roles: None,
    },
    Module {
        id: "reports",
        label: "Reports",
        areas: &[Area::Reports],
        test_files: &["tests/reports.spec.ts"],
        roles: None,
    },
];

/// Seeded account used by the crawler to log in as a role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub email: &'static str,
    pub password: &'static str,
}

/// Fixed seed accounts, one per role.
pub fn seed_credentials(role: Role) -> Credentials {
    match role {
        Role::Admin => Credentials {
            email: "admin@fleetmadagascar.mg",
            password: "testpassword123",
        },
        Role::Manager => Credentials {
            email: "manager@fleetmadagascar.mg",
            password: "userpassword123",
        },
        Role::Technician => Credentials {
            email: "tech@fleetmadagascar.mg",
            password: "userpassword123",
        },
        Role::Driver => Credentials {
            email: "driver@fleetmadagascar.mg",
            password: "userpassword123",
        },
    }
}

/// All routes the given role may legitimately reach.
pub fn routes_for_role(role: Role) -> Vec<&'static Route> {
    ROUTES.iter().filter(|r| r.allows(role)).collect()
}

pub fn get_module_by_id(id: &str) -> Option<&'static Module> {
    MODULES.iter().find(|m| m.id == id)
}
