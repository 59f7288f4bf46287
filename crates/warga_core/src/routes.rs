//! crates/warga_core/src/routes.rs
//!
//! The portal's navigation surface and the gates each route sits behind.

use crate::domain::Role;
use crate::gate::GateTier;

pub const LOGIN_ROUTE: &str = "/login";
pub const NOT_AUTHORIZED_ROUTE: &str = "/not-authorized";
pub const RESIDENT_HOME: &str = "/dashboard";
pub const ADMIN_HOME: &str = "/admin";

const PUBLIC: &[GateTier] = &[];
const RESIDENT: &[GateTier] = &[GateTier::Resident];
// The admin gate is stacked on top of the resident gate, never instead of it.
const ADMIN: &[GateTier] = &[GateTier::Resident, GateTier::Admin];

const ROUTES: &[(&str, &[GateTier])] = &[
    ("/", PUBLIC),
    ("/login", PUBLIC),
    ("/register", PUBLIC),
    ("/forgot-password", PUBLIC),
    ("/layanan", PUBLIC),
    ("/kegiatan/:id", PUBLIC),
    ("/events", PUBLIC),
    ("/agenda", PUBLIC),
    ("/not-authorized", PUBLIC),
    ("/dashboard", RESIDENT),
    ("/admin", ADMIN),
    ("/admin/warga", ADMIN),
    ("/admin/kegiatan", ADMIN),
    ("/admin/layanan", ADMIN),
    ("/admin/ipl", ADMIN),
    ("/admin/settings", ADMIN),
];

/// The gates guarding `path`, outermost first. `None` for unknown routes.
pub fn route_tiers(path: &str) -> Option<&'static [GateTier]> {
    let path = normalize(path);
    ROUTES
        .iter()
        .find(|(pattern, _)| matches_pattern(pattern, path))
        .map(|(_, tiers)| *tiers)
}

/// Where a user lands after signing in.
pub fn landing_route(role: Role) -> &'static str {
    match role {
        Role::Admin => ADMIN_HOME,
        Role::User => RESIDENT_HOME,
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or("");
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn matches_pattern(pattern: &str, path: &str) -> bool {
    let mut want = pattern.split('/');
    let mut have = path.split('/');
    loop {
        match (want.next(), have.next()) {
            (None, None) => return true,
            (Some(w), Some(h)) if w.starts_with(':') && !h.is_empty() => continue,
            (Some(w), Some(h)) if w == h => continue,
            _ => return false,
        }
    }
}
