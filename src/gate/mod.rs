use crate::{
    session::Session,
    token::{Claims, ROLE_USER},
};
use secrecy::ExposeSecret;

/// Where unauthenticated requests are sent.
pub const LOGIN_PATH: &str = "/auth/login";

/// Where authenticated requests lacking the admin role are sent.
pub const FORBIDDEN_PATH: &str = "/forbidden";

const PUBLIC_EXACT: &[&str] = &[
    "/",
    "/auth/login",
    "/auth/logout",
    "/auth/register",
    "/signup",
    "/favicon.ico",
    "/rooms",
    "/health",
];

const ROOMS_PREFIX: &str = "/rooms/";
const DASHBOARD_PREFIX: &str = "/dashboard";

/// Static partition of the navigation surface; every path maps to exactly
/// one class, unmatched paths fall to the most restrictive non-admin class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// Reachable with or without a session.
    Public,
    /// Room detail pages: any logged-in guest, no role check.
    RoomDetail,
    /// Admin dashboard: requires the admin role.
    Dashboard,
    /// Fallback class: requires a recognized role.
    Account,
}

#[must_use]
pub fn classify(path: &str) -> PathClass {
    if PUBLIC_EXACT.contains(&path) {
        PathClass::Public
    } else if path.starts_with(ROOMS_PREFIX) {
        PathClass::RoomDetail
    } else if path.starts_with(DASHBOARD_PREFIX) {
        PathClass::Dashboard
    } else {
        PathClass::Account
    }
}

/// Terminal outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Redirect(&'static str),
}

/// Decide whether a navigation request may proceed.
///
/// A token that fails to decode counts as no token at all, so privileged
/// paths answer with a login redirect rather than forbidden. The gate never
/// fetches data and never mutates the session.
#[must_use]
pub fn evaluate(path: &str, session: &Session) -> Verdict {
    let class = classify(path);

    if class == PathClass::Public {
        return Verdict::Allow;
    }

    let Some(claims) = session
        .token()
        .and_then(|token| Claims::decode(token.expose_secret()))
    else {
        return Verdict::Redirect(LOGIN_PATH);
    };

    match class {
        PathClass::Public | PathClass::RoomDetail => Verdict::Allow,
        PathClass::Dashboard => {
            if claims.is_admin() {
                Verdict::Allow
            } else {
                Verdict::Redirect(FORBIDDEN_PATH)
            }
        }
        PathClass::Account => {
            if claims.has_role(ROLE_USER) || claims.is_admin() {
                Verdict::Allow
            } else {
                Verdict::Redirect(LOGIN_PATH)
            }
        }
    }
}
