//! Authorization policy.
//!
//! A state-free decision function: given the authenticated identity and the class
//! of the route being requested (or the owner of the resource being touched),
//! allow or deny. It runs strictly after authentication.

use uuid::Uuid;

use crate::{auth::AuthUser, error::AppError, models::Role};

/// Paths that bypass authentication entirely.
pub const PUBLIC_PATHS: &[&str] = &[
    "/health",
    "/hello",
    "/api/auth/login",
    "/api/auth/signup",
    "/api/notes/public",
];

/// Path prefixes restricted to the `admin` role.
pub const ADMIN_PREFIXES: &[&str] = &["/api/admin", "/api/users"];

/// Access
///
/// The class a route belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No token required.
    Public,
    /// Any valid token; ownership is checked per resource by [`ensure_owner`].
    Authenticated,
    /// Valid token with the `admin` role.
    AdminOnly,
}

/// Classifies a request path.
pub fn access_for(path: &str) -> Access {
    if PUBLIC_PATHS.contains(&path) {
        return Access::Public;
    }
    let is_admin = ADMIN_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")));
    if is_admin {
        Access::AdminOnly
    } else {
        Access::Authenticated
    }
}

/// Decides whether `user` may use a route of class `access`.
///
/// `AdminOnly` requires `Role::Admin`; every other role, `guest` included, is
/// `Forbidden`. Resource ownership plays no part at this level.
pub fn authorize(user: &AuthUser, access: Access) -> Result<(), AppError> {
    match access {
        Access::Public | Access::Authenticated => Ok(()),
        Access::AdminOnly if user.role == Role::Admin => Ok(()),
        Access::AdminOnly => Err(AppError::Forbidden(format!(
            "role '{}' may not access admin routes",
            user.role
        ))),
    }
}

/// Owner-scoped check for "my notes" reads and all note mutations.
pub fn ensure_owner(user: &AuthUser, owner_id: Uuid) -> Result<(), AppError> {
    if user.id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "user {} does not own this resource",
            user.id
        )))
    }
}
