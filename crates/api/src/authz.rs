//! API-side authorization guard.
//!
//! Permissions are derived from token roles at the request boundary, so the
//! engine and stores stay auth-agnostic.

use mailroom_auth::{authorize, AuthzError, Permission, Principal, Role};

use crate::context::PrincipalContext;

/// Resolve the request context into a [`Principal`] and check one required
/// permission before any dispatch work begins.
pub fn require(context: &PrincipalContext, required: &Permission) -> Result<Principal, AuthzError> {
    let principal = Principal::new(
        context.principal_id(),
        permissions_from_roles(context.roles()),
    );
    authorize(&principal, required)?;
    Ok(principal)
}

/// Role → permission mapping.
///
/// Intentionally simple until a real policy source exists (e.g. DB-backed):
/// "admin" grants everything, "clerk" covers the day-to-day dispatch flow.
fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(|r| r.as_str() == "admin") {
        return vec![Permission::new("*")];
    }

    if roles.iter().any(|r| r.as_str() == "clerk") {
        return vec![
            Permission::dispatch_create(),
            Permission::dispatch_process(),
            Permission::dispatch_read(),
        ];
    }

    Vec::new()
}
