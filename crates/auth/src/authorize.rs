use std::collections::HashSet;

use thiserror::Error;

use crate::{Permission, PrincipalId};

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from storage and
/// transport: the API layer derives permissions from claims and a policy
/// source before any dispatch work begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(principal_id: PrincipalId, permissions: Vec<Permission>) -> Self {
        Self {
            principal_id,
            permissions,
        }
    }

    /// Whether this principal may see jobs (and settings snapshots) of others.
    pub fn is_elevated(&self) -> bool {
        self.has(&Permission::dispatch_read_all())
    }

    fn has(&self, required: &Permission) -> bool {
        let perms: HashSet<&str> = self.permissions.iter().map(|p| p.as_str()).collect();
        perms.contains("*") || perms.contains(required.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal for a single required permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.has(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_grants_everything() {
        let p = Principal::new(PrincipalId::new(), vec![Permission::new("*")]);
        assert!(authorize(&p, &Permission::dispatch_create()).is_ok());
        assert!(p.is_elevated());
    }

    #[test]
    fn exact_permission_required() {
        let p = Principal::new(PrincipalId::new(), vec![Permission::dispatch_read()]);
        assert!(authorize(&p, &Permission::dispatch_read()).is_ok());
        assert!(matches!(
            authorize(&p, &Permission::dispatch_create()),
            Err(AuthzError::Forbidden(_))
        ));
        assert!(!p.is_elevated());
    }
}
