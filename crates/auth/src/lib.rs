//! `mailroom-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, AuthzError, Principal};
pub use claims::{
    validate_claims, Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError,
};
pub use permissions::Permission;
pub use principal::PrincipalId;
pub use roles::Role;
