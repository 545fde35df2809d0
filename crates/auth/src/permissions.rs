use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "dispatch.create").
/// A special wildcard permission `"*"` can be used by policy layers to indicate
/// "allow all" without hardcoding domain permissions into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Create a dispatch job.
    pub fn dispatch_create() -> Self {
        Self::new("dispatch.create")
    }

    /// Drive chunk processing for a job.
    pub fn dispatch_process() -> Self {
        Self::new("dispatch.process")
    }

    /// Read own dispatch jobs.
    pub fn dispatch_read() -> Self {
        Self::new("dispatch.read")
    }

    /// Read all dispatch jobs and unredacted settings snapshots (elevated).
    pub fn dispatch_read_all() -> Self {
        Self::new("dispatch.read_all")
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
