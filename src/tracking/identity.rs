//! Caller identity attached to tracked calls.

use std::fmt;

/// Identity of the caller, resolved once at the start of a call.
///
/// Authentication layers running in front of the tracking middleware insert
/// this into the request extensions. Requests without one are recorded as
/// [`CallerIdentity::ANONYMOUS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    /// Sentinel for unauthenticated callers.
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }

    /// Use `name` when present and non-empty, the anonymous sentinel otherwise.
    pub fn resolve(name: Option<&str>) -> Self {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Self::new(name),
            None => Self::anonymous(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for CallerIdentity {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
