//! Resolution requests and version constraints.

use std::fmt;

use semver::{Version, VersionReq};
use serde::Serialize;

use crate::core::{BackendId, TargetTriple};

/// A version constraint on a requested dependency.
///
/// C++ ecosystems do not agree on a version scheme, so a constraint that is
/// not a semver requirement is kept verbatim and matched exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Any version is acceptable (`*` or empty).
    Any,
    /// A semver requirement (`^1.2`, `>=1, <2`).
    Req(VersionReq),
    /// An opaque version that must match exactly (`2024-01-11`).
    Exact(String),
}

impl VersionConstraint {
    /// Parse a constraint from manifest text.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return VersionConstraint::Any;
        }
        match s.parse::<VersionReq>() {
            Ok(req) => VersionConstraint::Req(req),
            Err(_) => VersionConstraint::Exact(s.to_string()),
        }
    }

    /// Check whether a resolved version string satisfies this constraint.
    pub fn matches(&self, version: &str) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Req(req) => {
                parse_version_lenient(version).is_some_and(|v| req.matches(&v))
            }
            VersionConstraint::Exact(expected) => {
                strip_port_version(version) == expected || version == expected
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Req(req) => write!(f, "{}", req),
            VersionConstraint::Exact(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse a version string, allowing for incomplete versions.
///
/// Accepts a leading `v`, a vcpkg `#port-version` suffix and versions with
/// fewer (or more) than three numeric components.
pub fn parse_version_lenient(s: &str) -> Option<Version> {
    let s = strip_port_version(s.trim());
    let s = s.strip_prefix('v').unwrap_or(s);

    if let Ok(v) = s.parse() {
        return Some(v);
    }

    let parts: Vec<&str> = s.split('.').collect();
    let numbers: Vec<u64> = parts
        .iter()
        .take(3)
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;

    match numbers.as_slice() {
        [major] => Some(Version::new(*major, 0, 0)),
        [major, minor] => Some(Version::new(*major, *minor, 0)),
        [major, minor, patch] => Some(Version::new(*major, *minor, *patch)),
        _ => None,
    }
}

/// Drop a vcpkg `#port-version` suffix.
pub fn strip_port_version(s: &str) -> &str {
    s.split_once('#').map(|(v, _)| v).unwrap_or(s)
}

/// A single requested dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyRequirement {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl DependencyRequirement {
    pub fn new(name: impl Into<String>, constraint: &str) -> Self {
        DependencyRequirement {
            name: name.into(),
            constraint: VersionConstraint::parse(constraint),
        }
    }
}

/// Caller input for one resolution attempt.
///
/// Immutable once built; the orchestrator only ever borrows it.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    preferred: Option<BackendId>,
    platform: TargetTriple,
    dependencies: Vec<DependencyRequirement>,
}

impl ResolutionRequest {
    /// Create a request for the given platform. Dependencies are kept sorted
    /// by name so equal inputs produce equal requests.
    pub fn new(platform: TargetTriple, mut dependencies: Vec<DependencyRequirement>) -> Self {
        dependencies.sort_by(|a, b| a.name.cmp(&b.name));
        ResolutionRequest {
            preferred: None,
            platform,
            dependencies,
        }
    }

    /// Set the preferred backend.
    pub fn with_preference(mut self, preferred: Option<BackendId>) -> Self {
        self.preferred = preferred;
        self
    }

    pub fn preferred(&self) -> Option<BackendId> {
        self.preferred
    }

    pub fn platform(&self) -> &TargetTriple {
        &self.platform
    }

    pub fn dependencies(&self) -> &[DependencyRequirement] {
        &self.dependencies
    }

    /// Look up a requested dependency by name.
    pub fn dependency(&self, name: &str) -> Option<&DependencyRequirement> {
        self.dependencies.iter().find(|d| d.name == name)
    }
}
