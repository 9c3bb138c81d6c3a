//! Backend identities and their fixed priority ranks.
//!
//! Every package-management backend mooring can drive has exactly one
//! static [`BackendIdentity`]. Ranks are part of the identity: lower rank is
//! tried first. Changing a rank changes which backend wins ties for every
//! project, so ranks only move through an explicit edit of this table.

use serde::{Deserialize, Serialize};

/// Unique backend identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    /// Conan - prebuilt binary distribution
    Conan,
    /// vcpkg - platform-first ports tree
    Vcpkg,
    /// Header fetcher - clones header-only libraries from git
    Fetch,
}

/// The family a backend belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Binary-centric manager (prefers prebuilt artifacts)
    Binary,
    /// Platform-first manager (ports built per target triplet)
    Platform,
    /// Header-only fetcher (source checkouts, nothing compiled)
    HeaderFetch,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Binary => "binary",
            BackendKind::Platform => "platform",
            BackendKind::HeaderFetch => "header-fetch",
        }
    }
}

/// Immutable description of a backend.
#[derive(Debug, PartialEq, Eq)]
pub struct BackendIdentity {
    /// Unique identifier
    pub id: BackendId,

    /// Backend family
    pub kind: BackendKind,

    /// Priority rank (lower = tried first)
    pub rank: u8,

    /// Declaration files the backend reads, relative to the project root.
    /// Any one of them is sufficient.
    pub declaration_files: &'static [&'static str],

    /// Lock file path, relative to the project root.
    pub lock_file: &'static str,

    /// One-line description for listings.
    pub description: &'static str,
}

pub static CONAN: BackendIdentity = BackendIdentity {
    id: BackendId::Conan,
    kind: BackendKind::Binary,
    rank: 0,
    declaration_files: &["conanfile.txt", "conanfile.py"],
    lock_file: "Mooring.conan.lock",
    description: "Conan binary package manager",
};

pub static VCPKG: BackendIdentity = BackendIdentity {
    id: BackendId::Vcpkg,
    kind: BackendKind::Platform,
    rank: 1,
    declaration_files: &["vcpkg.json"],
    lock_file: "Mooring.vcpkg.lock",
    description: "vcpkg ports (manifest mode)",
};

pub static FETCH: BackendIdentity = BackendIdentity {
    id: BackendId::Fetch,
    kind: BackendKind::HeaderFetch,
    rank: 2,
    declaration_files: &["headers.toml"],
    lock_file: "Mooring.fetch.lock",
    description: "Header-only libraries fetched from git",
};

impl BackendId {
    /// All known backends, in rank order.
    pub const ALL: [BackendId; 3] = [BackendId::Conan, BackendId::Vcpkg, BackendId::Fetch];

    /// Get the backend name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Conan => "conan",
            BackendId::Vcpkg => "vcpkg",
            BackendId::Fetch => "fetch",
        }
    }

    /// The static identity for this backend.
    pub fn identity(&self) -> &'static BackendIdentity {
        match self {
            BackendId::Conan => &CONAN,
            BackendId::Vcpkg => &VCPKG,
            BackendId::Fetch => &FETCH,
        }
    }

    pub fn rank(&self) -> u8 {
        self.identity().rank
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BackendId {
    type Err = BackendIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conan" | "binary" => Ok(BackendId::Conan),
            "vcpkg" | "platform" => Ok(BackendId::Vcpkg),
            "fetch" | "headers" | "header-fetch" => Ok(BackendId::Fetch),
            _ => Err(BackendIdParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid backend ID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid backend '{0}', valid values: conan, vcpkg, fetch")]
pub struct BackendIdParseError(pub String);
