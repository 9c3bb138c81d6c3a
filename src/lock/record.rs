//! Lock record format.
//!
//! A lock record is a TOML file with top-level keys first and one
//! `[[package]]` table per dependency, sorted by name, so version-control
//! diffs show drift line by line.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{BackendId, DependencyManifest, TargetTriple};
use crate::util::hash::Fingerprint;

/// Lock file format version.
pub const LOCK_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum LockFileError {
    #[error("failed to access lock file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse lock file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("lock file {} has unsupported version {found} (expected {})", .path.display(), LOCK_VERSION)]
    UnsupportedVersion { path: PathBuf, found: u32 },

    /// The packages were edited after the hash was computed. They are kept
    /// so callers can still report what the file claims.
    #[error("lock file {} content hash does not match its packages", .path.display())]
    HashMismatch {
        path: PathBuf,
        packages: Vec<LockedPackage>,
    },

    #[error("failed to serialize lock record: {0}")]
    Serialize(String),
}

/// One locked dependency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
}

/// Persisted snapshot of one backend's resolved dependency set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub backend: BackendId,
    pub content_hash: String,
    pub generated_at: DateTime<Utc>,
    pub platform: TargetTriple,
    /// Sorted by name
    pub packages: Vec<LockedPackage>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct EncodableLockRecord {
    version: u32,
    backend: BackendId,
    content_hash: String,
    generated_at: DateTime<Utc>,
    platform: TargetTriple,
    #[serde(default, rename = "package")]
    packages: Vec<LockedPackage>,
}

impl LockRecord {
    /// Record for a freshly resolved manifest, stamped now.
    pub fn from_manifest(manifest: &DependencyManifest) -> Self {
        let packages: Vec<LockedPackage> = manifest
            .pairs()
            .map(|(name, version)| LockedPackage {
                name: name.to_string(),
                version: version.to_string(),
            })
            .collect();

        LockRecord {
            backend: manifest.backend,
            content_hash: hash_packages(&packages),
            generated_at: Utc::now().trunc_subsecs(0),
            platform: manifest.platform.clone(),
            packages,
        }
    }

    /// Content hash a manifest would get, without building a record.
    pub fn hash_manifest(manifest: &DependencyManifest) -> String {
        let mut fp = Fingerprint::new();
        for (name, version) in manifest.pairs() {
            fp.update_pair(name, version);
        }
        fp.finish()
    }

    /// Whether `other` would serialize to the same file apart from the
    /// timestamp.
    pub fn same_content(&self, other: &LockRecord) -> bool {
        self.content_hash == other.content_hash
            && self.backend == other.backend
            && self.platform == other.platform
    }

    pub fn version_of(&self, name: &str) -> Option<&str> {
        self.packages
            .binary_search_by(|p| p.name.as_str().cmp(name))
            .ok()
            .map(|i| self.packages[i].version.as_str())
    }

    /// Serialize to the on-disk TOML form.
    pub fn to_toml_string(&self) -> Result<String, LockFileError> {
        let encodable = EncodableLockRecord {
            version: LOCK_VERSION,
            backend: self.backend,
            content_hash: self.content_hash.clone(),
            generated_at: self.generated_at,
            platform: self.platform.clone(),
            packages: self.packages.clone(),
        };

        let body = toml::to_string(&encodable).map_err(|e| LockFileError::Serialize(e.to_string()))?;
        Ok(format!(
            "# This file is generated by mooring. Do not edit by hand.\n{}",
            body
        ))
    }

    /// Parse and validate an on-disk lock record.
    pub fn parse(content: &str, path: &Path) -> Result<Self, LockFileError> {
        let raw: EncodableLockRecord = toml::from_str(content).map_err(|e| LockFileError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;

        if raw.version != LOCK_VERSION {
            return Err(LockFileError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: raw.version,
            });
        }

        let mut packages = raw.packages;
        packages.sort();

        if hash_packages(&packages) != raw.content_hash {
            return Err(LockFileError::HashMismatch {
                path: path.to_path_buf(),
                packages,
            });
        }

        Ok(LockRecord {
            backend: raw.backend,
            content_hash: raw.content_hash,
            generated_at: raw.generated_at,
            platform: raw.platform,
            packages,
        })
    }
}

/// SHA-256 over the sorted name/version pairs.
fn hash_packages(packages: &[LockedPackage]) -> String {
    let mut fp = Fingerprint::new();
    for pkg in packages {
        fp.update_pair(&pkg.name, &pkg.version);
    }
    fp.finish()
}
