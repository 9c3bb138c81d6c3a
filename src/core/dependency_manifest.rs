//! The materialized result of a successful resolution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{BackendId, ResolutionRequest, TargetTriple};

/// One installed dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    /// Resolved version as reported by the backend
    pub version: String,

    /// Where the backend materialized it (install prefix, package folder or
    /// include directory)
    pub location: PathBuf,
}

/// Dependency name -> installed version/location, as produced by one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyManifest {
    pub backend: BackendId,
    pub platform: TargetTriple,
    pub packages: BTreeMap<String, InstalledPackage>,
}

impl DependencyManifest {
    pub fn new(backend: BackendId, platform: TargetTriple) -> Self {
        DependencyManifest {
            backend,
            platform,
            packages: BTreeMap::new(),
        }
    }

    /// Add (or replace) a package.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        location: impl Into<PathBuf>,
    ) {
        self.packages.insert(
            name.into(),
            InstalledPackage {
                version: version.into(),
                location: location.into(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&InstalledPackage> {
        self.packages.get(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Name/version pairs in name order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.packages
            .iter()
            .map(|(name, pkg)| (name.as_str(), pkg.version.as_str()))
    }

    /// Requested dependencies this manifest does not satisfy.
    ///
    /// Each entry is a human-readable reason. Empty means every requested
    /// dependency is present at an acceptable version.
    pub fn unsatisfied(&self, request: &ResolutionRequest) -> Vec<String> {
        request
            .dependencies()
            .iter()
            .filter_map(|dep| match self.packages.get(&dep.name) {
                None => Some(format!("`{}` was not installed", dep.name)),
                Some(pkg) if !dep.constraint.matches(&pkg.version) => Some(format!(
                    "`{}` {} does not satisfy `{}`",
                    dep.name, pkg.version, dep.constraint
                )),
                Some(_) => None,
            })
            .collect()
    }

    /// Write the manifest as pretty JSON for the build-configuration layer.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("failed to serialize dependency manifest")?;
        crate::util::fs::write_string(path, &(json + "\n"))
    }
}
