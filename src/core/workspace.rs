//! Workspace - the project being resolved and where its outputs live.

use std::path::{Path, PathBuf};

use crate::core::manifest::{Manifest, ManifestError};
use crate::core::{BackendId, TargetTriple};

/// A project rooted at the directory containing `Mooring.toml`.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    manifest: Manifest,
}

impl Workspace {
    /// Create a new workspace from a manifest path.
    pub fn new(manifest_path: &Path) -> Result<Self, ManifestError> {
        let manifest = Manifest::load(manifest_path)?;
        let root = manifest_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();

        Ok(Workspace { root, manifest })
    }

    /// Create a workspace from an already parsed manifest.
    pub fn from_parts(root: PathBuf, manifest: Manifest) -> Self {
        Workspace { root, manifest }
    }

    /// Get the workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Get the manifest path.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(crate::core::manifest::MANIFEST_NAME)
    }

    /// Get the .mooring directory.
    pub fn mooring_dir(&self) -> PathBuf {
        self.root.join(".mooring")
    }

    /// Directory a backend installs into for a given platform.
    pub fn install_dir(&self, backend: BackendId, platform: &TargetTriple) -> PathBuf {
        self.mooring_dir()
            .join(backend.as_str())
            .join(platform.to_string())
    }

    /// Lock file path for a backend.
    pub fn lock_path(&self, backend: BackendId) -> PathBuf {
        self.root.join(backend.identity().lock_file)
    }

    /// First declaration file of `backend` that exists, if any.
    pub fn declaration_file(&self, backend: BackendId) -> Option<PathBuf> {
        backend
            .identity()
            .declaration_files
            .iter()
            .map(|f| self.root.join(f))
            .find(|p| p.is_file())
    }

    /// Where the resolved dependency manifest is published for build tooling.
    pub fn resolved_manifest_path(&self) -> PathBuf {
        self.mooring_dir().join("resolved.json")
    }

    /// Project-level config path (.mooring/config.toml).
    pub fn config_path(&self) -> PathBuf {
        self.mooring_dir().join("config.toml")
    }
}
