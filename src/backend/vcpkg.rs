//! vcpkg adapter (platform-first backend).
//!
//! Installs in manifest mode into a project-local install root, then reads
//! what was installed back from vcpkg's own status database.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::backend::{
    check_cancel, classify_tool_failure, tool_diagnostic, AvailabilityReport, Backend,
    BackendError, UnavailableReason,
};
use crate::core::backend_id::VCPKG;
use crate::core::{BackendIdentity, DependencyManifest, ResolutionRequest, Workspace};
use crate::util::cancel::CancelToken;
use crate::util::config::VcpkgConfig;
use crate::util::process::ProcessBuilder;
use crate::util::vcpkg::{is_valid_vcpkg_root, resolve_root, resolve_triplet, VcpkgRoot};

pub struct VcpkgBackend {
    config: VcpkgConfig,
}

/// Only the identity fields of `vcpkg.json`; the rest belongs to vcpkg.
#[derive(Debug, Deserialize)]
struct DeclarationIdentity {
    #[serde(default)]
    name: Option<String>,
}

impl VcpkgBackend {
    pub fn new(config: VcpkgConfig) -> Self {
        VcpkgBackend { config }
    }

    fn locate(&self) -> Result<VcpkgRoot, UnavailableReason> {
        let root = resolve_root(&self.config).ok_or_else(|| UnavailableReason::NotInstalled {
            tool: "vcpkg".to_string(),
            install_hint: "Install vcpkg and set VCPKG_ROOT, or set `vcpkg.root` in config."
                .to_string(),
        })?;

        if !is_valid_vcpkg_root(&root.path) {
            return Err(UnavailableReason::ProbeFailed {
                message: format!(
                    "{} (from {}) is not a vcpkg root",
                    root.path.display(),
                    root.source.describe()
                ),
            });
        }

        if !root.binary().is_file() {
            return Err(UnavailableReason::NotInstalled {
                tool: "vcpkg".to_string(),
                install_hint: format!(
                    "Run the bootstrap script in {} to build the vcpkg tool.",
                    root.path.display()
                ),
            });
        }

        Ok(root)
    }

    fn install_root(&self, ws: &Workspace) -> PathBuf {
        ws.mooring_dir().join("vcpkg")
    }
}

impl Backend for VcpkgBackend {
    fn identity(&self) -> &'static BackendIdentity {
        &VCPKG
    }

    fn detect(&self, ws: &Workspace) -> AvailabilityReport {
        let root = match self.locate() {
            Ok(root) => root,
            Err(reason) => return AvailabilityReport::unavailable(self.id(), reason),
        };

        let Some(declaration) = ws.declaration_file(self.id()) else {
            return AvailabilityReport::unavailable(
                self.id(),
                UnavailableReason::DeclarationMissing {
                    expected: VCPKG.declaration_files.to_vec(),
                },
            );
        };

        if let Err(message) = read_declaration_identity(&declaration) {
            return AvailabilityReport::unavailable(
                self.id(),
                UnavailableReason::ProbeFailed { message },
            );
        }

        tracing::debug!(
            "vcpkg root {} (from {})",
            root.path.display(),
            root.source.describe()
        );
        AvailabilityReport::available(self.id(), None)
    }

    fn resolve(
        &self,
        ws: &Workspace,
        request: &ResolutionRequest,
        cancel: &CancelToken,
    ) -> Result<DependencyManifest, BackendError> {
        let root = self.locate().map_err(|_| BackendError::NotInstalled {
            tool: "vcpkg".to_string(),
        })?;
        if ws.declaration_file(self.id()).is_none() {
            return Err(BackendError::DeclarationMissing {
                expected: VCPKG.declaration_files.to_vec(),
            });
        }

        let platform = request.platform();
        let triplet = resolve_triplet(&self.config, platform).ok_or_else(|| {
            BackendError::resolution_failed(format!(
                "no vcpkg triplet known for {}; set `vcpkg.triplet`",
                platform
            ))
        })?;
        check_cancel(cancel)?;

        let install_root = self.install_root(ws);
        let cmd = ProcessBuilder::new(root.binary())
            .arg("install")
            .arg("--triplet")
            .arg(&triplet)
            .arg("--x-manifest-root")
            .arg(ws.root())
            .arg("--x-install-root")
            .arg(&install_root)
            .env("VCPKG_ROOT", root.path.display().to_string())
            .cwd(ws.root());

        tracing::info!("running {}", cmd.display_command());
        let output = cmd.exec_with_cancel(cancel)?;

        if !output.status.success() {
            return Err(classify_tool_failure(tool_diagnostic(&output)));
        }

        let status_path = install_root.join("vcpkg").join("status");
        let status = std::fs::read_to_string(&status_path)
            .map_err(|e| BackendError::io(format!("failed to read {}", status_path.display()), e))?;

        let location = install_root.join(&triplet);
        let mut manifest = DependencyManifest::new(self.id(), platform.clone());
        for entry in parse_status(&status) {
            if entry.architecture == triplet {
                manifest.insert(entry.name, entry.version, &location);
            }
        }
        Ok(manifest)
    }
}

fn read_declaration_identity(path: &Path) -> Result<DeclarationIdentity, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let identity: DeclarationIdentity = serde_json::from_str(&content)
        .map_err(|e| format!("invalid {}: {}", path.display(), e))?;
    if let Some(name) = &identity.name {
        tracing::debug!("vcpkg.json declares `{}`", name);
    }
    Ok(identity)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StatusEntry {
    name: String,
    version: String,
    architecture: String,
}

/// Parse the installed packages out of a vcpkg `status` database.
///
/// The file is a sequence of blank-line separated control paragraphs. Feature
/// paragraphs, removed packages and continuation lines are skipped. A later
/// paragraph for the same package and architecture replaces an earlier one.
fn parse_status(content: &str) -> Vec<StatusEntry> {
    let mut entries: Vec<StatusEntry> = Vec::new();

    for paragraph in content.split("\n\n") {
        let mut package = None;
        let mut version = None;
        let mut port_version = None;
        let mut architecture = None;
        let mut status = None;
        let mut is_feature = false;

        for line in paragraph.lines() {
            if line.starts_with(char::is_whitespace) {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key {
                "Package" => package = Some(value),
                "Version" => version = Some(value),
                "Port-Version" => port_version = Some(value),
                "Architecture" => architecture = Some(value),
                "Status" => status = Some(value),
                "Feature" => is_feature = true,
                _ => {}
            }
        }

        if is_feature || status != Some("install ok installed") {
            continue;
        }
        let (Some(name), Some(version), Some(architecture)) = (package, version, architecture)
        else {
            continue;
        };

        let version = match port_version {
            Some(pv) if pv != "0" && !pv.is_empty() => format!("{}#{}", version, pv),
            _ => version.to_string(),
        };

        let entry = StatusEntry {
            name: name.to_string(),
            version,
            architecture: architecture.to_string(),
        };
        match entries
            .iter_mut()
            .find(|e| e.name == entry.name && e.architecture == entry.architecture)
        {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    entries
}
