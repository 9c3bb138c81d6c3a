//! vcpkg discovery helpers.
//!
//! Locates a vcpkg installation and picks the triplet to install for. Both
//! are pure lookups: nothing here runs vcpkg or touches the network.

use std::path::{Path, PathBuf};

use crate::core::TargetTriple;
use crate::util::config::VcpkgConfig;

/// Where a vcpkg root came from, for availability reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSource {
    Config,
    Env,
    Path,
    WindowsIntegration,
}

impl RootSource {
    pub fn describe(&self) -> &'static str {
        match self {
            RootSource::Config => "vcpkg.root",
            RootSource::Env => "VCPKG_ROOT",
            RootSource::Path => "PATH",
            RootSource::WindowsIntegration => "vcpkg integrate install",
        }
    }
}

/// A located vcpkg root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcpkgRoot {
    pub path: PathBuf,
    pub source: RootSource,
}

impl VcpkgRoot {
    /// Path to the vcpkg executable inside the root.
    pub fn binary(&self) -> PathBuf {
        self.path.join(vcpkg_exe())
    }
}

fn vcpkg_exe() -> &'static str {
    if cfg!(windows) {
        "vcpkg.exe"
    } else {
        "vcpkg"
    }
}

/// Resolve the vcpkg root.
///
/// Priority: config file > `VCPKG_ROOT` > auto-detection. An explicitly
/// configured root is returned even if invalid so the caller can say so.
pub fn resolve_root(config: &VcpkgConfig) -> Option<VcpkgRoot> {
    if let Some(path) = &config.root {
        return Some(VcpkgRoot {
            path: path.clone(),
            source: RootSource::Config,
        });
    }

    if let Some(path) = std::env::var_os("VCPKG_ROOT").filter(|v| !v.is_empty()) {
        return Some(VcpkgRoot {
            path: PathBuf::from(path),
            source: RootSource::Env,
        });
    }

    detect_vcpkg_root()
}

/// Auto-detect vcpkg root:
/// 1. Windows: `vcpkg integrate install` leaves a targets file in LOCALAPPDATA
/// 2. Find vcpkg in PATH and derive root from binary location
fn detect_vcpkg_root() -> Option<VcpkgRoot> {
    if let Some(path) = detect_from_windows_integration() {
        return Some(VcpkgRoot {
            path,
            source: RootSource::WindowsIntegration,
        });
    }

    detect_from_path().map(|path| VcpkgRoot {
        path,
        source: RootSource::Path,
    })
}

#[cfg(windows)]
fn detect_from_windows_integration() -> Option<PathBuf> {
    let local_app_data = std::env::var_os("LOCALAPPDATA")?;
    let targets_file = PathBuf::from(&local_app_data)
        .join("vcpkg")
        .join("vcpkg.user.targets");

    let content = std::fs::read_to_string(&targets_file).ok()?;

    // <Import Project="C:\vcpkg\scripts\buildsystems\msbuild\vcpkg.targets" ... />
    for line in content.lines() {
        let Some(start) = line.find("Project=\"") else {
            continue;
        };
        let rest = &line[start + 9..];
        let Some(end) = rest.find('"') else {
            continue;
        };
        let root = Path::new(&rest[..end]).ancestors().nth(4)?;
        if is_valid_vcpkg_root(root) {
            tracing::debug!("found vcpkg via Windows integration: {}", root.display());
            return Some(root.to_path_buf());
        }
    }

    None
}

#[cfg(not(windows))]
fn detect_from_windows_integration() -> Option<PathBuf> {
    None
}

/// Find vcpkg in PATH; the binary sits at `<root>/vcpkg[.exe]`.
fn detect_from_path() -> Option<PathBuf> {
    let vcpkg_path = which::which(vcpkg_exe()).ok()?;
    let vcpkg_path = vcpkg_path.canonicalize().unwrap_or(vcpkg_path);
    let root = vcpkg_path.parent()?;

    if is_valid_vcpkg_root(root) {
        tracing::debug!("found vcpkg in PATH: {}", root.display());
        return Some(root.to_path_buf());
    }

    None
}

/// Validate that a directory is a vcpkg root.
pub fn is_valid_vcpkg_root(path: &Path) -> bool {
    // Created by the bootstrap script.
    if path.join(".vcpkg-root").exists() {
        return true;
    }

    path.join(vcpkg_exe()).exists() && path.join("scripts").is_dir()
}

/// Pick the vcpkg triplet for a target.
///
/// Priority: config file > `VCPKG_DEFAULT_TRIPLET` > inferred from the triple.
pub fn resolve_triplet(config: &VcpkgConfig, target: &TargetTriple) -> Option<String> {
    config
        .triplet
        .clone()
        .or_else(|| {
            std::env::var("VCPKG_DEFAULT_TRIPLET")
                .ok()
                .filter(|t| !t.is_empty())
        })
        .or_else(|| infer_triplet(target))
}

pub fn infer_triplet(target: &TargetTriple) -> Option<String> {
    let arch = match target.arch.as_str() {
        "x86_64" => "x64",
        "x86" | "i686" | "i386" => "x86",
        "aarch64" => "arm64",
        "arm" => "arm",
        _ => return None,
    };

    let os = match target.normalized_os() {
        "windows" => "windows",
        "linux" => "linux",
        "macos" => "osx",
        _ => return None,
    };

    Some(format!("{}-{}", arch, os))
}
