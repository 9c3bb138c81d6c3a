//! Mooring.toml manifest parsing.
//!
//! The manifest names the project and lists the dependencies every backend
//! is expected to provide. Backend-specific declaration files
//! (`conanfile.txt`, `vcpkg.json`, `headers.toml`) stay owned by their tools.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use miette::Diagnostic as MietteDiagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::core::DependencyRequirement;

/// Canonical manifest file name.
pub const MANIFEST_NAME: &str = "Mooring.toml";

/// Errors locating or parsing a manifest.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ManifestError {
    #[error("could not find `Mooring.toml` in `{}` or any parent directory", .dir.display())]
    #[diagnostic(
        code(mooring::manifest::not_found),
        help("create a Mooring.toml with a [package] section and your [dependencies]")
    )]
    NotFound { dir: PathBuf },

    #[error("failed to read manifest `{}`", .path.display())]
    #[diagnostic(code(mooring::manifest::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest `{}`: {message}", .path.display())]
    #[diagnostic(code(mooring::manifest::parse))]
    Parse { path: PathBuf, message: String },

    #[error("invalid dependency name `{name}` in `{}`", .path.display())]
    #[diagnostic(
        code(mooring::manifest::invalid_name),
        help("dependency names may only contain letters, digits, `_`, `.`, `+` and `-`")
    )]
    InvalidDependencyName { path: PathBuf, name: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    package: RawPackage,
    #[serde(default)]
    dependencies: BTreeMap<String, RawDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPackage {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Simple(String),
    Detailed {
        #[serde(default)]
        version: Option<String>,
    },
}

impl RawDependency {
    fn constraint(&self) -> &str {
        match self {
            RawDependency::Simple(v) => v,
            RawDependency::Detailed { version } => version.as_deref().unwrap_or("*"),
        }
    }
}

/// A parsed project manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Project name
    pub name: String,

    /// Project version, informational only
    pub version: Option<String>,

    /// Requested dependencies, in name order
    pub dependencies: Vec<DependencyRequirement>,
}

impl Manifest {
    /// Load a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content, path)
    }

    /// Parse manifest content.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ManifestError> {
        let raw: RawManifest = toml::from_str(content).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;

        let dependencies = raw
            .dependencies
            .iter()
            .map(|(name, dep)| {
                if !is_valid_dependency_name(name) {
                    return Err(ManifestError::InvalidDependencyName {
                        path: path.to_path_buf(),
                        name: name.clone(),
                    });
                }
                Ok(DependencyRequirement::new(name.clone(), dep.constraint()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Manifest {
            name: raw.package.name,
            version: raw.package.version,
            dependencies,
        })
    }
}

fn is_valid_dependency_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'))
}

/// Find the manifest in `dir` (no upward search).
pub fn find_manifest(dir: &Path) -> Result<PathBuf, ManifestError> {
    let candidate = dir.join(MANIFEST_NAME);
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(ManifestError::NotFound {
            dir: dir.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VersionConstraint;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(
            r#"
[package]
name = "app"
version = "0.1.0"

[dependencies]
fmt = "^10"
zlib = { version = "1.3.1" }
spdlog = {}
"#,
            Path::new("Mooring.toml"),
        )
        .unwrap();

        assert_eq!(manifest.name, "app");
        assert_eq!(manifest.dependencies.len(), 3);
        assert_eq!(manifest.dependencies[0].name, "fmt");
        assert_eq!(manifest.dependencies[1].name, "spdlog");
        assert_eq!(manifest.dependencies[1].constraint, VersionConstraint::Any);
        assert!(manifest.dependencies[2].constraint.matches("1.3.1"));
    }

    #[test]
    fn test_missing_package_section() {
        let err = Manifest::parse("[dependencies]\nfmt = \"*\"\n", Path::new("Mooring.toml"))
            .unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn test_invalid_dependency_name() {
        let err = Manifest::parse(
            "[package]\nname = \"app\"\n[dependencies]\n\"bad name\" = \"*\"\n",
            Path::new("Mooring.toml"),
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidDependencyName { .. }));
    }

    #[test]
    fn test_find_manifest() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            find_manifest(tmp.path()),
            Err(ManifestError::NotFound { .. })
        ));

        std::fs::write(tmp.path().join(MANIFEST_NAME), "[package]\nname = \"x\"\n").unwrap();
        assert!(find_manifest(tmp.path()).is_ok());
    }
}
