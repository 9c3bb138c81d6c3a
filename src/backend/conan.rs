//! Conan 2 adapter (binary-centric backend).
//!
//! Runs `conan install` against the project's conanfile and reads the
//! installed dependency graph from its JSON output.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::backend::{
    check_cancel, classify_tool_failure, tool_diagnostic, AvailabilityReport, Backend,
    BackendError, UnavailableReason,
};
use crate::core::backend_id::CONAN;
use crate::core::request::parse_version_lenient;
use crate::core::{
    BackendIdentity, DependencyManifest, ResolutionRequest, TargetTriple, Workspace,
};
use crate::util::cancel::CancelToken;
use crate::util::config::ConanConfig;
use crate::util::process::{find_executable, ProcessBuilder};

/// Oldest Conan release whose CLI and JSON graph format we understand.
const MIN_CONAN_MAJOR: u64 = 2;

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ConanBackend {
    config: ConanConfig,
}

impl ConanBackend {
    pub fn new(config: ConanConfig) -> Self {
        ConanBackend { config }
    }

    /// Locate the conan executable: configured path first, then PATH.
    fn executable(&self) -> Result<PathBuf, UnavailableReason> {
        match &self.config.path {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(UnavailableReason::NotInstalled {
                tool: "conan".to_string(),
                install_hint: format!("configured `conan.path` {} does not exist.", path.display()),
            }),
            None => find_executable("conan").ok_or_else(|| UnavailableReason::NotInstalled {
                tool: "conan".to_string(),
                install_hint: install_hint(),
            }),
        }
    }

    fn install_args(
        &self,
        ws: &Workspace,
        platform: &TargetTriple,
        output_folder: &std::path::Path,
    ) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            ws.root().display().to_string(),
            "--output-folder".to_string(),
            output_folder.display().to_string(),
            "--build=missing".to_string(),
            "--format=json".to_string(),
        ];

        if let Some(os) = conan_os(platform) {
            args.push("-s".to_string());
            args.push(format!("os={}", os));
        }
        if let Some(arch) = conan_arch(platform) {
            args.push("-s".to_string());
            args.push(format!("arch={}", arch));
        }
        if let Some(profile) = &self.config.profile {
            args.push("--profile:host".to_string());
            args.push(profile.clone());
        }

        args
    }
}

impl Backend for ConanBackend {
    fn identity(&self) -> &'static BackendIdentity {
        &CONAN
    }

    fn detect(&self, ws: &Workspace) -> AvailabilityReport {
        let exe = match self.executable() {
            Ok(exe) => exe,
            Err(reason) => return AvailabilityReport::unavailable(self.id(), reason),
        };

        if ws.declaration_file(self.id()).is_none() {
            return AvailabilityReport::unavailable(
                self.id(),
                UnavailableReason::DeclarationMissing {
                    expected: CONAN.declaration_files.to_vec(),
                },
            );
        }

        let probe = CancelToken::new().with_timeout(PROBE_TIMEOUT);
        let output = match ProcessBuilder::new(&exe).arg("--version").exec_with_cancel(&probe) {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                return AvailabilityReport::unavailable(
                    self.id(),
                    UnavailableReason::ProbeFailed {
                        message: format!("`conan --version` failed: {}", tool_diagnostic(&output)),
                    },
                )
            }
            Err(e) => {
                return AvailabilityReport::unavailable(
                    self.id(),
                    UnavailableReason::ProbeFailed {
                        message: e.to_string(),
                    },
                )
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_conan_version(&stdout) {
            Some(version) if version.major >= MIN_CONAN_MAJOR => {
                tracing::debug!("conan {} at {}", version, exe.display());
                AvailabilityReport::available(self.id(), Some(version.to_string()))
            }
            Some(version) => AvailabilityReport::unavailable(
                self.id(),
                UnavailableReason::VersionTooOld {
                    found: version.to_string(),
                    required: format!(">={}.0.0", MIN_CONAN_MAJOR),
                },
            ),
            None => AvailabilityReport::unavailable(
                self.id(),
                UnavailableReason::ProbeFailed {
                    message: format!("could not parse conan version from `{}`", stdout.trim()),
                },
            ),
        }
    }

    fn resolve(
        &self,
        ws: &Workspace,
        request: &ResolutionRequest,
        cancel: &CancelToken,
    ) -> Result<DependencyManifest, BackendError> {
        // Detection may be stale by the time we run.
        let exe = self.executable().map_err(|_| BackendError::NotInstalled {
            tool: "conan".to_string(),
        })?;
        if ws.declaration_file(self.id()).is_none() {
            return Err(BackendError::DeclarationMissing {
                expected: CONAN.declaration_files.to_vec(),
            });
        }
        check_cancel(cancel)?;

        let platform = request.platform();
        let output_folder = ws.install_dir(self.id(), platform);
        let args = self.install_args(ws, platform, &output_folder);
        let cmd = ProcessBuilder::new(&exe).args(&args).cwd(ws.root());

        tracing::info!("running {}", cmd.display_command());
        let output = cmd.exec_with_cancel(cancel)?;

        if !output.status.success() {
            return Err(classify_tool_failure(tool_diagnostic(&output)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let packages = parse_install_graph(&stdout)?;

        let mut manifest = DependencyManifest::new(self.id(), platform.clone());
        for pkg in packages {
            manifest.insert(pkg.name, pkg.version, pkg.location);
        }
        Ok(manifest)
    }
}

/// Parse "Conan version 2.3.0".
fn parse_conan_version(stdout: &str) -> Option<semver::Version> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Conan version "))
        .and_then(parse_version_lenient)
}

fn conan_os(platform: &TargetTriple) -> Option<&'static str> {
    match platform.normalized_os() {
        "linux" => Some("Linux"),
        "windows" => Some("Windows"),
        "macos" => Some("Macos"),
        "freebsd" => Some("FreeBSD"),
        "android" => Some("Android"),
        _ => None,
    }
}

fn conan_arch(platform: &TargetTriple) -> Option<&'static str> {
    match platform.arch.as_str() {
        "x86_64" => Some("x86_64"),
        "x86" | "i686" | "i386" => Some("x86"),
        "aarch64" => Some("armv8"),
        "arm" | "armv7" => Some("armv7"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct InstallOutput {
    graph: Graph,
}

#[derive(Debug, Deserialize)]
struct Graph {
    nodes: BTreeMap<String, GraphNode>,
}

#[derive(Debug, Deserialize)]
struct GraphNode {
    #[serde(rename = "ref", default)]
    reference: String,
    #[serde(default)]
    recipe: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    package_folder: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
struct InstalledNode {
    name: String,
    version: String,
    location: PathBuf,
}

/// Extract host-context packages from `conan install --format=json` output.
fn parse_install_graph(json: &str) -> Result<Vec<InstalledNode>, BackendError> {
    let output: InstallOutput = serde_json::from_str(json).map_err(|e| {
        BackendError::resolution_failed(format!("unreadable conan graph output: {}", e))
    })?;

    let mut packages = Vec::new();
    for (id, node) in output.graph.nodes {
        let is_consumer = id == "0"
            || matches!(node.recipe.as_deref(), Some("Consumer") | Some("Cli"));
        if is_consumer || node.context.as_deref() == Some("build") {
            continue;
        }

        let Some((name, version)) = parse_reference(&node.reference) else {
            tracing::debug!("skipping conan node {} with reference `{}`", id, node.reference);
            continue;
        };

        packages.push(InstalledNode {
            name: name.to_string(),
            version: version.to_string(),
            location: node.package_folder.unwrap_or_default(),
        });
    }

    packages.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(packages)
}

/// Split `name/version[@user/channel][#revision]`.
fn parse_reference(reference: &str) -> Option<(&str, &str)> {
    let reference = reference.split('#').next()?;
    let reference = reference.split('@').next()?;
    let (name, version) = reference.split_once('/')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name, version))
}

fn install_hint() -> String {
    #[cfg(target_os = "macos")]
    {
        "Install Conan 2: brew install conan or pip install conan".to_string()
    }
    #[cfg(not(target_os = "macos"))]
    {
        "Install Conan 2: pip install conan".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Manifest;
    use tempfile::TempDir;

    const GRAPH: &str = r#"{
  "graph": {
    "nodes": {
      "0": {
        "ref": "conanfile",
        "id": "0",
        "recipe": "Consumer",
        "context": "host",
        "package_folder": null
      },
      "1": {
        "ref": "fmt/10.2.1#9f2f0ba8f5c2f16b",
        "id": "1",
        "recipe": "Cache",
        "context": "host",
        "package_folder": "/home/ci/.conan2/p/b/fmt1a/p"
      },
      "2": {
        "ref": "zlib/1.3.1@acme/stable#0a2f",
        "id": "2",
        "recipe": "Downloaded",
        "context": "host",
        "package_folder": "/home/ci/.conan2/p/b/zlib2b/p"
      },
      "3": {
        "ref": "cmake/3.28.1",
        "id": "3",
        "recipe": "Cache",
        "context": "build",
        "package_folder": "/home/ci/.conan2/p/b/cmake3c/p"
      }
    }
  }
}"#;

    #[test]
    fn test_parse_install_graph() {
        let packages = parse_install_graph(GRAPH).unwrap();
        assert_eq!(
            packages,
            vec![
                InstalledNode {
                    name: "fmt".to_string(),
                    version: "10.2.1".to_string(),
                    location: PathBuf::from("/home/ci/.conan2/p/b/fmt1a/p"),
                },
                InstalledNode {
                    name: "zlib".to_string(),
                    version: "1.3.1".to_string(),
                    location: PathBuf::from("/home/ci/.conan2/p/b/zlib2b/p"),
                },
            ]
        );
    }

    #[test]
    fn test_parse_install_graph_rejects_garbage() {
        let err = parse_install_graph("ERROR: no conanfile").unwrap_err();
        assert_eq!(err.kind(), "resolution-failed");
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("fmt/10.2.1"), Some(("fmt", "10.2.1")));
        assert_eq!(
            parse_reference("boost/1.84.0@user/channel#rev"),
            Some(("boost", "1.84.0"))
        );
        assert_eq!(parse_reference("conanfile"), None);
    }

    #[test]
    fn test_parse_conan_version() {
        let v = parse_conan_version("Conan version 2.3.0\n").unwrap();
        assert_eq!(v, semver::Version::new(2, 3, 0));
        assert!(parse_conan_version("conan 1.x").is_none());
    }

    #[test]
    fn test_install_args() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::from_parts(
            tmp.path().to_path_buf(),
            Manifest {
                name: "app".to_string(),
                version: None,
                dependencies: Vec::new(),
            },
        );
        let backend = ConanBackend::new(ConanConfig {
            path: None,
            profile: Some("ci".to_string()),
        });
        let platform = TargetTriple::parse("aarch64-apple-darwin").unwrap();
        let out = ws.install_dir(backend.id(), &platform);

        let args = backend.install_args(&ws, &platform, &out);
        assert_eq!(args[0], "install");
        assert!(args.contains(&"--build=missing".to_string()));
        assert!(args.contains(&"os=Macos".to_string()));
        assert!(args.contains(&"arch=armv8".to_string()));
        assert_eq!(args[args.len() - 2..], ["--profile:host", "ci"]);
    }

    #[test]
    fn test_missing_configured_path_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::from_parts(
            tmp.path().to_path_buf(),
            Manifest {
                name: "app".to_string(),
                version: None,
                dependencies: Vec::new(),
            },
        );
        let backend = ConanBackend::new(ConanConfig {
            path: Some(tmp.path().join("no-such-conan")),
            profile: None,
        });

        let report = backend.detect(&ws);
        assert!(!report.usable());
        assert!(report.reason().unwrap().contains("conan.path"));
    }
}
