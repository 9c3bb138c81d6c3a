//! Lock reconciliation: drift against the previous lock of the same backend,
//! and divergence between the locks of different backends.
//!
//! Nothing here can fail a resolution. Every problem becomes a
//! [`LockWarning`] and the newest lock is still written.

use std::fmt;
use std::path::PathBuf;

use crate::backend::Backend;
use crate::core::request::strip_port_version;
use crate::core::{BackendId, DependencyManifest, Workspace};
use crate::lock::record::{LockFileError, LockRecord, LockedPackage};
use crate::lock::store::{read_lock, write_lock};
use crate::util::diagnostic::{suggestions, Diagnostic};

/// How one dependency differs between two locked sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChange {
    pub name: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl fmt::Display for PackageChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.before, &self.after) {
            (Some(before), Some(after)) => write!(f, "{} {} -> {}", self.name, before, after),
            (None, Some(after)) => write!(f, "{} added ({})", self.name, after),
            (Some(before), None) => write!(f, "{} removed ({})", self.name, before),
            (None, None) => write!(f, "{}", self.name),
        }
    }
}

/// Non-fatal findings of lock reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockWarning {
    /// The backend's previous lock no longer matches what it just resolved.
    Drift {
        backend: BackendId,
        path: PathBuf,
        changes: Vec<PackageChange>,
    },

    /// Another backend's lock pins a shared dependency at a different version.
    Divergence {
        backend: BackendId,
        other: BackendId,
        changes: Vec<PackageChange>,
    },

    /// An existing lock file could not be read or validated.
    LockUnreadable { path: PathBuf, message: String },

    /// The new lock could not be written.
    LockPersistFailed { path: PathBuf, message: String },
}

impl LockWarning {
    pub fn is_drift(&self) -> bool {
        matches!(self, LockWarning::Drift { .. })
    }

    pub fn is_divergence(&self) -> bool {
        matches!(self, LockWarning::Divergence { .. })
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::warning(self.to_string());
        match self {
            LockWarning::Drift { path, changes, .. } => changes
                .iter()
                .fold(diag.with_location(path), |d, c| d.with_context(c.to_string())),
            LockWarning::Divergence { changes, .. } => changes
                .iter()
                .fold(diag, |d, c| d.with_context(c.to_string()))
                .with_suggestion(suggestions::DIVERGENCE),
            LockWarning::LockUnreadable { path, message }
            | LockWarning::LockPersistFailed { path, message } => {
                diag.with_location(path).with_context(message.clone())
            }
        }
    }
}

impl fmt::Display for LockWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockWarning::Drift {
                backend, changes, ..
            } => write!(
                f,
                "lock drift detected for `{}` ({} change{})",
                backend,
                changes.len(),
                if changes.len() == 1 { "" } else { "s" }
            ),
            LockWarning::Divergence {
                backend, other, ..
            } => write!(f, "locks for `{}` and `{}` diverge", backend, other),
            LockWarning::LockUnreadable { path, .. } => {
                write!(f, "ignoring unreadable lock file {}", path.display())
            }
            LockWarning::LockPersistFailed { path, .. } => {
                write!(f, "failed to write lock file {}", path.display())
            }
        }
    }
}

/// Every difference between two sorted package lists.
pub fn diff_packages(before: &[LockedPackage], after: &[LockedPackage]) -> Vec<PackageChange> {
    let mut changes = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < before.len() || j < after.len() {
        let order = match (before.get(i), after.get(j)) {
            (Some(b), Some(a)) => b.name.cmp(&a.name),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, _) => std::cmp::Ordering::Greater,
        };

        match order {
            std::cmp::Ordering::Less => {
                changes.push(PackageChange {
                    name: before[i].name.clone(),
                    before: Some(before[i].version.clone()),
                    after: None,
                });
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                changes.push(PackageChange {
                    name: after[j].name.clone(),
                    before: None,
                    after: Some(after[j].version.clone()),
                });
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                if before[i].version != after[j].version {
                    changes.push(PackageChange {
                        name: before[i].name.clone(),
                        before: Some(before[i].version.clone()),
                        after: Some(after[j].version.clone()),
                    });
                }
                i += 1;
                j += 1;
            }
        }
    }

    changes
}

/// Dependencies locked by both records at different versions.
///
/// Names present in only one lock are not divergence: backends may
/// legitimately install different transitive sets. A vcpkg port revision
/// (`#n`) is not a different upstream version.
pub fn divergent_versions(a: &LockRecord, b: &LockRecord) -> Vec<PackageChange> {
    a.packages
        .iter()
        .filter_map(|pkg| {
            let other = b.version_of(&pkg.name)?;
            (strip_port_version(&pkg.version) != strip_port_version(other)).then(|| PackageChange {
                name: pkg.name.clone(),
                before: Some(other.to_string()),
                after: Some(pkg.version.clone()),
            })
        })
        .collect()
}

/// What reconciliation did for one successful resolution.
#[derive(Debug, Clone)]
pub struct LockReport {
    /// The record that now describes the resolution
    pub record: LockRecord,
    /// Whether the lock file was (re)written
    pub written: bool,
    pub warnings: Vec<LockWarning>,
}

/// Persist and cross-check the lock for a successful resolution.
pub fn reconcile(ws: &Workspace, backend: &dyn Backend, manifest: &DependencyManifest) -> LockReport {
    let id = backend.id();
    let path = ws.lock_path(id);
    let record = backend.emit_lock(manifest);
    let mut warnings = Vec::new();
    let mut unchanged = false;

    match read_lock(&path) {
        Ok(Some(previous)) => {
            if !backend.verify_lock(&previous, manifest) {
                let changes = diff_packages(&previous.packages, &record.packages);
                tracing::debug!("lock drift for {}: {} change(s)", id, changes.len());
                warnings.push(LockWarning::Drift {
                    backend: id,
                    path: path.clone(),
                    changes,
                });
            }
            unchanged = previous.same_content(&record);
        }
        Ok(None) => {}
        Err(LockFileError::HashMismatch { packages, .. }) => {
            tracing::debug!("{} was edited by hand", path.display());
            warnings.push(LockWarning::Drift {
                backend: id,
                path: path.clone(),
                changes: diff_packages(&packages, &record.packages),
            });
        }
        Err(e) => {
            tracing::debug!("{}", e);
            warnings.push(LockWarning::LockUnreadable {
                path: path.clone(),
                message: e.to_string(),
            });
        }
    }

    let written = if unchanged {
        tracing::debug!("{} unchanged", path.display());
        false
    } else {
        match write_lock(&path, &record) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("{}", e);
                warnings.push(LockWarning::LockPersistFailed {
                    path: path.clone(),
                    message: e.to_string(),
                });
                false
            }
        }
    };

    warnings.extend(cross_check_against(ws, &record));

    LockReport {
        record,
        written,
        warnings,
    }
}

/// Compare `record` against the stored locks of every other backend.
fn cross_check_against(ws: &Workspace, record: &LockRecord) -> Vec<LockWarning> {
    let mut warnings = Vec::new();

    for other in BackendId::ALL.into_iter().filter(|o| *o != record.backend) {
        let path = ws.lock_path(other);
        match read_lock(&path) {
            Ok(Some(theirs)) => {
                let changes = divergent_versions(record, &theirs);
                if !changes.is_empty() {
                    tracing::debug!("locks for {} and {} diverge", record.backend, other);
                    warnings.push(LockWarning::Divergence {
                        backend: record.backend,
                        other,
                        changes,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => warnings.push(LockWarning::LockUnreadable {
                path,
                message: e.to_string(),
            }),
        }
    }

    warnings
}

/// Cross-check every stored lock pairwise, without resolving.
///
/// Returns the locks found (in rank order) and the warnings.
pub fn cross_check(ws: &Workspace) -> (Vec<LockRecord>, Vec<LockWarning>) {
    let mut records = Vec::new();
    let mut warnings = Vec::new();

    for id in BackendId::ALL {
        let path = ws.lock_path(id);
        match read_lock(&path) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => warnings.push(LockWarning::LockUnreadable {
                path,
                message: e.to_string(),
            }),
        }
    }

    for (i, a) in records.iter().enumerate() {
        for b in &records[i + 1..] {
            let changes = divergent_versions(a, b);
            if !changes.is_empty() {
                warnings.push(LockWarning::Divergence {
                    backend: a.backend,
                    other: b.backend,
                    changes,
                });
            }
        }
    }

    (records, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Manifest, TargetTriple};
    use crate::test_support::MockBackend;
    use tempfile::TempDir;

    fn workspace(dir: &std::path::Path) -> Workspace {
        Workspace::from_parts(
            dir.to_path_buf(),
            Manifest {
                name: "app".to_string(),
                version: None,
                dependencies: Vec::new(),
            },
        )
    }

    fn manifest(backend: BackendId, pairs: &[(&str, &str)]) -> DependencyManifest {
        let mut m = DependencyManifest::new(backend, TargetTriple::host());
        for (name, version) in pairs {
            m.insert(*name, *version, "/p");
        }
        m
    }

    fn pkgs(pairs: &[(&str, &str)]) -> Vec<LockedPackage> {
        pairs
            .iter()
            .map(|(n, v)| LockedPackage {
                name: n.to_string(),
                version: v.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_diff_packages() {
        let before = pkgs(&[("fmt", "10.1.0"), ("spdlog", "1.12.0"), ("zlib", "1.3.1")]);
        let after = pkgs(&[("boost", "1.84.0"), ("fmt", "10.2.1"), ("zlib", "1.3.1")]);

        let rendered: Vec<String> = diff_packages(&before, &after)
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "boost added (1.84.0)",
                "fmt 10.1.0 -> 10.2.1",
                "spdlog removed (1.12.0)",
            ]
        );
    }

    #[test]
    fn test_first_resolution_writes_lock() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace(tmp.path());
        let backend = MockBackend::available(BackendId::Conan);

        let report = reconcile(&ws, &backend, &manifest(BackendId::Conan, &[("fmt", "10.2.1")]));
        assert!(report.written);
        assert!(report.warnings.is_empty());
        assert!(ws.lock_path(BackendId::Conan).is_file());
    }

    #[test]
    fn test_identical_resolution_leaves_file_alone() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace(tmp.path());
        let backend = MockBackend::available(BackendId::Conan);
        let m = manifest(BackendId::Conan, &[("fmt", "10.2.1")]);

        let first = reconcile(&ws, &backend, &m);
        let before = std::fs::read_to_string(ws.lock_path(BackendId::Conan)).unwrap();
        let second = reconcile(&ws, &backend, &m);
        let after = std::fs::read_to_string(ws.lock_path(BackendId::Conan)).unwrap();

        assert!(!second.written);
        assert!(second.warnings.is_empty());
        assert_eq!(first.record.content_hash, second.record.content_hash);
        assert_eq!(before, after);
    }

    #[test]
    fn test_drift_is_one_warning_and_still_written() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace(tmp.path());
        let backend = MockBackend::available(BackendId::Vcpkg);

        reconcile(
            &ws,
            &backend,
            &manifest(BackendId::Vcpkg, &[("fmt", "10.1.0"), ("zlib", "1.3.1")]),
        );
        let report = reconcile(
            &ws,
            &backend,
            &manifest(BackendId::Vcpkg, &[("fmt", "10.2.1"), ("zlib", "1.3.2")]),
        );

        let drift: Vec<_> = report.warnings.iter().filter(|w| w.is_drift()).collect();
        assert_eq!(drift.len(), 1);
        assert!(report.written);

        let stored = read_lock(&ws.lock_path(BackendId::Vcpkg)).unwrap().unwrap();
        assert_eq!(stored.version_of("fmt"), Some("10.2.1"));
    }

    #[test]
    fn test_unreadable_lock_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace(tmp.path());
        std::fs::write(ws.lock_path(BackendId::Fetch), "garbage = [").unwrap();
        let backend = MockBackend::available(BackendId::Fetch);

        let report = reconcile(&ws, &backend, &manifest(BackendId::Fetch, &[("stb", "1.0.0")]));
        assert!(report.written);
        assert!(matches!(
            report.warnings.as_slice(),
            [LockWarning::LockUnreadable { .. }]
        ));
        assert!(read_lock(&ws.lock_path(BackendId::Fetch)).unwrap().is_some());
    }

    #[test]
    fn test_hand_edited_lock_is_drift() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace(tmp.path());
        let backend = MockBackend::available(BackendId::Conan);
        let m = manifest(BackendId::Conan, &[("fmt", "10.2.1")]);
        let path = ws.lock_path(BackendId::Conan);

        reconcile(&ws, &backend, &m);
        let edited = std::fs::read_to_string(&path)
            .unwrap()
            .replace("10.2.1", "9.0.0");
        std::fs::write(&path, edited).unwrap();

        let report = reconcile(&ws, &backend, &m);
        match report.warnings.as_slice() {
            [LockWarning::Drift { changes, .. }] => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].to_string(), "fmt 9.0.0 -> 10.2.1");
            }
            other => panic!("expected one drift warning, got {:?}", other),
        }
        assert!(report.written);
        assert_eq!(
            read_lock(&path).unwrap().unwrap().version_of("fmt"),
            Some("10.2.1")
        );
    }

    #[test]
    fn test_divergence_between_backends() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace(tmp.path());

        reconcile(
            &ws,
            &MockBackend::available(BackendId::Conan),
            &manifest(BackendId::Conan, &[("fmt", "10.2.1"), ("zlib", "1.3.1")]),
        );
        let report = reconcile(
            &ws,
            &MockBackend::available(BackendId::Vcpkg),
            &manifest(
                BackendId::Vcpkg,
                &[("fmt", "10.1.0"), ("zlib", "1.3.1#2"), ("vcpkg-cmake", "2024-04-23")],
            ),
        );

        let divergence: Vec<_> = report
            .warnings
            .iter()
            .filter_map(|w| match w {
                LockWarning::Divergence { other, changes, .. } => Some((*other, changes.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(divergence.len(), 1);
        assert_eq!(divergence[0].0, BackendId::Conan);
        assert_eq!(divergence[0].1.len(), 1);
        assert_eq!(divergence[0].1[0].name, "fmt");

        let (records, warnings) = cross_check(&ws);
        assert_eq!(records.len(), 2);
        assert_eq!(warnings.iter().filter(|w| w.is_divergence()).count(), 1);
    }

    #[test]
    fn test_warning_diagnostics() {
        let warning = LockWarning::Drift {
            backend: BackendId::Conan,
            path: PathBuf::from("Mooring.conan.lock"),
            changes: vec![PackageChange {
                name: "fmt".to_string(),
                before: Some("10.1.0".to_string()),
                after: Some("10.2.1".to_string()),
            }],
        };
        let text = warning.to_diagnostic().format(false);
        assert!(text.starts_with("warning: lock drift detected for `conan` (1 change)"));
        assert!(text.contains("fmt 10.1.0 -> 10.2.1"));
    }
}
