//! Header-only fetcher (lowest-ranked backend).
//!
//! Each dependency maps to a git repository in `headers.toml`. The fetcher
//! lists the remote's tags, picks the highest one that satisfies the
//! requested constraint and checks it out under `.mooring/fetch/`. It runs
//! entirely in-process through libgit2, so it is installed everywhere.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use git2::{build::RepoBuilder, ErrorClass, FetchOptions, RemoteCallbacks, Repository, ResetType};
use serde::Deserialize;
use url::Url;

use crate::backend::{check_cancel, AvailabilityReport, Backend, BackendError, UnavailableReason};
use crate::core::backend_id::FETCH;
use crate::core::request::parse_version_lenient;
use crate::core::{
    BackendIdentity, DependencyManifest, DependencyRequirement, ResolutionRequest,
    VersionConstraint, Workspace,
};
use crate::util::cancel::CancelToken;
use crate::util::fs::{ensure_dir, remove_dir_all_if_exists};

/// One entry of `headers.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HeaderSource {
    /// Repository URL or local path
    pub git: String,

    /// Prefix stripped from tags before version parsing
    #[serde(default)]
    pub tag_prefix: Option<String>,

    /// Sub-directory exposed as the install location
    #[serde(default)]
    pub include: Option<String>,

    /// Exact tag to use instead of constraint matching
    #[serde(default)]
    pub tag: Option<String>,
}

impl HeaderSource {
    /// Location handed to libgit2: URLs verbatim, paths relative to the
    /// project root.
    fn remote(&self, root: &Path) -> String {
        if Url::parse(&self.git).is_ok() || is_scp_like(&self.git) {
            return self.git.clone();
        }
        root.join(&self.git).display().to_string()
    }

    /// Version a tag stands for, if it is one of ours.
    fn tag_version<'t>(&self, tag: &'t str) -> Option<&'t str> {
        match &self.tag_prefix {
            Some(prefix) => tag.strip_prefix(prefix.as_str()),
            None => Some(tag.strip_prefix('v').unwrap_or(tag)),
        }
    }
}

/// `git@github.com:org/repo.git`
fn is_scp_like(s: &str) -> bool {
    match s.split_once(':') {
        Some((user_host, path)) => {
            user_host.contains('@') && !user_host.contains('/') && !path.starts_with("//")
        }
        None => false,
    }
}

/// Parse `headers.toml`.
pub fn parse_declaration(content: &str) -> Result<BTreeMap<String, HeaderSource>, String> {
    toml::from_str(content).map_err(|e| e.message().to_string())
}

/// Pick the tag to check out for `dep`.
///
/// Returns `(tag, version)`. A pinned tag wins. An exact constraint picks
/// the tag whose version is that string; otherwise the highest tag whose
/// version satisfies the constraint.
pub fn select_tag(
    source: &HeaderSource,
    dep: &DependencyRequirement,
    tags: &[String],
) -> Option<(String, String)> {
    if let Some(pinned) = &source.tag {
        let tag = tags.iter().find(|t| *t == pinned)?;
        let version = source.tag_version(tag).unwrap_or(tag);
        return Some((tag.clone(), version.to_string()));
    }

    if let VersionConstraint::Exact(wanted) = &dep.constraint {
        return tags.iter().find_map(|tag| {
            let version = source.tag_version(tag)?;
            (version == wanted).then(|| (tag.clone(), version.to_string()))
        });
    }

    tags.iter()
        .filter_map(|tag| {
            let version = source.tag_version(tag)?;
            let parsed = parse_version_lenient(version)?;
            dep.constraint
                .matches(version)
                .then(|| (parsed, tag.clone(), version.to_string()))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, tag, version)| (tag, version))
}

pub struct FetchBackend;

impl FetchBackend {
    pub fn new() -> Self {
        FetchBackend
    }

    fn load_declaration(
        &self,
        ws: &Workspace,
    ) -> Result<BTreeMap<String, HeaderSource>, BackendError> {
        let path = ws
            .declaration_file(self.id())
            .ok_or_else(|| BackendError::DeclarationMissing {
                expected: FETCH.declaration_files.to_vec(),
            })?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| BackendError::io(format!("failed to read {}", path.display()), e))?;
        parse_declaration(&content).map_err(|e| {
            BackendError::resolution_failed(format!("invalid {}: {}", path.display(), e))
        })
    }

    fn fetch_one(
        &self,
        ws: &Workspace,
        dep: &DependencyRequirement,
        source: &HeaderSource,
        cancel: &CancelToken,
    ) -> Result<(String, PathBuf), BackendError> {
        let remote = source.remote(ws.root());
        let tags = list_remote_tags(&remote, cancel)?;

        let (tag, version) = select_tag(source, dep, &tags).ok_or_else(|| {
            let wanted = match &source.tag {
                Some(pinned) => format!("tag `{}`", pinned),
                None => format!("a tag matching `{}`", dep.constraint),
            };
            BackendError::resolution_failed(format!(
                "`{}`: {} has no {} ({} tags)",
                dep.name,
                remote,
                wanted,
                tags.len()
            ))
        })?;

        let dest = ws
            .mooring_dir()
            .join("fetch")
            .join(format!("{}-{}", dep.name, version));
        checkout_tag(&remote, &tag, &dest, cancel)?;

        let location = match &source.include {
            Some(include) => dest.join(include),
            None if dest.join("include").is_dir() => dest.join("include"),
            None => dest,
        };
        Ok((version, location))
    }
}

impl Default for FetchBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for FetchBackend {
    fn identity(&self) -> &'static BackendIdentity {
        &FETCH
    }

    fn detect(&self, ws: &Workspace) -> AvailabilityReport {
        match self.load_declaration(ws) {
            Ok(_) => {
                let (major, minor, patch) = git2::Version::get().libgit2_version();
                AvailabilityReport::available(
                    self.id(),
                    Some(format!("libgit2 {}.{}.{}", major, minor, patch)),
                )
            }
            Err(BackendError::DeclarationMissing { expected }) => AvailabilityReport::unavailable(
                self.id(),
                UnavailableReason::DeclarationMissing { expected },
            ),
            Err(e) => AvailabilityReport::unavailable(
                self.id(),
                UnavailableReason::ProbeFailed {
                    message: e.to_string(),
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
        let declaration = self.load_declaration(ws)?;
        let mut manifest = DependencyManifest::new(self.id(), request.platform().clone());

        for dep in request.dependencies() {
            check_cancel(cancel)?;

            let source = declaration.get(&dep.name).ok_or_else(|| {
                BackendError::resolution_failed(format!(
                    "`{}` has no git source in headers.toml",
                    dep.name
                ))
            })?;

            tracing::info!("fetching {} from {}", dep.name, source.git);
            let (version, location) = self.fetch_one(ws, dep, source, cancel)?;
            manifest.insert(dep.name.clone(), version, location);
        }

        Ok(manifest)
    }
}

fn callbacks(cancel: &CancelToken) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |_| cancel.check().is_none());
    callbacks
}

/// `git ls-remote --tags`, without peeled entries.
fn list_remote_tags(remote: &str, cancel: &CancelToken) -> Result<Vec<String>, BackendError> {
    check_cancel(cancel)?;

    let mut detached = git2::Remote::create_detached(remote).map_err(|e| git_error(e, cancel))?;
    let connection = detached
        .connect_auth(git2::Direction::Fetch, Some(callbacks(cancel)), None)
        .map_err(|e| git_error(e, cancel))?;

    let heads = connection.list().map_err(|e| git_error(e, cancel))?;
    let mut tags: Vec<String> = heads
        .iter()
        .filter_map(|head| head.name().strip_prefix("refs/tags/"))
        .filter(|name| !name.ends_with("^{}"))
        .map(str::to_string)
        .collect();
    tags.sort();
    tags.dedup();
    Ok(tags)
}

/// Make `dest` a checkout of `tag`, reusing an existing checkout when it is
/// already at the tagged commit.
fn checkout_tag(
    remote: &str,
    tag: &str,
    dest: &Path,
    cancel: &CancelToken,
) -> Result<(), BackendError> {
    let refname = format!("refs/tags/{}", tag);

    if let Ok(repo) = Repository::open(dest) {
        if is_at_tag(&repo, &refname) {
            tracing::debug!("reusing checkout {}", dest.display());
            return Ok(());
        }
    }

    remove_dir_all_if_exists(dest).map_err(|e| BackendError::io("stale checkout", e))?;
    if let Some(parent) = dest.parent() {
        ensure_dir(parent).map_err(|e| BackendError::io("fetch directory", e))?;
    }

    let result = clone_at_tag(remote, tag, &refname, dest, cancel);
    if result.is_err() {
        let _ = remove_dir_all_if_exists(dest);
    }
    result
}

fn clone_at_tag(
    remote: &str,
    tag: &str,
    refname: &str,
    dest: &Path,
    cancel: &CancelToken,
) -> Result<(), BackendError> {
    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks(cancel));
    let repo = RepoBuilder::new()
        .fetch_options(fetch_options)
        .clone(remote, dest)
        .map_err(|e| git_error(e, cancel))?;

    // Tags off the default branch are not fetched by clone.
    let mut origin = repo.find_remote("origin").map_err(|e| git_error(e, cancel))?;
    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks(cancel));
    origin
        .fetch(
            &[format!("+{}:{}", refname, refname)],
            Some(&mut fetch_options),
            None,
        )
        .map_err(|e| git_error(e, cancel))?;

    let commit = repo
        .find_reference(refname)
        .and_then(|r| r.peel_to_commit())
        .map_err(|e| BackendError::resolution_failed(format!("tag `{}`: {}", tag, e.message())))?;

    repo.set_head_detached(commit.id())
        .and_then(|_| repo.reset(commit.as_object(), ResetType::Hard, None))
        .map_err(|e| git_error(e, cancel))?;

    Ok(())
}

fn is_at_tag(repo: &Repository, refname: &str) -> bool {
    let tagged = repo
        .find_reference(refname)
        .and_then(|r| r.peel_to_commit())
        .map(|c| c.id());
    let head = repo.head().and_then(|h| h.peel_to_commit()).map(|c| c.id());
    matches!((tagged, head), (Ok(a), Ok(b)) if a == b)
}

/// Map a libgit2 failure, preferring the token's reason when it aborted us.
fn git_error(err: git2::Error, cancel: &CancelToken) -> BackendError {
    if let Some(interrupt) = cancel.check() {
        return interrupt.into();
    }
    match err.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh => {
            BackendError::NetworkUnavailable {
                detail: err.message().to_string(),
            }
        }
        _ => BackendError::resolution_failed(err.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Manifest, TargetTriple};
    use tempfile::TempDir;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn source() -> HeaderSource {
        HeaderSource {
            git: "https://github.com/fmtlib/fmt".to_string(),
            tag_prefix: None,
            include: None,
            tag: None,
        }
    }

    #[test]
    fn test_parse_declaration() {
        let decl = parse_declaration(
            r#"
[fmt]
git = "https://github.com/fmtlib/fmt"
include = "include"

[json]
git = "https://github.com/nlohmann/json"
tag-prefix = "release-"
"#,
        )
        .unwrap();

        assert_eq!(decl.len(), 2);
        assert_eq!(decl["fmt"].include.as_deref(), Some("include"));
        assert_eq!(decl["json"].tag_prefix.as_deref(), Some("release-"));
    }

    #[test]
    fn test_parse_declaration_rejects_unknown_keys() {
        assert!(parse_declaration("[fmt]\ngit = \"x\"\nbranch = \"main\"\n").is_err());
    }

    #[test]
    fn test_select_highest_matching_tag() {
        let dep = DependencyRequirement::new("fmt", "^10");
        let available = tags(&["9.1.0", "10.0.0", "v10.2.1", "11.0.0", "nightly"]);

        assert_eq!(
            select_tag(&source(), &dep, &available),
            Some(("v10.2.1".to_string(), "10.2.1".to_string()))
        );
    }

    #[test]
    fn test_select_with_prefix() {
        let mut src = source();
        src.tag_prefix = Some("release-".to_string());
        let dep = DependencyRequirement::new("json", "*");
        let available = tags(&["release-3.11.2", "release-3.11.3", "v4.0.0"]);

        assert_eq!(
            select_tag(&src, &dep, &available),
            Some(("release-3.11.3".to_string(), "3.11.3".to_string()))
        );
    }

    #[test]
    fn test_select_pinned_tag() {
        let mut src = source();
        src.tag = Some("v10.0.0".to_string());
        let dep = DependencyRequirement::new("fmt", "*");

        assert_eq!(
            select_tag(&src, &dep, &tags(&["v10.0.0", "v10.2.1"])),
            Some(("v10.0.0".to_string(), "10.0.0".to_string()))
        );
        assert_eq!(select_tag(&src, &dep, &tags(&["v10.2.1"])), None);
    }

    #[test]
    fn test_select_none_matching() {
        let dep = DependencyRequirement::new("fmt", ">=12");
        assert_eq!(select_tag(&source(), &dep, &tags(&["10.0.0", "11.0.0"])), None);
    }

    #[test]
    fn test_remote_location() {
        let root = Path::new("/work/app");
        assert_eq!(source().remote(root), "https://github.com/fmtlib/fmt");

        let scp = HeaderSource {
            git: "git@github.com:fmtlib/fmt.git".to_string(),
            ..source()
        };
        assert_eq!(scp.remote(root), "git@github.com:fmtlib/fmt.git");

        let local = HeaderSource {
            git: "vendor/fmt".to_string(),
            ..source()
        };
        assert_eq!(
            PathBuf::from(local.remote(root)),
            PathBuf::from("/work/app/vendor/fmt")
        );
    }

    fn tagged_repo(dir: &Path, tags: &[&str]) {
        let repo = Repository::init(dir).unwrap();
        std::fs::create_dir_all(dir.join("include")).unwrap();
        std::fs::write(dir.join("include").join("lib.h"), "#pragma once\n").unwrap();

        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let commit = repo
            .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
        let object = repo.find_object(commit, None).unwrap();
        for tag in tags {
            repo.tag_lightweight(tag, &object, false).unwrap();
        }
    }

    #[test]
    fn test_resolve_from_local_repository() {
        let tmp = TempDir::new().unwrap();
        let upstream = tmp.path().join("upstream");
        tagged_repo(&upstream, &["v1.0.0", "v1.2.0", "v2.0.0"]);

        let project = tmp.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(
            project.join("headers.toml"),
            format!("[mini]\ngit = \"{}\"\n", upstream.display().to_string().replace('\\', "/")),
        )
        .unwrap();

        let ws = Workspace::from_parts(
            project.clone(),
            Manifest {
                name: "app".to_string(),
                version: None,
                dependencies: Vec::new(),
            },
        );
        let backend = FetchBackend::new();
        assert!(backend.detect(&ws).usable());

        let request = ResolutionRequest::new(
            TargetTriple::host(),
            vec![DependencyRequirement::new("mini", "^1")],
        );
        let manifest = backend.resolve(&ws, &request, &CancelToken::new()).unwrap();

        let pkg = manifest.get("mini").unwrap();
        assert_eq!(pkg.version, "1.2.0");
        assert!(pkg.location.join("lib.h").is_file());
        assert!(pkg.location.starts_with(project.join(".mooring").join("fetch")));

        // Second run reuses the checkout and yields the same manifest.
        let again = backend.resolve(&ws, &request, &CancelToken::new()).unwrap();
        assert_eq!(again, manifest);
    }

    #[test]
    fn test_resolve_undeclared_dependency_fails() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("headers.toml"), "").unwrap();
        let ws = Workspace::from_parts(
            tmp.path().to_path_buf(),
            Manifest {
                name: "app".to_string(),
                version: None,
                dependencies: Vec::new(),
            },
        );
        let request = ResolutionRequest::new(
            TargetTriple::host(),
            vec![DependencyRequirement::new("fmt", "*")],
        );

        let err = FetchBackend::new()
            .resolve(&ws, &request, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, BackendError::ResolutionFailed { .. }));
    }

    #[test]
    fn test_cancelled_before_fetch() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = list_remote_tags("https://example.invalid/repo", &cancel).unwrap_err();
        assert_eq!(err, BackendError::Cancelled);
    }

    #[test]
    fn test_select_exact_version() {
        // Non-semver constraints only match identical tag versions.
        let dep = DependencyRequirement {
            name: "stb".to_string(),
            constraint: VersionConstraint::Exact("2024.01".to_string()),
        };
        let mut src = source();
        src.tag_prefix = Some(String::new());
        assert_eq!(
            select_tag(&src, &dep, &tags(&["2023.12", "2024.01"])),
            Some(("2024.01".to_string(), "2024.01".to_string()))
        );
    }

    #[test]
    fn test_select_date_tag() {
        let dep = DependencyRequirement::new("stb", "2024-01-11");
        assert_eq!(
            dep.constraint,
            VersionConstraint::Exact("2024-01-11".to_string())
        );

        let available = tags(&["2023-12-01", "2024-01-11", "v2024-02-03"]);
        assert_eq!(
            select_tag(&source(), &dep, &available),
            Some(("2024-01-11".to_string(), "2024-01-11".to_string()))
        );

        let missing = DependencyRequirement::new("stb", "2024-03-01");
        assert_eq!(select_tag(&source(), &missing, &available), None);
    }
}
