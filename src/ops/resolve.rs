//! Workspace resolution operations.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::backend::BackendRegistry;
use crate::coordinator::{AttemptOptions, Orchestrator, ResolutionOutcome, State};
use crate::core::{BackendId, ResolutionRequest, TargetTriple, Workspace};
use crate::util::cancel::CancelToken;
use crate::util::config::Config;

/// Command-line overrides for a resolve. Unset fields fall back to config.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Preferred backend
    pub prefer: Option<BackendId>,

    /// Target platform; the host when unset
    pub platform: Option<TargetTriple>,

    /// Per-backend resolve timeout
    pub timeout: Option<Duration>,

    /// Treat cross-backend lock divergence as a failure
    pub strict_locks: bool,
}

/// Result of a successful resolve.
#[derive(Debug)]
pub struct ResolveResult {
    pub outcome: ResolutionOutcome,

    /// Where the resolved manifest was written
    pub resolved_path: PathBuf,

    /// Strict mode was on and the locks diverged
    pub strict_violation: bool,
}

/// Resolve the workspace dependencies with the built-in backends.
///
/// Attempt-level failures come back as an [`AttemptError`] inside the
/// `anyhow::Error`, so callers can branch on the failure class.
///
/// [`AttemptError`]: crate::coordinator::AttemptError
pub fn resolve_workspace(
    ws: &Workspace,
    config: &Config,
    opts: &ResolveOptions,
    cancel: &CancelToken,
    observer: impl Fn(&State) + Send + Sync,
) -> Result<ResolveResult> {
    let registry = BackendRegistry::builtin(config);
    resolve_with_registry(ws, &registry, config, opts, cancel, observer)
}

/// Resolve against an explicit registry.
pub fn resolve_with_registry(
    ws: &Workspace,
    registry: &BackendRegistry,
    config: &Config,
    opts: &ResolveOptions,
    cancel: &CancelToken,
    observer: impl Fn(&State) + Send + Sync,
) -> Result<ResolveResult> {
    let platform = opts.platform.clone().unwrap_or_else(TargetTriple::host);
    let prefer = opts.prefer.or_else(|| config.preferred_backend());
    let request = ResolutionRequest::new(platform, ws.manifest().dependencies.clone())
        .with_preference(prefer);

    let mut attempt = AttemptOptions::from_config(config);
    if opts.timeout.is_some() {
        attempt.timeout = opts.timeout;
    }

    tracing::debug!(
        "resolving {} for {} (prefer: {})",
        ws.manifest().name,
        request.platform(),
        prefer.map(|p| p.as_str()).unwrap_or("none")
    );

    let outcome = Orchestrator::new(registry)
        .with_options(attempt)
        .with_observer(observer)
        .resolve(ws, &request, cancel)?;

    let resolved_path = ws.resolved_manifest_path();
    outcome
        .manifest
        .save_json(&resolved_path)
        .with_context(|| format!("failed to write {}", resolved_path.display()))?;

    let strict = opts.strict_locks || config.resolve.strict_locks;
    let strict_violation = strict && outcome.has_divergence();
    if strict_violation {
        tracing::debug!("lock divergence in strict mode");
    }

    Ok(ResolveResult {
        outcome,
        resolved_path,
        strict_violation,
    })
}
