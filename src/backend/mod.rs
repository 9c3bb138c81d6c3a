//! Backend adapters.
//!
//! A backend wraps one external package manager behind a uniform contract:
//! probe whether it can run here, resolve a request into an installed
//! dependency set, and produce or check the lock record for that set.
//!
//! Availability is never cached across calls. The orchestrator probes once
//! per resolution attempt and reuses that snapshot for every selection
//! decision inside the attempt.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::core::{BackendId, BackendIdentity, DependencyManifest, ResolutionRequest, Workspace};
use crate::lock::LockRecord;
use crate::util::cancel::{CancelToken, Interrupt};
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::process::ExecError;

pub mod conan;
pub mod fetch;
pub mod registry;
pub mod vcpkg;

pub use registry::{BackendRegistry, RegistryError};

/// The contract every package-manager adapter implements.
pub trait Backend: Send + Sync {
    /// Static identity: name, rank and file locations.
    fn identity(&self) -> &'static BackendIdentity;

    fn id(&self) -> BackendId {
        self.identity().id
    }

    /// Probe the environment.
    ///
    /// Must not write to the filesystem, change the environment or touch the
    /// network. Running the tool's `--version` is fine.
    fn detect(&self, ws: &Workspace) -> AvailabilityReport;

    /// Resolve and materialize the requested dependencies.
    ///
    /// May take arbitrarily long; implementations poll `cancel` between steps
    /// and while waiting on subprocesses or transfers.
    fn resolve(
        &self,
        ws: &Workspace,
        request: &ResolutionRequest,
        cancel: &CancelToken,
    ) -> Result<DependencyManifest, BackendError>;

    /// Produce the lock record for a resolved manifest.
    fn emit_lock(&self, manifest: &DependencyManifest) -> LockRecord {
        LockRecord::from_manifest(manifest)
    }

    /// Whether a stored lock still describes a freshly resolved manifest.
    fn verify_lock(&self, lock: &LockRecord, manifest: &DependencyManifest) -> bool {
        lock.backend == manifest.backend && lock.content_hash == LockRecord::hash_manifest(manifest)
    }
}

/// Outcome of probing one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityReport {
    pub backend: BackendId,
    pub availability: Availability,
}

impl AvailabilityReport {
    pub fn available(backend: BackendId, version: Option<String>) -> Self {
        AvailabilityReport {
            backend,
            availability: Availability::Available { version },
        }
    }

    pub fn unavailable(backend: BackendId, reason: UnavailableReason) -> Self {
        AvailabilityReport {
            backend,
            availability: Availability::Unavailable(reason),
        }
    }

    pub fn usable(&self) -> bool {
        matches!(self.availability, Availability::Available { .. })
    }

    /// Human-readable reason when not usable.
    pub fn reason(&self) -> Option<String> {
        match &self.availability {
            Availability::Available { .. } => None,
            Availability::Unavailable(reason) => Some(reason.to_string()),
        }
    }

    /// Detected tool version, if any.
    pub fn version(&self) -> Option<&str> {
        match &self.availability {
            Availability::Available { version } => version.as_deref(),
            Availability::Unavailable(_) => None,
        }
    }
}

/// Backend availability status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// Ready to resolve. `version` is the detected tool version, when the
    /// backend runs an external tool.
    Available { version: Option<String> },

    Unavailable(UnavailableReason),
}

/// Why a backend cannot be used right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Backend tool is not installed
    NotInstalled {
        /// Name of the missing tool (e.g., "conan")
        tool: String,
        /// Hint for how to install
        install_hint: String,
    },

    /// The project has no declaration file for this backend
    DeclarationMissing { expected: Vec<&'static str> },

    /// Backend tool version is too old
    VersionTooOld { found: String, required: String },

    /// The probe itself failed (bad config, unreadable declaration, panic)
    ProbeFailed { message: String },
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::NotInstalled { tool, install_hint } => {
                write!(f, "{} not found. {}", tool, install_hint)
            }
            UnavailableReason::DeclarationMissing { expected } => {
                write!(f, "no {} in project root", expected.join(" or "))
            }
            UnavailableReason::VersionTooOld { found, required } => {
                write!(f, "version {} found, but {} required", found, required)
            }
            UnavailableReason::ProbeFailed { message } => write!(f, "{}", message),
        }
    }
}

/// A per-backend failure. Always recoverable by falling back to the next
/// backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("`{tool}` is not installed")]
    NotInstalled { tool: String },

    #[error("no dependency declaration found (expected {})", .expected.join(" or "))]
    DeclarationMissing { expected: Vec<&'static str> },

    #[error("resolution failed: {diagnostic}")]
    ResolutionFailed {
        /// Raw diagnostic text from the tool
        diagnostic: String,
    },

    #[error("network unavailable: {detail}")]
    NetworkUnavailable { detail: String },

    #[error("timed out")]
    TimedOut,

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io { message: String },
}

impl BackendError {
    pub fn resolution_failed(diagnostic: impl Into<String>) -> Self {
        BackendError::ResolutionFailed {
            diagnostic: diagnostic.into(),
        }
    }

    pub fn io(context: impl fmt::Display, err: impl fmt::Display) -> Self {
        BackendError::Io {
            message: format!("{}: {}", context, err),
        }
    }

    /// Whether the orchestrator may retry the same backend.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::NetworkUnavailable { .. })
    }

    /// Stable short name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::NotInstalled { .. } => "not-installed",
            BackendError::DeclarationMissing { .. } => "declaration-missing",
            BackendError::ResolutionFailed { .. } => "resolution-failed",
            BackendError::NetworkUnavailable { .. } => "network-unavailable",
            BackendError::TimedOut => "timed-out",
            BackendError::Cancelled => "cancelled",
            BackendError::Io { .. } => "io",
        }
    }

    /// Convert to a user-facing diagnostic.
    pub fn to_diagnostic(&self, backend: BackendId) -> Diagnostic {
        let diag = Diagnostic::error(format!("backend `{}`: {}", backend, self));
        match self {
            BackendError::NotInstalled { .. } => match backend {
                BackendId::Conan => diag.with_suggestion(suggestions::INSTALL_CONAN),
                BackendId::Vcpkg => diag.with_suggestion(suggestions::INSTALL_VCPKG),
                BackendId::Fetch => diag,
            },
            BackendError::DeclarationMissing { expected } => diag.with_suggestion(format!(
                "Add {} to the project root",
                expected.join(" or ")
            )),
            BackendError::NetworkUnavailable { .. } => diag.with_suggestion(suggestions::NETWORK),
            BackendError::TimedOut => diag.with_suggestion(suggestions::TIMED_OUT),
            BackendError::ResolutionFailed { .. } | BackendError::Cancelled | BackendError::Io { .. } => {
                diag
            }
        }
    }
}

impl From<Interrupt> for BackendError {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => BackendError::Cancelled,
            Interrupt::TimedOut => BackendError::TimedOut,
        }
    }
}

impl From<ExecError> for BackendError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Interrupted { reason, .. } => reason.into(),
            ExecError::Spawn { program, source } if source.kind() == std::io::ErrorKind::NotFound => {
                BackendError::NotInstalled { tool: program }
            }
            ExecError::Spawn { program, source } => {
                BackendError::io(format!("failed to spawn `{}`", program), source)
            }
            ExecError::Wait { program, source } => {
                BackendError::io(format!("failed to wait for `{}`", program), source)
            }
        }
    }
}

/// Bail out of a resolve step if the token was interrupted.
pub(crate) fn check_cancel(cancel: &CancelToken) -> Result<(), BackendError> {
    match cancel.check() {
        Some(interrupt) => Err(interrupt.into()),
        None => Ok(()),
    }
}

static NETWORK_FAILURE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(connection (refused|reset|aborted|timed out)|could not resolve host|name or service not known|temporary failure in name resolution|network is unreachable|failed to establish a new connection|max retries exceeded|unable to connect to remote|failed to download)",
    )
    .ok()
});

/// Map a failed tool run's diagnostic onto the error taxonomy.
pub(crate) fn classify_tool_failure(diagnostic: String) -> BackendError {
    let is_network = NETWORK_FAILURE
        .as_ref()
        .is_some_and(|re| re.is_match(&diagnostic));
    if is_network {
        BackendError::NetworkUnavailable { detail: diagnostic }
    } else {
        BackendError::ResolutionFailed { diagnostic }
    }
}

/// First non-empty output stream of a finished tool, for diagnostics.
pub(crate) fn tool_diagnostic(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !stdout.is_empty() {
        return stdout;
    }
    format!("exited with {}", output.status)
}
