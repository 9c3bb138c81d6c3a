//! Attempt traces: the ordered record of every backend considered during
//! one resolution and what happened to it.

use std::fmt;

use serde::Serialize;

use crate::backend::BackendError;
use crate::core::{BackendId, DependencyManifest};
use crate::lock::{LockRecord, LockWarning};

/// What happened to one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOutcome {
    /// Skipped during the rank walk
    Unavailable { reason: String },
    /// Named by the caller but not usable
    PreferredUnavailable { reason: String },
    /// Selected and its resolve failed
    Failed { error: BackendError },
    /// Selected; resolving or resolved
    Selected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub backend: BackendId,
    pub outcome: TraceOutcome,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            TraceOutcome::Unavailable { reason } => {
                write!(f, "{}: unavailable ({})", self.backend, reason)
            }
            TraceOutcome::PreferredUnavailable { reason } => {
                write!(f, "{}: preferred but unavailable ({})", self.backend, reason)
            }
            TraceOutcome::Failed { error } => write!(f, "{}: failed ({})", self.backend, error),
            TraceOutcome::Selected => write!(f, "{}: selected", self.backend),
        }
    }
}

impl Serialize for TraceEntry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let (outcome, reason) = match &self.outcome {
            TraceOutcome::Unavailable { reason } => ("unavailable", Some(reason.clone())),
            TraceOutcome::PreferredUnavailable { reason } => {
                ("preferred-unavailable", Some(reason.clone()))
            }
            TraceOutcome::Failed { error } => ("failed", Some(error.to_string())),
            TraceOutcome::Selected => ("selected", None),
        };

        let mut s = serializer.serialize_struct("TraceEntry", 3)?;
        s.serialize_field("backend", &self.backend)?;
        s.serialize_field("outcome", outcome)?;
        s.serialize_field("reason", &reason)?;
        s.end()
    }
}

/// Ordered entries, at most one per backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttemptTrace {
    entries: Vec<TraceEntry>,
}

impl AttemptTrace {
    pub fn new() -> Self {
        AttemptTrace::default()
    }

    pub(crate) fn push(&mut self, backend: BackendId, outcome: TraceOutcome) {
        debug_assert!(!self.contains(backend), "{} traced twice", backend);
        self.entries.push(TraceEntry { backend, outcome });
    }

    /// Turn the `Selected` entry of `backend` into a failure.
    pub(crate) fn mark_failed(&mut self, backend: BackendId, error: BackendError) {
        match self.entries.iter_mut().find(|e| e.backend == backend) {
            Some(entry) => entry.outcome = TraceOutcome::Failed { error },
            None => self.entries.push(TraceEntry {
                backend,
                outcome: TraceOutcome::Failed { error },
            }),
        }
    }

    pub fn contains(&self, backend: BackendId) -> bool {
        self.entries.iter().any(|e| e.backend == backend)
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries rendered one per element, as shown to users.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.to_string()).collect()
    }

    /// Backends whose resolve failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (BackendId, &BackendError)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            TraceOutcome::Failed { error } => Some((e.backend, error)),
            _ => None,
        })
    }
}

impl fmt::Display for AttemptTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// A successful resolution.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    /// The backend that produced `manifest`
    pub backend: BackendId,
    pub manifest: DependencyManifest,
    pub trace: AttemptTrace,
    /// The lock record now describing `manifest`
    pub lock: LockRecord,
    /// Whether the lock file was rewritten
    pub lock_written: bool,
    pub warnings: Vec<LockWarning>,
}

impl ResolutionOutcome {
    pub fn drift_detected(&self) -> bool {
        self.warnings.iter().any(|w| w.is_drift())
    }

    pub fn has_divergence(&self) -> bool {
        self.warnings.iter().any(|w| w.is_divergence())
    }
}
