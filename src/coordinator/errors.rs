use thiserror::Error;

use super::trace::AttemptTrace;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Terminal failure of a whole resolution attempt.
///
/// Every variant carries the full trace, so callers can show why each
/// backend was rejected.
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    #[error("no dependency backend is available")]
    NoBackendAvailable { trace: AttemptTrace },

    #[error("every available backend failed to resolve dependencies")]
    AllBackendsFailed { trace: AttemptTrace },

    #[error("resolution cancelled")]
    Cancelled { trace: AttemptTrace },
}

impl AttemptError {
    pub fn trace(&self) -> &AttemptTrace {
        match self {
            AttemptError::NoBackendAvailable { trace }
            | AttemptError::AllBackendsFailed { trace }
            | AttemptError::Cancelled { trace } => trace,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::NoBackendAvailable { .. } => "no-backend-available",
            AttemptError::AllBackendsFailed { .. } => "all-backends-failed",
            AttemptError::Cancelled { .. } => "cancelled",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.to_string());
        for line in self.trace().lines() {
            diag = diag.with_context(line);
        }

        match self {
            AttemptError::NoBackendAvailable { .. } => diag.with_suggestion(suggestions::NO_BACKEND),
            AttemptError::AllBackendsFailed { trace } => {
                let mut diag = diag.with_suggestion(suggestions::ALL_FAILED);
                for (backend, error) in trace.failures() {
                    for hint in error.to_diagnostic(backend).suggestions {
                        if !diag.suggestions.contains(&hint) {
                            diag = diag.with_suggestion(hint);
                        }
                    }
                }
                diag
            }
            AttemptError::Cancelled { .. } => diag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::coordinator::trace::TraceOutcome;
    use crate::core::BackendId;

    #[test]
    fn test_all_failed_diagnostic_lists_each_backend() {
        let mut trace = AttemptTrace::new();
        trace.push(BackendId::Conan, TraceOutcome::Selected);
        trace.mark_failed(BackendId::Conan, BackendError::TimedOut);
        trace.push(BackendId::Vcpkg, TraceOutcome::Selected);
        trace.mark_failed(
            BackendId::Vcpkg,
            BackendError::NetworkUnavailable {
                detail: "could not resolve host".to_string(),
            },
        );

        let diag = AttemptError::AllBackendsFailed { trace }.to_diagnostic();
        assert_eq!(diag.context.len(), 2);
        assert_eq!(diag.context[0], "conan: failed (timed out)");
        assert!(diag.suggestions.contains(&suggestions::ALL_FAILED.to_string()));
        assert!(diag.suggestions.contains(&suggestions::TIMED_OUT.to_string()));
        assert!(diag.suggestions.contains(&suggestions::NETWORK.to_string()));
    }

    #[test]
    fn test_no_backend_diagnostic() {
        let err = AttemptError::NoBackendAvailable {
            trace: AttemptTrace::new(),
        };
        assert_eq!(err.kind(), "no-backend-available");
        let rendered = err.to_diagnostic().to_string();
        assert!(rendered.starts_with("error: no dependency backend is available"));
        assert!(rendered.contains("mooring backends"));
    }
}
