//! Command implementations

pub mod backends;
pub mod completions;
pub mod locks;
pub mod resolve;

use anyhow::Result;
use miette::Diagnostic as _;

use mooring::coordinator::AttemptError;
use mooring::core::{BackendIdParseError, ManifestError, TripleParseError, Workspace};
use mooring::util::diagnostic::{self, Diagnostic};
use mooring::util::{GlobalContext, Shell};

/// Process exit codes. Scripts branch on these, so they never change.
pub mod exit {
    pub const SUCCESS: u8 = 0;
    pub const INTERNAL: u8 = 1;
    pub const INVALID_INPUT: u8 = 2;
    pub const NO_BACKEND_AVAILABLE: u8 = 3;
    pub const ALL_BACKENDS_FAILED: u8 = 4;
    pub const CANCELLED: u8 = 5;
    pub const LOCK_DIVERGENCE: u8 = 6;
}

/// Bad command-line input not covered by a library error type.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvalidInput(pub String);

/// Find and load the workspace for the current directory.
pub fn load_workspace(ctx: &GlobalContext) -> Result<Workspace> {
    let manifest_path = ctx.find_manifest()?;
    Ok(Workspace::new(&manifest_path)?)
}

/// Print `err` the way the current shell mode wants it and pick the exit code.
pub fn report_error(shell: &Shell, err: &anyhow::Error) -> u8 {
    let (code, diag, trace) = classify(err);

    if shell.is_json() {
        let kind = err
            .downcast_ref::<AttemptError>()
            .map(|e| e.kind())
            .unwrap_or(if code == exit::INVALID_INPUT {
                "invalid-input"
            } else {
                "internal"
            });
        shell.json(&serde_json::json!({
            "success": false,
            "error": kind,
            "message": diag.message,
            "trace": trace,
        }));
    } else {
        diagnostic::emit(&diag, shell.use_color());
    }

    code
}

fn classify(err: &anyhow::Error) -> (u8, Diagnostic, serde_json::Value) {
    if let Some(attempt) = err.downcast_ref::<AttemptError>() {
        let code = match attempt {
            AttemptError::NoBackendAvailable { .. } => exit::NO_BACKEND_AVAILABLE,
            AttemptError::AllBackendsFailed { .. } => exit::ALL_BACKENDS_FAILED,
            AttemptError::Cancelled { .. } => exit::CANCELLED,
        };
        let trace = serde_json::to_value(attempt.trace()).unwrap_or_default();
        return (code, attempt.to_diagnostic(), trace);
    }

    if let Some(manifest) = err.downcast_ref::<ManifestError>() {
        let mut diag = Diagnostic::error(manifest.to_string());
        if let Some(help) = manifest.help() {
            diag = diag.with_suggestion(help.to_string());
        }
        return (exit::INVALID_INPUT, diag, serde_json::Value::Null);
    }

    let invalid = err.downcast_ref::<InvalidInput>().is_some()
        || err.downcast_ref::<BackendIdParseError>().is_some()
        || err.downcast_ref::<TripleParseError>().is_some();
    let code = if invalid {
        exit::INVALID_INPUT
    } else {
        exit::INTERNAL
    };
    (code, Diagnostic::error(format!("{:#}", err)), serde_json::Value::Null)
}
