//! Backend availability reports.
//!
//! `mooring backends` runs the same probes a resolve would and prints why
//! each backend can or cannot be used, without resolving anything.

use std::fmt::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::backend::{AvailabilityReport, BackendRegistry};
use crate::coordinator::detect_all;
use crate::core::{BackendId, Workspace};

/// Status of one registered backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub backend: BackendId,
    pub rank: u8,
    pub kind: &'static str,
    pub description: &'static str,

    pub usable: bool,

    /// Tool version, when detected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Why the backend is unusable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Declaration file found in the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration: Option<PathBuf>,

    pub lock_file: &'static str,
}

/// Probe every registered backend.
pub fn backend_statuses(registry: &BackendRegistry, ws: &Workspace) -> Vec<BackendStatus> {
    detect_all(registry, ws)
        .reports()
        .iter()
        .map(|report| status_of(ws, report))
        .collect()
}

/// Probe a single backend. `None` when it is not registered.
pub fn backend_status(
    registry: &BackendRegistry,
    ws: &Workspace,
    id: BackendId,
) -> Option<BackendStatus> {
    let backend = registry.get(id)?;
    Some(status_of(ws, &backend.detect(ws)))
}

fn status_of(ws: &Workspace, report: &AvailabilityReport) -> BackendStatus {
    let identity = report.backend.identity();
    BackendStatus {
        backend: report.backend,
        rank: identity.rank,
        kind: identity.kind.as_str(),
        description: identity.description,
        usable: report.usable(),
        version: report.version().map(str::to_string),
        reason: report.reason(),
        declaration: ws.declaration_file(report.backend),
        lock_file: identity.lock_file,
    }
}

/// Render statuses for the terminal.
pub fn format_statuses(statuses: &[BackendStatus], verbose: bool) -> String {
    let mut output = String::new();

    for status in statuses {
        let mark = if status.usable { "[OK]" } else { "[!!]" };
        let _ = write!(output, "  {} {} (rank {})", mark, status.backend, status.rank);
        if let Some(version) = &status.version {
            let _ = write!(output, " {}", version);
        }
        let _ = writeln!(output);

        if let Some(reason) = &status.reason {
            let _ = writeln!(output, "      {}", reason);
        }
        if verbose {
            let _ = writeln!(output, "      {}", status.description);
            if let Some(path) = &status.declaration {
                let _ = writeln!(output, "      Declaration: {}", path.display());
            }
            let _ = writeln!(output, "      Lock file: {}", status.lock_file);
        }
    }

    let usable = statuses.iter().filter(|s| s.usable).count();
    let _ = writeln!(output, "\n{} of {} backends usable", usable, statuses.len());

    output
}
