//! Cross-checking stored lock files without resolving.

use std::fmt::Write;

use serde::Serialize;

use crate::core::{BackendId, Workspace};
use crate::lock::{cross_check, LockRecord, LockWarning};

/// One stored lock, summarized.
#[derive(Debug, Clone, Serialize)]
pub struct LockSummary {
    pub backend: BackendId,
    pub path: String,
    pub content_hash: String,
    pub generated_at: String,
    pub platform: String,
    pub packages: usize,
}

impl LockSummary {
    fn new(ws: &Workspace, record: &LockRecord) -> Self {
        LockSummary {
            backend: record.backend,
            path: ws.lock_path(record.backend).display().to_string(),
            content_hash: record.content_hash.clone(),
            generated_at: record.generated_at.to_rfc3339(),
            platform: record.platform.to_string(),
            packages: record.packages.len(),
        }
    }
}

/// Result of `mooring locks`.
#[derive(Debug, Clone)]
pub struct LockCheck {
    pub locks: Vec<LockSummary>,
    pub warnings: Vec<LockWarning>,
}

impl LockCheck {
    pub fn has_divergence(&self) -> bool {
        self.warnings.iter().any(|w| w.is_divergence())
    }
}

/// Read every stored lock of `ws` and compare them pairwise.
pub fn check_locks(ws: &Workspace) -> LockCheck {
    let (records, warnings) = cross_check(ws);
    LockCheck {
        locks: records.iter().map(|r| LockSummary::new(ws, r)).collect(),
        warnings,
    }
}

/// Render a lock check for the terminal.
pub fn format_lock_check(check: &LockCheck) -> String {
    let mut output = String::new();

    if check.locks.is_empty() {
        let _ = writeln!(output, "no lock files found");
    }
    for lock in &check.locks {
        let short_hash = lock.content_hash.get(..12).unwrap_or(&lock.content_hash);
        let _ = writeln!(
            output,
            "  {}: {} package(s) for {} [{}]",
            lock.backend, lock.packages, lock.platform, short_hash
        );
    }

    if check.locks.len() > 1 && !check.has_divergence() {
        let _ = writeln!(output, "\nlocks agree");
    }

    output
}
