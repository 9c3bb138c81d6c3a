//! Availability detection.
//!
//! Every registered backend is probed on its own rayon task. Probes share
//! nothing, and a probe that panics only makes its own backend unusable.

use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;

use crate::backend::{AvailabilityReport, BackendRegistry, UnavailableReason};
use crate::core::{BackendId, Workspace};

/// Availability of every registered backend, fixed for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// In registry (rank) order
    reports: Vec<AvailabilityReport>,
}

impl Detection {
    pub fn from_reports(reports: Vec<AvailabilityReport>) -> Self {
        Detection { reports }
    }

    pub fn get(&self, id: BackendId) -> Option<&AvailabilityReport> {
        self.reports.iter().find(|r| r.backend == id)
    }

    pub fn is_usable(&self, id: BackendId) -> bool {
        self.get(id).is_some_and(|r| r.usable())
    }

    /// Why `id` cannot be used; `None` when it can.
    pub fn reason(&self, id: BackendId) -> Option<String> {
        match self.get(id) {
            Some(report) => report.reason(),
            None => Some("not registered".to_string()),
        }
    }

    /// Reports in rank order.
    pub fn reports(&self) -> &[AvailabilityReport] {
        &self.reports
    }

    pub fn usable_count(&self) -> usize {
        self.reports.iter().filter(|r| r.usable()).count()
    }
}

/// Probe every backend in `registry` concurrently.
pub fn detect_all(registry: &BackendRegistry, ws: &Workspace) -> Detection {
    let backends: Vec<_> = registry.iter().collect();

    let reports: Vec<AvailabilityReport> = backends
        .par_iter()
        .map(|backend| {
            let id = backend.id();
            let report = panic::catch_unwind(AssertUnwindSafe(|| backend.detect(ws)))
                .unwrap_or_else(|payload| {
                    AvailabilityReport::unavailable(
                        id,
                        UnavailableReason::ProbeFailed {
                            message: format!("probe panicked: {}", panic_message(&*payload)),
                        },
                    )
                });

            match report.reason() {
                None => tracing::debug!("{}: available", id),
                Some(reason) => tracing::debug!("{}: unavailable ({})", id, reason),
            }
            report
        })
        .collect();

    Detection { reports }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
