//! Backend selection.
//!
//! The engine yields one backend at a time. A caller preference is honoured
//! when that backend is usable; otherwise backends are taken in ascending
//! rank. Every backend the engine looks at lands in the trace exactly once,
//! so a failed backend is never handed out again within the same attempt.

use super::detect::Detection;
use super::trace::{AttemptTrace, TraceOutcome};
use crate::core::BackendId;

/// Iterator-like walk over the remaining candidates of one attempt.
pub struct SelectionEngine<'a> {
    detection: &'a Detection,
    /// Registered backends, ascending rank
    order: Vec<BackendId>,
    preferred: Option<BackendId>,
    preference_consumed: bool,
}

impl<'a> SelectionEngine<'a> {
    pub fn new(detection: &'a Detection, preferred: Option<BackendId>) -> Self {
        let mut order: Vec<BackendId> = detection.reports().iter().map(|r| r.backend).collect();
        order.sort_by_key(|id| id.rank());

        SelectionEngine {
            detection,
            order,
            preferred,
            preference_consumed: false,
        }
    }

    /// Pick the next backend to resolve with, recording what was skipped.
    ///
    /// Backends already present in `trace` (selected, failed or skipped) are
    /// never returned again. `None` means the candidates are exhausted.
    pub fn next(&mut self, trace: &mut AttemptTrace) -> Option<BackendId> {
        if !self.preference_consumed {
            self.preference_consumed = true;
            if let Some(preferred) = self.preferred {
                if self.detection.is_usable(preferred) {
                    tracing::debug!("selected preferred backend {}", preferred);
                    trace.push(preferred, TraceOutcome::Selected);
                    return Some(preferred);
                }
                let reason = self.detection.reason(preferred).unwrap_or_default();
                tracing::debug!("preferred backend {} unavailable: {}", preferred, reason);
                trace.push(preferred, TraceOutcome::PreferredUnavailable { reason });
            }
        }

        for &id in &self.order {
            if trace.contains(id) {
                continue;
            }
            if self.detection.is_usable(id) {
                tracing::debug!("selected {}", id);
                trace.push(id, TraceOutcome::Selected);
                return Some(id);
            }
            let reason = self.detection.reason(id).unwrap_or_default();
            trace.push(id, TraceOutcome::Unavailable { reason });
        }

        None
    }

    /// Usable backends not yet handed out, in rank order.
    pub fn remaining(&self, trace: &AttemptTrace) -> Vec<BackendId> {
        self.order
            .iter()
            .copied()
            .filter(|id| !trace.contains(*id) && self.detection.is_usable(*id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AvailabilityReport, UnavailableReason};

    fn up(id: BackendId) -> AvailabilityReport {
        AvailabilityReport::available(id, None)
    }

    fn down(id: BackendId) -> AvailabilityReport {
        AvailabilityReport::unavailable(
            id,
            UnavailableReason::NotInstalled {
                tool: id.as_str().to_string(),
                install_hint: "Install it.".to_string(),
            },
        )
    }

    fn detection(reports: Vec<AvailabilityReport>) -> Detection {
        Detection::from_reports(reports)
    }

    #[test]
    fn test_lowest_rank_available_wins() {
        let combos = [
            (vec![true, true, true], BackendId::Conan),
            (vec![false, true, true], BackendId::Vcpkg),
            (vec![true, false, true], BackendId::Conan),
            (vec![false, false, true], BackendId::Fetch),
            (vec![false, true, false], BackendId::Vcpkg),
        ];

        for (usable, expected) in combos {
            let reports = BackendId::ALL
                .into_iter()
                .zip(usable)
                .map(|(id, ok)| if ok { up(id) } else { down(id) })
                .collect();
            let detection = detection(reports);
            let mut trace = AttemptTrace::new();
            let selected = SelectionEngine::new(&detection, None).next(&mut trace);
            assert_eq!(selected, Some(expected));
        }
    }

    #[test]
    fn test_platform_selected_when_binary_missing() {
        let detection = detection(vec![
            down(BackendId::Conan),
            up(BackendId::Vcpkg),
            up(BackendId::Fetch),
        ]);
        let mut trace = AttemptTrace::new();
        let mut engine = SelectionEngine::new(&detection, None);

        assert_eq!(engine.next(&mut trace), Some(BackendId::Vcpkg));
        let lines = trace.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("conan: unavailable"));
        assert_eq!(lines[1], "vcpkg: selected");
    }

    #[test]
    fn test_preference_beats_rank() {
        let detection = detection(BackendId::ALL.into_iter().map(up).collect());
        let mut trace = AttemptTrace::new();
        let mut engine = SelectionEngine::new(&detection, Some(BackendId::Fetch));

        assert_eq!(engine.next(&mut trace), Some(BackendId::Fetch));
        assert_eq!(trace.lines(), vec!["fetch: selected"]);
    }

    #[test]
    fn test_unavailable_preference_is_a_hint() {
        let detection = detection(vec![
            down(BackendId::Conan),
            up(BackendId::Vcpkg),
            up(BackendId::Fetch),
        ]);
        let mut trace = AttemptTrace::new();
        let mut engine = SelectionEngine::new(&detection, Some(BackendId::Conan));

        assert_eq!(engine.next(&mut trace), Some(BackendId::Vcpkg));
        let conan_entries: Vec<_> = trace
            .entries()
            .iter()
            .filter(|e| e.backend == BackendId::Conan)
            .collect();
        assert_eq!(conan_entries.len(), 1);
        assert!(matches!(
            conan_entries[0].outcome,
            TraceOutcome::PreferredUnavailable { .. }
        ));
        assert!(trace.lines()[0].starts_with("conan: preferred but unavailable"));
    }

    #[test]
    fn test_reselection_never_repeats() {
        let detection = detection(BackendId::ALL.into_iter().map(up).collect());
        let mut trace = AttemptTrace::new();
        let mut engine = SelectionEngine::new(&detection, Some(BackendId::Vcpkg));

        let mut seen = Vec::new();
        while let Some(id) = engine.next(&mut trace) {
            seen.push(id);
            assert!(engine.remaining(&trace).iter().all(|r| *r != id));
        }
        assert_eq!(seen, vec![BackendId::Vcpkg, BackendId::Conan, BackendId::Fetch]);
        assert_eq!(trace.len(), 3);
    }

    #[test]
    fn test_nothing_available() {
        let detection = detection(BackendId::ALL.into_iter().map(down).collect());
        let mut trace = AttemptTrace::new();
        let mut engine = SelectionEngine::new(&detection, None);

        assert_eq!(engine.next(&mut trace), None);
        assert_eq!(trace.len(), 3);
        assert_eq!(engine.next(&mut trace), None);
        assert_eq!(trace.len(), 3);
    }

    #[test]
    fn test_unregistered_preference() {
        let detection = detection(vec![up(BackendId::Conan)]);
        let mut trace = AttemptTrace::new();
        let mut engine = SelectionEngine::new(&detection, Some(BackendId::Fetch));

        assert_eq!(engine.next(&mut trace), Some(BackendId::Conan));
        assert_eq!(
            trace.lines()[0],
            "fetch: preferred but unavailable (not registered)"
        );
    }
}
