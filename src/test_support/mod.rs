//! Test utilities and mocks for mooring unit tests.
//!
//! [`MockBackend`] stands in for a real package manager: it reports a fixed
//! availability and plays back a script of resolve outcomes, counting how
//! often it was asked.
//!
//! # Example
//!
//! ```rust,ignore
//! use mooring::test_support::{MockBackend, Step};
//!
//! let conan = MockBackend::available(BackendId::Conan)
//!     .with_script(vec![Step::network_down(), Step::resolve(&[("fmt", "10.2.1")])]);
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::{Availability, AvailabilityReport, Backend, BackendError, UnavailableReason};
use crate::core::{
    BackendId, BackendIdentity, DependencyManifest, DependencyRequirement, Manifest,
    ResolutionRequest, Workspace,
};
use crate::util::cancel::CancelToken;

/// One scripted `resolve` outcome.
#[derive(Debug, Clone)]
pub enum Step {
    /// Succeed with these name/version pairs
    Resolve(Vec<(String, String)>),
    /// Fail with this error
    Fail(BackendError),
    /// Block until the cancel token fires
    Hang,
    /// Panic inside `resolve`
    Panic,
}

impl Step {
    pub fn resolve(pairs: &[(&str, &str)]) -> Self {
        Step::Resolve(
            pairs
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        )
    }

    pub fn failed(diagnostic: &str) -> Self {
        Step::Fail(BackendError::resolution_failed(diagnostic))
    }

    pub fn network_down() -> Self {
        Step::Fail(BackendError::NetworkUnavailable {
            detail: "connection refused".to_string(),
        })
    }
}

/// A scripted backend.
pub struct MockBackend {
    id: BackendId,
    availability: Availability,
    script: Mutex<VecDeque<Step>>,
    /// Played once the script is exhausted
    fallback: Step,
    calls: Arc<AtomicUsize>,
    detect_panics: bool,
}

impl MockBackend {
    /// A usable backend that resolves to an empty manifest.
    pub fn available(id: BackendId) -> Self {
        MockBackend {
            id,
            availability: Availability::Available {
                version: Some("1.0.0".to_string()),
            },
            script: Mutex::new(VecDeque::new()),
            fallback: Step::Resolve(Vec::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            detect_panics: false,
        }
    }

    /// A backend whose tool is missing.
    pub fn unavailable(id: BackendId) -> Self {
        let mut backend = Self::available(id);
        backend.availability = Availability::Unavailable(UnavailableReason::NotInstalled {
            tool: id.as_str().to_string(),
            install_hint: "Install it.".to_string(),
        });
        backend
    }

    /// Always resolve to these pairs.
    pub fn resolving(mut self, pairs: &[(&str, &str)]) -> Self {
        self.fallback = Step::resolve(pairs);
        self
    }

    /// Always fail with `error`.
    pub fn failing(mut self, error: BackendError) -> Self {
        self.fallback = Step::Fail(error);
        self
    }

    /// Play `steps` in order before falling back to the default outcome.
    pub fn with_script(self, steps: Vec<Step>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(steps);
        }
        self
    }

    /// Never finish until cancelled or timed out.
    pub fn hanging(mut self) -> Self {
        self.fallback = Step::Hang;
        self
    }

    /// Panic during `detect`.
    pub fn panicking_detect(mut self) -> Self {
        self.detect_panics = true;
        self
    }

    /// Handle on the `resolve` call count that survives boxing.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Backend for MockBackend {
    fn identity(&self) -> &'static BackendIdentity {
        self.id.identity()
    }

    fn detect(&self, _ws: &Workspace) -> AvailabilityReport {
        if self.detect_panics {
            panic!("probe for {} exploded", self.id);
        }
        AvailabilityReport {
            backend: self.id,
            availability: self.availability.clone(),
        }
    }

    fn resolve(
        &self,
        _ws: &Workspace,
        request: &ResolutionRequest,
        cancel: &CancelToken,
    ) -> Result<DependencyManifest, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.next_step() {
            Step::Resolve(pairs) => {
                let mut manifest = DependencyManifest::new(self.id, request.platform().clone());
                for (name, version) in pairs {
                    let location = format!("/mock/{}/{}", self.id, name);
                    manifest.insert(name, version, location);
                }
                Ok(manifest)
            }
            Step::Fail(error) => Err(error),
            Step::Hang => loop {
                if let Some(interrupt) = cancel.check() {
                    return Err(interrupt.into());
                }
                std::thread::sleep(Duration::from_millis(5));
            },
            Step::Panic => panic!("{} resolve exploded", self.id),
        }
    }
}

/// A workspace rooted at `dir` requesting `deps` (name, constraint).
pub fn workspace(dir: &Path, deps: &[(&str, &str)]) -> Workspace {
    Workspace::from_parts(
        dir.to_path_buf(),
        Manifest {
            name: "app".to_string(),
            version: Some("0.1.0".to_string()),
            dependencies: deps
                .iter()
                .map(|(name, constraint)| DependencyRequirement::new(*name, constraint))
                .collect(),
        },
    )
}
