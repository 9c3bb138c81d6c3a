//! The resolution state machine.
//!
//! One attempt runs `Init -> Detecting -> Selecting -> Resolving ->
//! LockVerifying -> Succeeded`. A failed resolve goes back to `Selecting`
//! with that backend excluded; running out of candidates ends in `Failed`.
//! Detection happens once per attempt and resolves run one at a time.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use super::detect::{detect_all, panic_message};
use super::errors::AttemptError;
use super::select::SelectionEngine;
use super::trace::{AttemptTrace, ResolutionOutcome};
use crate::backend::{Backend, BackendError, BackendRegistry};
use crate::core::{BackendId, DependencyManifest, ResolutionRequest, Workspace};
use crate::lock;
use crate::util::cancel::CancelToken;
use crate::util::config::Config;

/// Orchestrator states, reported to the observer on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Detecting,
    Selecting,
    Resolving(BackendId),
    LockVerifying(BackendId),
    Succeeded,
    Failed,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeeded | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Init => write!(f, "init"),
            State::Detecting => write!(f, "detecting backends"),
            State::Selecting => write!(f, "selecting a backend"),
            State::Resolving(id) => write!(f, "resolving with {}", id),
            State::LockVerifying(id) => write!(f, "verifying {} lock", id),
            State::Succeeded => write!(f, "succeeded"),
            State::Failed => write!(f, "failed"),
        }
    }
}

/// Knobs for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptOptions {
    /// Deadline for each backend `resolve` call
    pub timeout: Option<Duration>,
    /// Extra tries on `NetworkUnavailable`, per backend
    pub network_retries: u32,
}

impl AttemptOptions {
    pub fn from_config(config: &Config) -> Self {
        AttemptOptions {
            timeout: config.resolve_timeout(),
            network_retries: config.network_retries(),
        }
    }
}

type Observer<'a> = Box<dyn Fn(&State) + Send + Sync + 'a>;

/// Drives one resolution attempt over a registry.
pub struct Orchestrator<'a> {
    registry: &'a BackendRegistry,
    options: AttemptOptions,
    observer: Option<Observer<'a>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(registry: &'a BackendRegistry) -> Self {
        Orchestrator {
            registry,
            options: AttemptOptions::default(),
            observer: None,
        }
    }

    pub fn with_options(mut self, options: AttemptOptions) -> Self {
        self.options = options;
        self
    }

    /// Call `observer` on every state transition.
    pub fn with_observer(mut self, observer: impl Fn(&State) + Send + Sync + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn enter(&self, state: State) {
        tracing::debug!("state: {}", state);
        if let Some(observer) = &self.observer {
            observer(&state);
        }
    }

    /// Run one attempt.
    ///
    /// Per-backend failures, timeouts included, fall back to the next
    /// candidate. Cancelling `cancel` itself aborts the whole attempt.
    pub fn resolve(
        &self,
        ws: &Workspace,
        request: &ResolutionRequest,
        cancel: &CancelToken,
    ) -> Result<ResolutionOutcome, AttemptError> {
        self.enter(State::Init);

        self.enter(State::Detecting);
        let detection = detect_all(self.registry, ws);

        self.enter(State::Selecting);
        let mut trace = AttemptTrace::new();
        let mut engine = SelectionEngine::new(&detection, request.preferred());

        loop {
            if cancel.is_cancelled() {
                self.enter(State::Failed);
                return Err(AttemptError::Cancelled { trace });
            }

            let Some(id) = engine.next(&mut trace) else {
                break;
            };
            let Some(backend) = self.registry.get(id) else {
                trace.mark_failed(id, BackendError::NotInstalled { tool: id.to_string() });
                continue;
            };

            self.enter(State::Resolving(id));
            tracing::info!("resolving {} dependencies with {}", request.dependencies().len(), id);

            match self.attempt(backend, ws, request, cancel) {
                Ok(manifest) => {
                    self.enter(State::LockVerifying(id));
                    let report = lock::reconcile(ws, backend, &manifest);
                    self.enter(State::Succeeded);
                    return Ok(ResolutionOutcome {
                        backend: id,
                        manifest,
                        trace,
                        lock: report.record,
                        lock_written: report.written,
                        warnings: report.warnings,
                    });
                }
                Err(error) => {
                    tracing::debug!("{} failed: {}", id, error);
                    trace.mark_failed(id, error);
                    if cancel.is_cancelled() {
                        self.enter(State::Failed);
                        return Err(AttemptError::Cancelled { trace });
                    }
                    self.enter(State::Selecting);
                }
            }
        }

        self.enter(State::Failed);
        if trace.failures().next().is_none() {
            Err(AttemptError::NoBackendAvailable { trace })
        } else {
            Err(AttemptError::AllBackendsFailed { trace })
        }
    }

    /// Resolve with one backend, retrying transient network failures.
    fn attempt(
        &self,
        backend: &dyn Backend,
        ws: &Workspace,
        request: &ResolutionRequest,
        cancel: &CancelToken,
    ) -> Result<DependencyManifest, BackendError> {
        let mut retries_left = self.options.network_retries;

        loop {
            let token = match self.options.timeout {
                Some(timeout) => cancel.with_timeout(timeout),
                None => cancel.clone(),
            };

            let result = panic::catch_unwind(AssertUnwindSafe(|| backend.resolve(ws, request, &token)))
                .unwrap_or_else(|payload| {
                    Err(BackendError::resolution_failed(format!(
                        "backend panicked: {}",
                        panic_message(&*payload)
                    )))
                });

            match result {
                Err(error) if error.is_transient() && retries_left > 0 && !cancel.is_cancelled() => {
                    retries_left -= 1;
                    tracing::info!("{}: {}; retrying ({} left)", backend.id(), error, retries_left);
                }
                Err(error) => return Err(error),
                Ok(manifest) => return check_satisfied(manifest, request),
            }
        }
    }
}

/// Reject a manifest that does not cover the request.
fn check_satisfied(
    manifest: DependencyManifest,
    request: &ResolutionRequest,
) -> Result<DependencyManifest, BackendError> {
    let problems = manifest.unsatisfied(request);
    if problems.is_empty() {
        Ok(manifest)
    } else {
        Err(BackendError::resolution_failed(problems.join("; ")))
    }
}
