//! Mooring - a dependency-resolution coordinator for C++ package managers
//!
//! This crate picks one of several package-management backends (Conan,
//! vcpkg, or a git-based header fetcher), resolves a project's dependencies
//! with it, falls back through the others on failure, and keeps a lock file
//! per backend so that dependency drift shows up in review.

pub mod backend;
pub mod coordinator;
pub mod core;
pub mod lock;
pub mod ops;
pub mod util;

/// Test utilities and mocks for mooring unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides a scripted backend and workspace fixtures.
#[cfg(test)]
pub mod test_support;

pub use backend::{Backend, BackendError, BackendRegistry};
pub use coordinator::{AttemptError, Orchestrator, ResolutionOutcome};
pub use core::{BackendId, DependencyManifest, Manifest, ResolutionRequest, Workspace};
pub use util::context::GlobalContext;
