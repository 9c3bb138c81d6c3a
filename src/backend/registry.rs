//! Backend registry.
//!
//! Construction never probes anything: availability is checked when an
//! attempt needs it. Backends are kept in ascending rank order, and the
//! registry is never mutated after it is built.

use thiserror::Error;

use crate::backend::conan::ConanBackend;
use crate::backend::fetch::FetchBackend;
use crate::backend::vcpkg::VcpkgBackend;
use crate::backend::Backend;
use crate::core::BackendId;
use crate::util::config::Config;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("backend `{0}` registered twice")]
    Duplicate(BackendId),
}

/// Ordered set of backends consulted by the orchestrator.
pub struct BackendRegistry {
    backends: Vec<Box<dyn Backend>>,
}

impl BackendRegistry {
    /// All built-in backends, configured from `config`.
    pub fn builtin(config: &Config) -> Self {
        BackendRegistry {
            backends: vec![
                Box::new(ConanBackend::new(config.conan.clone())),
                Box::new(VcpkgBackend::new(config.vcpkg.clone())),
                Box::new(FetchBackend::new()),
            ],
        }
    }

    /// Build a registry from arbitrary backends, sorted by rank.
    pub fn with_backends(mut backends: Vec<Box<dyn Backend>>) -> Result<Self, RegistryError> {
        backends.sort_by_key(|b| b.identity().rank);

        for pair in backends.windows(2) {
            if pair[0].id() == pair[1].id() {
                return Err(RegistryError::Duplicate(pair[0].id()));
            }
        }

        Ok(BackendRegistry { backends })
    }

    /// Get a backend by ID.
    pub fn get(&self, id: BackendId) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.id() == id)
            .map(|b| b.as_ref())
    }

    /// Backends in ascending rank order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Backend> + '_ {
        self.backends.iter().map(|b| b.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = BackendId> + '_ {
        self.backends.iter().map(|b| b.id())
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn contains(&self, id: BackendId) -> bool {
        self.get(id).is_some()
    }
}
