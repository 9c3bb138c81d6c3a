//! High-level operations.
//!
//! This module contains the implementation of mooring commands.

pub mod backends;
pub mod locks;
pub mod resolve;

pub use backends::{backend_status, backend_statuses, format_statuses, BackendStatus};
pub use locks::{check_locks, format_lock_check, LockCheck, LockSummary};
pub use resolve::{resolve_with_registry, resolve_workspace, ResolveOptions, ResolveResult};
