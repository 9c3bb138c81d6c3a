//! Per-backend lock files and their reconciliation.

pub mod reconcile;
pub mod record;
pub mod store;

pub use reconcile::{cross_check, reconcile, LockReport, LockWarning, PackageChange};
pub use record::{LockFileError, LockRecord, LockedPackage, LOCK_VERSION};
pub use store::{read_lock, write_lock};
