//! Core value types: backend identities, requests, manifests and workspaces.

pub mod backend_id;
pub mod dependency_manifest;
pub mod manifest;
pub mod request;
pub mod triple;
pub mod workspace;

pub use backend_id::{BackendId, BackendIdParseError, BackendIdentity, BackendKind};
pub use dependency_manifest::{DependencyManifest, InstalledPackage};
pub use manifest::{Manifest, ManifestError};
pub use request::{DependencyRequirement, ResolutionRequest, VersionConstraint};
pub use triple::{TargetTriple, TripleParseError};
pub use workspace::Workspace;
