//! Declared state: manifest sources, drift detection and sync.

mod drift;
mod manifest;
mod reconcile;
mod resource;
mod source;
mod sync;

pub use drift::{compare, DriftDetector, DriftResult, DriftType};
pub use manifest::{parse_documents, Manifest, ManifestError, ManifestSet, ResourceKey};
pub use reconcile::{
	ClusterError, DriftReport, DriftRequest, ReconcileError, Reconciler, SyncReport, SyncRequest,
};
pub use resource::{api_resource, dynamic_api, gvk_from_api_version, ResourceError};
pub use source::{read_tree, ManifestSource, SourceError};
pub use sync::{SyncAction, SyncOptions, SyncResult, SyncSummary, Syncer};
