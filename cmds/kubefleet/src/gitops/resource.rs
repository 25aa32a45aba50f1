//! Mapping declared objects onto dynamic API endpoints.
//!
//! Collection names come from the fixed kind table in the `k8s` crate rather
//! than from API discovery, so one lookup serves every cluster without a
//! discovery round-trip per run.

use kube::{
	api::{Api, DynamicObject},
	core::GroupVersionKind,
	discovery::ApiResource,
	Client,
};
use thiserror::Error;
use tracing::debug;

use super::manifest::Manifest;

#[derive(Debug, Error)]
pub enum ResourceError {
	#[error("unsupported resource {kind}: invalid apiVersion `{api_version}`")]
	InvalidApiVersion { api_version: String, kind: String },
}

/// Create a GroupVersionKind from an apiVersion string and kind.
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> Option<GroupVersionKind> {
	let (group, version) = k8s::split_api_version(api_version)?;
	Some(GroupVersionKind::gvk(group, version, kind))
}

pub fn api_resource(manifest: &Manifest) -> Result<ApiResource, ResourceError> {
	let gvk = gvk_from_api_version(&manifest.api_version, &manifest.kind).ok_or_else(|| {
		ResourceError::InvalidApiVersion {
			api_version: manifest.api_version.clone(),
			kind: manifest.kind.clone(),
		}
	})?;
	let plural = k8s::kind_to_resource(&manifest.kind);
	if !k8s::is_known_kind(&manifest.kind) {
		debug!(kind = %manifest.kind, %plural, "kind not in resource table, guessing collection name");
	}
	Ok(ApiResource::from_gvk_with_plural(&gvk, &plural))
}

/// Dynamic API scoped to the manifest's effective namespace.
pub fn dynamic_api(client: &Client, manifest: &Manifest) -> Result<Api<DynamicObject>, ResourceError> {
	let ar = api_resource(manifest)?;
	Ok(match manifest.namespace() {
		Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
		None => Api::all_with(client.clone(), &ar),
	})
}
