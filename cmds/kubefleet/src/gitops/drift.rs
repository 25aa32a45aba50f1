//! Drift detection between declared manifests and live cluster state.

use std::fmt;

use kube::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{
	manifest::{Manifest, ManifestSet},
	resource::dynamic_api,
};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftType {
	/// Declared but absent from the cluster.
	Missing,
	/// Present with field-level differences.
	Modified,
	/// Present in the cluster but not declared. Never produced: pruning is
	/// not supported.
	Extra,
}

impl fmt::Display for DriftType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DriftType::Missing => write!(f, "missing"),
			DriftType::Modified => write!(f, "modified"),
			DriftType::Extra => write!(f, "extra"),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftResult {
	pub cluster: String,
	pub resource_key: String,
	pub kind: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	pub name: String,
	pub drift_type: DriftType,
	pub differences: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub declared: Option<serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub observed: Option<serde_json::Value>,
}

impl DriftResult {
	fn new(cluster: &str, manifest: &Manifest, drift_type: DriftType, differences: Vec<String>) -> Self {
		Self {
			cluster: cluster.to_string(),
			resource_key: manifest.key().to_string(),
			kind: manifest.kind.clone(),
			namespace: manifest.namespace().map(str::to_string),
			name: manifest.name.clone(),
			drift_type,
			differences,
			declared: None,
			observed: None,
		}
	}
}

/// Compare a declared manifest against the live object.
///
/// `spec` and `data` are compared structurally when declared; labels are
/// always compared. Fields the platform writes itself never count as drift.
pub fn compare(declared: &Manifest, live: &serde_json::Value) -> Vec<String> {
	let live = Value::from(live.clone());
	let mut differences = Vec::new();

	for (field, expected) in [("spec", &declared.spec), ("data", &declared.data)] {
		let Some(expected) = expected else {
			continue;
		};
		match live.get(field) {
			Some(observed) if !observed.is_null() => differences.extend(
				expected
					.diff(observed, field, &k8s::is_system_managed_field)
					.iter()
					.map(ToString::to_string),
			),
			_ => differences.push(format!("{field}: missing in cluster")),
		}
	}

	let live_labels = live.get("metadata").and_then(|m| m.get("labels"));
	for (key, expected) in &declared.labels {
		match live_labels.and_then(|labels| labels.get(key)) {
			None => differences.push(format!("label {key}: missing in cluster (expected: {expected})")),
			Some(observed) => {
				let observed = observed.as_str().map_or_else(|| observed.to_string(), str::to_string);
				if &observed != expected {
					differences.push(format!("label {key}: {observed} (expected: {expected})"));
				}
			}
		}
	}

	differences
}

/// Detects drift for one cluster.
pub struct DriftDetector {
	client: Client,
	cluster: String,
}

impl DriftDetector {
	pub fn new(client: Client, cluster: impl Into<String>) -> Self {
		Self {
			client,
			cluster: cluster.into(),
		}
	}

	/// Check every manifest in declaration order. In-sync objects produce no
	/// result.
	#[instrument(skip_all, fields(cluster = %self.cluster, manifests = manifests.len()))]
	pub async fn detect(&self, manifests: &ManifestSet) -> Vec<DriftResult> {
		let mut drifts = Vec::new();
		for manifest in manifests {
			if let Some(drift) = self.check(manifest).await {
				drifts.push(drift);
			}
		}
		debug!(drifts = drifts.len(), "drift check complete");
		drifts
	}

	async fn check(&self, manifest: &Manifest) -> Option<DriftResult> {
		let live = match self.fetch(manifest).await {
			Ok(live) => live,
			Err(err) => {
				return Some(DriftResult::new(
					&self.cluster,
					manifest,
					DriftType::Missing,
					vec![format!("error checking resource: {err}")],
				));
			}
		};

		let Some(live) = live else {
			let mut drift = DriftResult::new(
				&self.cluster,
				manifest,
				DriftType::Missing,
				vec!["resource does not exist in cluster".to_string()],
			);
			drift.declared = Some(manifest.raw().clone());
			return Some(drift);
		};

		let differences = compare(manifest, &live);
		if differences.is_empty() {
			return None;
		}

		let mut drift = DriftResult::new(&self.cluster, manifest, DriftType::Modified, differences);
		drift.declared = Some(manifest.raw().clone());
		drift.observed = Some(live);
		Some(drift)
	}

	async fn fetch(&self, manifest: &Manifest) -> anyhow::Result<Option<serde_json::Value>> {
		let api = dynamic_api(&self.client, manifest)?;
		match api.get_opt(&manifest.name).await? {
			Some(object) => Ok(Some(serde_json::to_value(object)?)),
			None => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn deployment(replicas: i64) -> Manifest {
		Manifest::from_json(json!({
			"apiVersion": "apps/v1",
			"kind": "Deployment",
			"metadata": {"name": "web", "labels": {"app": "web", "tier": "front"}},
			"spec": {"replicas": replicas, "template": {"spec": {"containers": [{"name": "web", "image": "nginx"}]}}}
		}))
		.unwrap()
	}

	#[test]
	fn test_replica_drift() {
		let live = json!({
			"metadata": {"name": "web", "labels": {"app": "web", "tier": "front"}, "resourceVersion": "9"},
			"spec": {"replicas": 3, "template": {"spec": {"containers": [{"name": "web", "image": "nginx"}]}}},
			"status": {"readyReplicas": 3}
		});
		assert_eq!(compare(&deployment(2), &live), vec!["spec.replicas: 3 (expected: 2)"]);
	}

	#[test]
	fn test_in_sync_ignores_defaulted_fields() {
		let live = json!({
			"metadata": {"name": "web", "labels": {"app": "web", "tier": "front", "extra": "x"}},
			"spec": {
				"replicas": 2,
				"revisionHistoryLimit": 10,
				"template": {"spec": {"containers": [{"name": "web", "image": "nginx"}]}}
			}
		});
		assert!(compare(&deployment(2), &live).is_empty());
	}

	#[test]
	fn test_missing_payload_and_labels() {
		let live = json!({"metadata": {"name": "web", "labels": {"app": "api"}}});
		assert_eq!(
			compare(&deployment(2), &live),
			vec![
				"spec: missing in cluster",
				"label app: api (expected: web)",
				"label tier: missing in cluster (expected: front)",
			]
		);
	}

	#[test]
	fn test_service_cluster_ip_not_drift() {
		let declared = Manifest::from_json(json!({
			"apiVersion": "v1",
			"kind": "Service",
			"metadata": {"name": "web"},
			"spec": {"clusterIP": "None", "ports": [{"port": 80}]}
		}))
		.unwrap();
		let live = json!({"spec": {"clusterIP": "10.0.0.12", "ports": [{"port": 80}]}});
		assert!(compare(&declared, &live).is_empty());
	}

	#[test]
	fn test_defaulted_list_items_not_drift() {
		let declared = Manifest::from_json(json!({
			"apiVersion": "v1",
			"kind": "Service",
			"metadata": {"name": "web"},
			"spec": {"ports": [{"port": 80}]}
		}))
		.unwrap();
		let live = json!({"spec": {
			"type": "ClusterIP",
			"ports": [{"port": 80, "protocol": "TCP", "targetPort": 80}]
		}});
		assert!(compare(&declared, &live).is_empty());

		let live = json!({"spec": {"ports": [{"port": 8080, "protocol": "TCP"}]}});
		assert_eq!(compare(&declared, &live), vec!["spec.ports[0].port: 8080 (expected: 80)"]);
	}

	#[test]
	fn test_configmap_data() {
		let declared = Manifest::from_json(json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": {"name": "settings"},
			"data": {"mode": "fast", "level": "3"}
		}))
		.unwrap();
		let live = json!({"data": {"mode": "slow"}});
		assert_eq!(
			compare(&declared, &live),
			vec![
				"data.level: missing in cluster",
				r#"data.mode: "slow" (expected: "fast")"#,
			]
		);
	}
}
