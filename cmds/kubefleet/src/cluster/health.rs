//! Per-cluster health checks.

use std::fmt;

use k8s_openapi::api::core::v1::Node;
use kube::{
	api::{Api, ListParams},
	Client,
};
use serde::Serialize;
use tracing::{debug, instrument};

use super::selector::summarize_nodes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
	Healthy,
	Degraded,
	Unhealthy,
}

impl fmt::Display for HealthStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HealthStatus::Healthy => write!(f, "healthy"),
			HealthStatus::Degraded => write!(f, "degraded"),
			HealthStatus::Unhealthy => write!(f, "unhealthy"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthInfo {
	pub cluster: String,
	pub status: HealthStatus,
	/// `ready/total`, empty when nodes could not be listed.
	pub nodes_ready: String,
	pub api_server: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	pub message: String,
}

impl HealthInfo {
	/// A cluster whose API server could not be reached at all.
	pub fn unreachable(cluster: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			cluster: cluster.into(),
			status: HealthStatus::Unhealthy,
			nodes_ready: String::new(),
			api_server: "unreachable".to_string(),
			version: None,
			message: message.into(),
		}
	}
}

/// Classify a cluster from its node readiness counts.
pub fn classify(cluster: &str, version: String, ready: usize, total: usize) -> HealthInfo {
	let (status, message) = if ready < total {
		(
			HealthStatus::Degraded,
			format!("{}/{total} nodes not ready", total - ready),
		)
	} else {
		(HealthStatus::Healthy, "all systems operational".to_string())
	};
	HealthInfo {
		cluster: cluster.to_string(),
		status,
		nodes_ready: format!("{ready}/{total}"),
		api_server: "reachable".to_string(),
		version: Some(version),
		message,
	}
}

/// Check API server reachability, then node readiness.
///
/// Check failures are part of the classification, so this never errors.
#[instrument(skip(client))]
pub async fn check_health(client: Client, cluster: String) -> anyhow::Result<HealthInfo> {
	let version = match client.apiserver_version().await {
		Ok(info) => info.git_version,
		Err(err) => {
			debug!(error = %err, "api server unreachable");
			return Ok(HealthInfo::unreachable(
				cluster,
				format!("api server unreachable: {err}"),
			));
		}
	};

	match Api::<Node>::all(client).list(&ListParams::default()).await {
		Ok(nodes) => {
			let caps = summarize_nodes(&cluster, &nodes.items);
			Ok(classify(&cluster, version, caps.ready_nodes, caps.node_count))
		}
		Err(err) => Ok(HealthInfo {
			cluster,
			status: HealthStatus::Degraded,
			nodes_ready: String::new(),
			api_server: "reachable".to_string(),
			version: Some(version),
			message: format!("failed to list nodes: {err}"),
		}),
	}
}
