//! Cluster capacity inventory and workload placement.

use std::{
	collections::{BTreeMap, BTreeSet},
	str::FromStr,
};

use k8s::Quantity;
use k8s_openapi::{api::core::v1::Node, apimachinery::pkg::api::resource::Quantity as RawQuantity};
use kube::{
	api::{Api, ListParams},
	Client,
};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::executor::{ClusterResult, Executor, Target};

type ResourceList = BTreeMap<String, RawQuantity>;

/// What a cluster can run, summed over all of its nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCapabilities {
	pub cluster: String,
	pub node_count: usize,
	pub ready_nodes: usize,
	pub total_cpu: Quantity,
	pub total_memory: Quantity,
	pub allocatable_cpu: Quantity,
	pub allocatable_memory: Quantity,
	/// Allocatable accelerators by resource name.
	pub gpus: BTreeMap<String, i64>,
	/// Distinct values of the topology labels seen across nodes.
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub labels: BTreeMap<String, BTreeSet<String>>,
}

/// Placement predicate for a workload. Every set field must hold.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkloadRequirements {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gpu_type: Option<String>,
	#[serde(default, alias = "minGpus")]
	pub min_gpu: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub min_cpu: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub min_memory: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub node_labels: BTreeMap<String, String>,
}

impl WorkloadRequirements {
	pub fn is_satisfied_by(&self, caps: &ClusterCapabilities) -> bool {
		self.accelerators_met(caps)
			&& minimum_met(self.min_cpu.as_deref(), &caps.allocatable_cpu)
			&& minimum_met(self.min_memory.as_deref(), &caps.allocatable_memory)
			&& self.node_labels.iter().all(|(key, value)| {
				caps.labels
					.get(key)
					.is_some_and(|values| values.contains(value))
			})
	}

	fn accelerators_met(&self, caps: &ClusterCapabilities) -> bool {
		match &self.gpu_type {
			// A named type must be present, even when no minimum is set
			Some(gpu_type) => caps
				.gpus
				.get(gpu_type)
				.is_some_and(|count| *count >= self.min_gpu),
			None if self.min_gpu > 0 => caps.gpus.values().sum::<i64>() >= self.min_gpu,
			None => true,
		}
	}
}

/// Malformed minimums fail closed.
fn minimum_met(required: Option<&str>, available: &Quantity) -> bool {
	match required {
		None => true,
		Some(required) => Quantity::from_str(required).is_ok_and(|required| *available >= required),
	}
}

fn parse_quantity(node: &str, resource: &str, raw: &str) -> Option<Quantity> {
	match Quantity::from_str(raw) {
		Ok(quantity) => Some(quantity),
		Err(err) => {
			warn!(node, resource, value = raw, error = %err, "ignoring malformed node quantity");
			None
		}
	}
}

fn add_resource(total: &mut Quantity, node: &str, resources: Option<&ResourceList>, resource: &str) {
	if let Some(quantity) = resources
		.and_then(|r| r.get(resource))
		.and_then(|raw| parse_quantity(node, resource, &raw.0))
	{
		*total += quantity;
	}
}

fn is_ready(node: &Node) -> bool {
	node.status
		.as_ref()
		.and_then(|status| status.conditions.as_ref())
		.is_some_and(|conditions| {
			conditions
				.iter()
				.any(|c| c.type_ == "Ready" && c.status == "True")
		})
}

/// Summarise a node list.
pub fn summarize_nodes(cluster: &str, nodes: &[Node]) -> ClusterCapabilities {
	let mut caps = ClusterCapabilities {
		cluster: cluster.to_string(),
		node_count: nodes.len(),
		..Default::default()
	};

	for node in nodes {
		let node_name = node.metadata.name.as_deref().unwrap_or_default();
		if is_ready(node) {
			caps.ready_nodes += 1;
		}

		let status = node.status.as_ref();
		let capacity = status.and_then(|s| s.capacity.as_ref());
		let allocatable = status.and_then(|s| s.allocatable.as_ref());

		add_resource(&mut caps.total_cpu, node_name, capacity, "cpu");
		add_resource(&mut caps.total_memory, node_name, capacity, "memory");
		add_resource(&mut caps.allocatable_cpu, node_name, allocatable, "cpu");
		add_resource(&mut caps.allocatable_memory, node_name, allocatable, "memory");

		for (resource, raw) in allocatable.into_iter().flatten() {
			if !k8s::is_accelerator_resource(resource) {
				continue;
			}
			if let Some(q) = parse_quantity(node_name, resource, &raw.0) {
				*caps.gpus.entry(resource.clone()).or_default() += q.value();
			}
		}

		for (key, value) in node.metadata.labels.iter().flatten() {
			if k8s::is_topology_label(key) {
				caps.labels
					.entry(key.clone())
					.or_default()
					.insert(value.clone());
			}
		}
	}

	caps
}

/// List nodes of one cluster and summarise them. Never cached.
#[instrument(skip(client))]
pub async fn capabilities_for_cluster(client: Client, cluster: String) -> anyhow::Result<ClusterCapabilities> {
	use anyhow::Context as _;

	let nodes = Api::<Node>::all(client)
		.list(&ListParams::default())
		.await
		.context("listing nodes")?;
	Ok(summarize_nodes(&cluster, &nodes.items))
}

/// Capability queries and placement built on an [`Executor`].
#[derive(Debug, Clone)]
pub struct Selector {
	executor: Executor,
}

impl Selector {
	pub fn new(executor: Executor) -> Self {
		Self { executor }
	}

	pub async fn cluster_capabilities(&self, target: &Target) -> Vec<ClusterResult<ClusterCapabilities>> {
		self.executor.run(target, capabilities_for_cluster).await
	}

	/// Names of clusters meeting `requirements`, in cluster order. Clusters
	/// whose inventory could not be read are left out.
	#[instrument(skip_all)]
	pub async fn find_clusters_for_workload(
		&self,
		target: &Target,
		requirements: &WorkloadRequirements,
	) -> Vec<String> {
		self.cluster_capabilities(target)
			.await
			.into_iter()
			.filter_map(|result| match result.into_result() {
				Ok(caps) => requirements.is_satisfied_by(&caps).then_some(caps.cluster),
				Err(error) => {
					warn!(%error, "excluding cluster with unknown capabilities");
					None
				}
			})
			.collect()
	}
}
