//! Shared Kubernetes knowledge used by kubefleet and its mock API server.
//!
//! Everything here is static: lookup tables for kinds, scopes and
//! platform-managed fields, plus [`Quantity`] arithmetic for resource
//! amounts such as `500m` or `16Gi`.

pub mod quantity;

use phf::{phf_map, phf_set};

pub use quantity::{Quantity, QuantityError};

/// Well-known kinds and their REST collection names.
static KIND_RESOURCES: phf::Map<&'static str, &'static str> = phf_map! {
	"Deployment" => "deployments",
	"Service" => "services",
	"ConfigMap" => "configmaps",
	"Secret" => "secrets",
	"Pod" => "pods",
	"StatefulSet" => "statefulsets",
	"DaemonSet" => "daemonsets",
	"ReplicaSet" => "replicasets",
	"Job" => "jobs",
	"CronJob" => "cronjobs",
	"Ingress" => "ingresses",
	"ServiceAccount" => "serviceaccounts",
	"Role" => "roles",
	"RoleBinding" => "rolebindings",
	"ClusterRole" => "clusterroles",
	"ClusterRoleBinding" => "clusterrolebindings",
	"PersistentVolumeClaim" => "persistentvolumeclaims",
	"PersistentVolume" => "persistentvolumes",
	"Namespace" => "namespaces",
	"NetworkPolicy" => "networkpolicies",
	"HorizontalPodAutoscaler" => "horizontalpodautoscalers",
	"Node" => "nodes",
	"StorageClass" => "storageclasses",
	"PriorityClass" => "priorityclasses",
	"CustomResourceDefinition" => "customresourcedefinitions",
};

/// Kinds that live outside any namespace.
static CLUSTER_SCOPED_KINDS: phf::Set<&'static str> = phf_set! {
	"Namespace",
	"Node",
	"PersistentVolume",
	"ClusterRole",
	"ClusterRoleBinding",
	"CustomResourceDefinition",
	"StorageClass",
	"PriorityClass",
};

/// Fields written by the platform rather than by whoever declared the object.
static SYSTEM_MANAGED_FIELDS: phf::Set<&'static str> = phf_set! {
	"resourceVersion",
	"uid",
	"creationTimestamp",
	"generation",
	"managedFields",
	"selfLink",
	"status",
	"clusterIP",
	"clusterIPs",
	"nodeName",
	"podIP",
	"podIPs",
	"hostIP",
	"hostIPs",
};

/// Extended resource names that denote accelerators.
pub const ACCELERATOR_RESOURCES: &[&str] = &[
	"nvidia.com/gpu",
	"amd.com/gpu",
	"intel.com/gpu",
	"habana.ai/gaudi",
];

/// Node labels that describe where and on what a node runs.
pub const TOPOLOGY_LABELS: &[&str] = &[
	"topology.kubernetes.io/region",
	"topology.kubernetes.io/zone",
	"node.kubernetes.io/instance-type",
	"kubernetes.io/arch",
	"kubernetes.io/os",
];

/// Namespace used for namespaced objects that do not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Map a kind to its REST collection name.
///
/// Unknown kinds fall back to `lowercase(kind) + "s"`, which is wrong for
/// irregular plurals (`Ingress`, `NetworkPolicy`, ...). Extend the table
/// rather than relying on the fallback for such kinds.
pub fn kind_to_resource(kind: &str) -> String {
	match KIND_RESOURCES.get(kind) {
		Some(resource) => (*resource).to_string(),
		None => format!("{}s", kind.to_lowercase()),
	}
}

/// Whether the kind has a fixed mapping (as opposed to the plural fallback).
pub fn is_known_kind(kind: &str) -> bool {
	KIND_RESOURCES.contains_key(kind)
}

/// Whether `resource` is the collection name of a kind in the fixed table.
pub fn is_known_resource(resource: &str) -> bool {
	KIND_RESOURCES.values().any(|known| *known == resource)
}

pub fn is_cluster_scoped(kind: &str) -> bool {
	CLUSTER_SCOPED_KINDS.contains(kind)
}

pub fn is_system_managed_field(field: &str) -> bool {
	SYSTEM_MANAGED_FIELDS.contains(field)
}

pub fn is_accelerator_resource(resource_name: &str) -> bool {
	ACCELERATOR_RESOURCES.contains(&resource_name)
}

pub fn is_topology_label(key: &str) -> bool {
	TOPOLOGY_LABELS.contains(&key)
}

/// Split an `apiVersion` into `(group, version)`.
///
/// Core resources (`v1`) have an empty group. Returns `None` for empty input
/// or anything with more than one `/`.
pub fn split_api_version(api_version: &str) -> Option<(&str, &str)> {
	if api_version.is_empty() {
		return None;
	}
	match api_version.split_once('/') {
		Some((group, version)) => {
			if group.is_empty() || version.is_empty() || version.contains('/') {
				None
			} else {
				Some((group, version))
			}
		}
		None => Some(("", api_version)),
	}
}
