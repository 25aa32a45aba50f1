//! Helper functions for the mock object store.

use serde_json::{json, Value};

/// Deep merge two JSON values (patch into base).
///
/// Objects merge key by key; anything else in the patch replaces the base,
/// which matches how an apply patch treats lists without merge keys.
pub fn merge_json(base: Value, patch: Value) -> Value {
	match (base, patch) {
		(Value::Object(mut base_map), Value::Object(patch_map)) => {
			for (key, patch_value) in patch_map {
				let base_value = base_map.remove(&key).unwrap_or(Value::Null);
				base_map.insert(key, merge_json(base_value, patch_value));
			}
			Value::Object(base_map)
		}
		(_, patch) => patch,
	}
}

/// Stamp the server-owned metadata onto an object.
///
/// `uid` and `creationTimestamp` are only written when absent so that an
/// object keeps its identity across updates.
pub fn stamp_server_metadata(object: &mut Value, resource_version: u64) {
	let Some(root) = object.as_object_mut() else {
		return;
	};
	let metadata = root
		.entry("metadata")
		.or_insert_with(|| json!({}))
		.as_object_mut();
	let Some(metadata) = metadata else {
		return;
	};
	metadata.insert(
		"resourceVersion".to_string(),
		Value::String(resource_version.to_string()),
	);
	metadata
		.entry("uid")
		.or_insert_with(|| Value::String(format!("00000000-0000-0000-0000-{resource_version:012}")));
	metadata
		.entry("creationTimestamp")
		.or_insert_with(|| Value::String("2024-01-01T00:00:00Z".to_string()));
}

fn default_ports(ports: Option<&mut Value>, target_port: bool) {
	for port in ports.and_then(Value::as_array_mut).into_iter().flatten() {
		let Some(port) = port.as_object_mut() else {
			continue;
		};
		port.entry("protocol").or_insert_with(|| json!("TCP"));
		if target_port {
			if let Some(number) = port.get("port").cloned() {
				port.entry("targetPort").or_insert(number);
			}
		}
	}
}

fn default_containers(pod_spec: Option<&mut Value>) {
	let containers = pod_spec
		.and_then(|spec| spec.get_mut("containers"))
		.and_then(Value::as_array_mut);
	for container in containers.into_iter().flatten() {
		let Some(fields) = container.as_object_mut() else {
			continue;
		};
		fields
			.entry("imagePullPolicy")
			.or_insert_with(|| json!("IfNotPresent"));
		fields
			.entry("terminationMessagePath")
			.or_insert_with(|| json!("/dev/termination-log"));
		default_ports(fields.get_mut("ports"), false);
	}
}

/// Fill in fields the API server defaults on write, including inside list
/// items, for Services, Pods and workload templates.
pub fn apply_server_defaults(object: &mut Value) {
	let kind = object
		.get("kind")
		.and_then(Value::as_str)
		.unwrap_or_default()
		.to_string();
	let Some(spec) = object.get_mut("spec") else {
		return;
	};
	match kind.as_str() {
		"Service" => {
			default_ports(spec.get_mut("ports"), true);
			if let Some(spec) = spec.as_object_mut() {
				spec.entry("type").or_insert_with(|| json!("ClusterIP"));
			}
		}
		"Pod" => default_containers(Some(spec)),
		"Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Job" => {
			if kind == "Deployment" {
				if let Some(spec) = spec.as_object_mut() {
					spec.entry("revisionHistoryLimit").or_insert_with(|| json!(10));
				}
			}
			default_containers(spec.pointer_mut("/template/spec"));
		}
		_ => {}
	}
}

/// A `Status` body as returned by the API server for failed requests.
pub fn status_body(code: u16, reason: &str, message: &str) -> Value {
	json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_replaces_lists() {
		let base = json!({"spec": {"replicas": 1, "ports": [1, 2]}});
		let patch = json!({"spec": {"ports": [3]}});
		assert_eq!(
			merge_json(base, patch),
			json!({"spec": {"replicas": 1, "ports": [3]}})
		);
	}

	#[test]
	fn test_server_defaults_reach_list_items() {
		let mut service = json!({
			"kind": "Service",
			"spec": {"ports": [{"port": 80}, {"port": 53, "protocol": "UDP"}]}
		});
		apply_server_defaults(&mut service);
		assert_eq!(
			service["spec"],
			json!({
				"type": "ClusterIP",
				"ports": [
					{"port": 80, "protocol": "TCP", "targetPort": 80},
					{"port": 53, "protocol": "UDP", "targetPort": 53}
				]
			})
		);

		let mut deployment = json!({
			"kind": "Deployment",
			"spec": {"template": {"spec": {"containers": [{"name": "web", "image": "nginx"}]}}}
		});
		apply_server_defaults(&mut deployment);
		assert_eq!(deployment["spec"]["revisionHistoryLimit"], 10);
		assert_eq!(
			deployment["spec"]["template"]["spec"]["containers"][0]["imagePullPolicy"],
			"IfNotPresent"
		);
	}

	#[test]
	fn test_stamp_keeps_uid() {
		let mut object = json!({"metadata": {"name": "a", "uid": "fixed"}});
		stamp_server_metadata(&mut object, 7);
		assert_eq!(object["metadata"]["resourceVersion"], "7");
		assert_eq!(object["metadata"]["uid"], "fixed");
	}
}
