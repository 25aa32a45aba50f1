//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::{fs, path::Path, sync::Arc};

use k8s_mock::{fleet_kubeconfig, HttpMockK8sServer, RunningHttpMockK8sServer};
use kubefleet::{
	cluster::{ClusterRegistry, Executor},
	config::FleetConfig,
};
use serde_json::{json, Value};

/// A registry whose clusters are the given mock servers.
pub fn registry(members: &[(&str, &RunningHttpMockK8sServer)]) -> Arc<ClusterRegistry> {
	Arc::new(ClusterRegistry::from_kubeconfig(
		fleet_kubeconfig(members),
		&FleetConfig::default(),
	))
}

pub fn executor(members: &[(&str, &RunningHttpMockK8sServer)]) -> Executor {
	Executor::new(registry(members))
}

pub async fn empty_server() -> RunningHttpMockK8sServer {
	HttpMockK8sServer::builder().build().start().await
}

pub async fn server_with(resources: Vec<Value>) -> RunningHttpMockK8sServer {
	HttpMockK8sServer::builder()
		.resources(resources)
		.build()
		.start()
		.await
}

pub async fn unavailable_server() -> RunningHttpMockK8sServer {
	HttpMockK8sServer::builder()
		.unavailable(true)
		.build()
		.start()
		.await
}

/// A node with the given allocatable resources, capacity equal to them.
pub fn node(name: &str, ready: bool, resources: &[(&str, &str)], labels: &[(&str, &str)]) -> Value {
	let resources: serde_json::Map<String, Value> = resources
		.iter()
		.map(|(k, v)| ((*k).to_string(), json!(v)))
		.collect();
	let labels: serde_json::Map<String, Value> = labels
		.iter()
		.map(|(k, v)| ((*k).to_string(), json!(v)))
		.collect();
	json!({
		"apiVersion": "v1",
		"kind": "Node",
		"metadata": {"name": name, "labels": labels},
		"status": {
			"capacity": resources,
			"allocatable": resources,
			"conditions": [{"type": "Ready", "status": if ready { "True" } else { "False" }}]
		}
	})
}

pub fn deployment(name: &str, replicas: i64) -> Value {
	json!({
		"apiVersion": "apps/v1",
		"kind": "Deployment",
		"metadata": {"name": name, "namespace": "default", "labels": {"app": name}},
		"spec": {
			"replicas": replicas,
			"selector": {"matchLabels": {"app": name}},
			"template": {
				"metadata": {"labels": {"app": name}},
				"spec": {"containers": [{"name": name, "image": "nginx:1.27"}]}
			}
		}
	})
}

pub fn write_files(root: &Path, files: &[(&str, &str)]) {
	for (path, content) in files {
		let path = root.join(path);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).unwrap();
		}
		fs::write(path, content).unwrap();
	}
}
