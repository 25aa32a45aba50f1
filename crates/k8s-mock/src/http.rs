//! HTTP-based mock Kubernetes server using wiremock.
//!
//! The server keeps an in-memory object store and answers the subset of the
//! API that kubefleet uses: `/version`, GET of single objects and
//! collections, POST (create) and PATCH (server-side apply). Writes bump a
//! per-server `resourceVersion` only when they change the stored object, so
//! repeated applies of the same manifest are observable as no-ops.
//!
//! Collection paths come from the kind table in the `k8s` crate, the same
//! table kubefleet resolves resources with.

use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::helpers::{apply_server_defaults, merge_json, stamp_server_metadata, status_body};

/// Objects keyed by `(collection path, name)` plus the last issued revision.
#[derive(Default)]
struct ObjectStore {
	objects: HashMap<(String, String), Value>,
	revision: u64,
}

impl ObjectStore {
	fn next_revision(&mut self) -> u64 {
		self.revision += 1;
		self.revision
	}
}

type SharedStore = Arc<RwLock<ObjectStore>>;

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Objects to serve as raw manifests. The server derives API paths from
	/// apiVersion/kind.
	#[builder(default)]
	resources: Vec<Value>,
	/// Fill in the list-item defaults a real API server adds on write
	/// (`ports[].protocol`, `containers[].imagePullPolicy`, ...).
	#[builder(default)]
	server_defaults: bool,
	/// Answer every API request with a 500, as a broken control plane would.
	#[builder(default)]
	unavailable: bool,
	#[builder(into, default = String::from("v1.31.0"))]
	git_version: String,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	store: SharedStore,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;

		debug!(uri = %server.uri(), unavailable = self.unavailable, "Started mock K8s server");

		let mut store = ObjectStore::default();
		for mut manifest in self.resources {
			if let Some(key) = api_path_for_manifest(&manifest) {
				trace!(api_path = %key.0, name = %key.1, "Registered resource");
				if self.server_defaults {
					apply_server_defaults(&mut manifest);
				}
				let revision = store.next_revision();
				stamp_server_metadata(&mut manifest, revision);
				store.objects.insert(key, manifest);
			}
		}

		let ns_key = ("/api/v1/namespaces".to_string(), "default".to_string());
		if !store.objects.contains_key(&ns_key) {
			let mut namespace = json!({
				"apiVersion": "v1",
				"kind": "Namespace",
				"metadata": {
					"name": "default"
				}
			});
			let revision = store.next_revision();
			stamp_server_metadata(&mut namespace, revision);
			store.objects.insert(ns_key, namespace);
		}

		let store = Arc::new(RwLock::new(store));

		if self.unavailable {
			mount_unavailable(&server).await;
		}
		mount_version(&server, &self.git_version).await;
		mount_resources(&server, &store, self.server_defaults).await;

		RunningHttpMockK8sServer { server, store }
	}
}

/// Derive the API path for a manifest from its apiVersion and kind.
fn api_path_for_manifest(manifest: &Value) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let namespace = manifest
		.pointer("/metadata/namespace")
		.and_then(Value::as_str);

	let (group, version) = k8s::split_api_version(api_version)?;
	let prefix = if group.is_empty() {
		format!("/api/{version}")
	} else {
		format!("/apis/{group}/{version}")
	};

	let resource = k8s::kind_to_resource(kind);
	let path = if k8s::is_cluster_scoped(kind) {
		format!("{prefix}/{resource}")
	} else {
		let ns = namespace.unwrap_or(k8s::DEFAULT_NAMESPACE);
		format!("{prefix}/namespaces/{ns}/{resource}")
	};

	Some((path, name))
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let (cluster, context, user) = self.named_entries(context_name);
		Kubeconfig {
			clusters: vec![cluster],
			contexts: vec![context],
			auth_infos: vec![user],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// The cluster, context and user entries describing this server.
	///
	/// Entry names are derived from the context name so that entries for
	/// several servers can live in one kubeconfig.
	pub fn named_entries(&self, context_name: &str) -> (NamedCluster, NamedContext, NamedAuthInfo) {
		let cluster_name = format!("{context_name}-cluster");
		let user_name = format!("{context_name}-user");

		let cluster = NamedCluster {
			name: cluster_name.clone(),
			cluster: Some(Cluster {
				server: Some(self.uri()),
				insecure_skip_tls_verify: Some(true),
				..Default::default()
			}),
		};
		let context = NamedContext {
			name: context_name.to_string(),
			context: Some(Context {
				cluster: cluster_name,
				user: Some(user_name.clone()),
				namespace: Some(k8s::DEFAULT_NAMESPACE.to_string()),
				..Default::default()
			}),
		};
		let user = NamedAuthInfo {
			name: user_name,
			auth_info: Some(AuthInfo::default()),
		};
		(cluster, context, user)
	}

	/// Current stored state of an object, looked up the same way a manifest
	/// is registered.
	pub fn object(&self, api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Option<Value> {
		let lookup = json!({
			"apiVersion": api_version,
			"kind": kind,
			"metadata": {"name": name, "namespace": namespace},
		});
		let key = api_path_for_manifest(&lookup)?;
		let store = self.store.read().expect("object store lock poisoned");
		store.objects.get(&key).cloned()
	}

	/// Number of requests received that would mutate state if not dry-run.
	pub async fn write_request_count(&self) -> usize {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.iter()
			.filter(|req| req.method.as_str() != "GET")
			.count()
	}
}

/// Combine several mock servers into one kubeconfig, one context per server.
///
/// The first member becomes the current context.
pub fn fleet_kubeconfig(members: &[(&str, &RunningHttpMockK8sServer)]) -> Kubeconfig {
	let mut kubeconfig = Kubeconfig {
		current_context: members.first().map(|(name, _)| (*name).to_string()),
		..Default::default()
	};
	for (context_name, server) in members {
		let (cluster, context, user) = server.named_entries(context_name);
		kubeconfig.clusters.push(cluster);
		kubeconfig.contexts.push(context);
		kubeconfig.auth_infos.push(user);
	}
	kubeconfig
}

async fn mount_unavailable(server: &MockServer) {
	Mock::given(path_regex(r"^/(api|apis|version)(/.*)?$"))
		.respond_with(
			ResponseTemplate::new(500).set_body_json(status_body(
				500,
				"InternalError",
				"control plane unavailable",
			)),
		)
		.with_priority(1)
		.mount(server)
		.await;
}

async fn mount_version(server: &MockServer, git_version: &str) {
	let (major, minor) = git_version
		.trim_start_matches('v')
		.split('.')
		.fold((None, None), |acc, part| match acc {
			(None, _) => (Some(part.to_string()), None),
			(major, None) => (major, Some(part.to_string())),
			done => done,
		});

	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"major": major.unwrap_or_default(),
			"minor": minor.unwrap_or_default(),
			"gitVersion": git_version,
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-01-01T00:00:00Z",
			"goVersion": "go1.22.0",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

fn list_body(items: Vec<Value>, revision: u64) -> Value {
	json!({
		"kind": "List",
		"apiVersion": "v1",
		"metadata": {"resourceVersion": revision.to_string()},
		"items": items
	})
}

async fn mount_resources(server: &MockServer, store: &SharedStore, server_defaults: bool) {
	let patch_store = Arc::clone(store);
	let post_store = Arc::clone(store);
	let get_store = Arc::clone(store);

	// Server-side apply: merge into the stored object, creating it if absent.
	Mock::given(method("PATCH"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let is_dry_run = req.url.query().unwrap_or("").contains("dryRun");
			let key = parse_resource_path(req.url.path());

			let patch: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);

			let mut store = patch_store.write().expect("object store lock poisoned");
			let existing = store.objects.get(&key).cloned();
			let mut merged = match &existing {
				Some(existing) => merge_json(existing.clone(), patch),
				None => patch,
			};
			if server_defaults {
				apply_server_defaults(&mut merged);
			}

			if existing.as_ref() == Some(&merged) {
				return ResponseTemplate::new(200).set_body_json(merged);
			}

			let revision = if is_dry_run {
				store.revision + 1
			} else {
				store.next_revision()
			};
			stamp_server_metadata(&mut merged, revision);

			if !is_dry_run {
				store.objects.insert(key, merged.clone());
			}

			let status = if existing.is_some() { 200 } else { 201 };
			ResponseTemplate::new(status).set_body_json(merged)
		})
		.mount(server)
		.await;

	// Create: reject duplicates the way the API server does.
	Mock::given(method("POST"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let is_dry_run = req.url.query().unwrap_or("").contains("dryRun");

			let mut body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
			let name = body
				.pointer("/metadata/name")
				.and_then(Value::as_str)
				.unwrap_or_default()
				.to_string();
			if name.is_empty() {
				return ResponseTemplate::new(422).set_body_json(status_body(
					422,
					"Invalid",
					"metadata.name: Required value",
				));
			}

			let key = (req.url.path().trim_end_matches('/').to_string(), name.clone());
			let mut store = post_store.write().expect("object store lock poisoned");
			if store.objects.contains_key(&key) {
				return ResponseTemplate::new(409).set_body_json(status_body(
					409,
					"AlreadyExists",
					&format!("\"{name}\" already exists"),
				));
			}

			let revision = if is_dry_run {
				store.revision + 1
			} else {
				store.next_revision()
			};
			if server_defaults {
				apply_server_defaults(&mut body);
			}
			stamp_server_metadata(&mut body, revision);
			if !is_dry_run {
				store.objects.insert(key, body.clone());
			}

			ResponseTemplate::new(201).set_body_json(body)
		})
		.mount(server)
		.await;

	// GET: a single object, a namespaced collection, or a cluster-wide collection.
	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let path_str = req.url.path().trim_end_matches('/');
			let store = get_store.read().expect("object store lock poisoned");

			let key = parse_resource_path(path_str);
			if let Some(object) = store.objects.get(&key) {
				return ResponseTemplate::new(200).set_body_json(object.clone());
			}

			let mut items: Vec<_> = store
				.objects
				.iter()
				.filter(|((api_path, _), _)| {
					api_path == path_str
						|| extract_cluster_wide_path(api_path).as_deref() == Some(path_str)
				})
				.collect();
			items.sort_by(|a, b| a.0.cmp(b.0));
			let items: Vec<Value> = items.into_iter().map(|(_, v)| v.clone()).collect();

			let is_collection = path_str
				.rsplit('/')
				.next()
				.is_some_and(k8s::is_known_resource);

			if !items.is_empty() || is_collection {
				return ResponseTemplate::new(200).set_body_json(list_body(items, store.revision));
			}

			ResponseTemplate::new(404).set_body_json(status_body(404, "NotFound", "not found"))
		})
		.mount(server)
		.await;
}

/// Parse a Kubernetes API path into (collection path, object name).
///
/// Examples:
/// - `/api/v1/namespaces/default/configmaps/my-config` -> (`/api/v1/namespaces/default/configmaps`, `my-config`)
/// - `/api/v1/namespaces/my-ns` -> (`/api/v1/namespaces`, `my-ns`)
fn parse_resource_path(path: &str) -> (String, String) {
	let path = path.trim_end_matches('/');
	match path.rsplit_once('/') {
		Some((api_path, name)) => (api_path.to_string(), name.to_string()),
		None => (path.to_string(), String::new()),
	}
}

/// Extract a cluster-wide path from a namespaced API path.
///
/// Examples:
/// - `/api/v1/namespaces/default/configmaps` -> Some(`/api/v1/configmaps`)
/// - `/api/v1/namespaces` -> None
fn extract_cluster_wide_path(path: &str) -> Option<String> {
	let (before_ns, after_ns) = path.split_once("/namespaces/")?;
	let slash_idx = after_ns.find('/')?;
	Some(format!("{before_ns}{}", &after_ns[slash_idx..]))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_resource_path() {
		assert_eq!(
			parse_resource_path("/apis/apps/v1/namespaces/default/deployments/web"),
			(
				"/apis/apps/v1/namespaces/default/deployments".to_string(),
				"web".to_string()
			)
		);
	}

	#[test]
	fn test_cluster_wide_path() {
		assert_eq!(
			extract_cluster_wide_path("/apis/apps/v1/namespaces/prod/deployments").as_deref(),
			Some("/apis/apps/v1/deployments")
		);
		assert_eq!(extract_cluster_wide_path("/api/v1/nodes"), None);
	}

	#[test]
	fn test_manifest_paths() {
		let node = json!({"apiVersion": "v1", "kind": "Node", "metadata": {"name": "n1"}});
		assert_eq!(
			api_path_for_manifest(&node),
			Some(("/api/v1/nodes".to_string(), "n1".to_string()))
		);
		let cm = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "c"}});
		assert_eq!(
			api_path_for_manifest(&cm),
			Some(("/api/v1/namespaces/default/configmaps".to_string(), "c".to_string()))
		);
		let role = json!({
			"apiVersion": "rbac.authorization.k8s.io/v1",
			"kind": "ClusterRole",
			"metadata": {"name": "viewer"}
		});
		assert_eq!(
			api_path_for_manifest(&role),
			Some(("/apis/rbac.authorization.k8s.io/v1/clusterroles".to_string(), "viewer".to_string()))
		);
		let broken = json!({"apiVersion": "a/b/c", "kind": "ConfigMap", "metadata": {"name": "c"}});
		assert_eq!(api_path_for_manifest(&broken), None);
	}
}
