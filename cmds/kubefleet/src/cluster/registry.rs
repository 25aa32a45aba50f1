//! Known clusters and their API clients.
//!
//! Clusters are the contexts of one kubeconfig, read once when the registry
//! is built. Clients are created lazily on first use and then reused for the
//! lifetime of the registry.

use std::{
	collections::{BTreeMap, HashMap},
	path::Path,
	sync::atomic::{AtomicUsize, Ordering},
	time::Duration,
};

use kube::{
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::config::FleetConfig;

#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("reading kubeconfig")]
	Kubeconfig(#[from] KubeconfigError),

	#[error("unknown cluster `{0}`: no usable context with that name in kubeconfig")]
	UnknownCluster(String),

	#[error("loading connection settings for cluster `{cluster}`")]
	Config {
		cluster: String,
		#[source]
		source: KubeconfigError,
	},

	#[error("building client for cluster `{cluster}`")]
	Client {
		cluster: String,
		#[source]
		source: Box<kube::Error>,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
	/// Context name, used as the cluster's identity everywhere.
	pub name: String,
	pub server: String,
	pub is_current: bool,
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub labels: BTreeMap<String, String>,
}

/// Which known clusters to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterFilter {
	All,
	Named(Vec<String>),
}

pub struct ClusterRegistry {
	kubeconfig: Kubeconfig,
	clusters: Vec<ClusterInfo>,
	read_timeout: Duration,
	handles: RwLock<HashMap<String, Client>>,
	clients_built: AtomicUsize,
}

impl std::fmt::Debug for ClusterRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterRegistry")
			.field("clusters", &self.clusters)
			.field("read_timeout", &self.read_timeout)
			.finish_non_exhaustive()
	}
}

impl ClusterRegistry {
	/// Read the kubeconfig at `path`, else the one named in the config file,
	/// else `$KUBECONFIG` / `~/.kube/config`.
	#[instrument(skip_all)]
	pub fn load(path: Option<&Path>, config: &FleetConfig) -> Result<Self, RegistryError> {
		let kubeconfig = match path.or(config.kubeconfig.as_deref()) {
			Some(path) => {
				debug!(path = %path.display(), "reading kubeconfig");
				Kubeconfig::read_from(path)?
			}
			None => Kubeconfig::read()?,
		};
		Ok(Self::from_kubeconfig(kubeconfig, config))
	}

	pub fn from_kubeconfig(kubeconfig: Kubeconfig, config: &FleetConfig) -> Self {
		let current = kubeconfig.current_context.as_deref();

		let clusters = kubeconfig
			.contexts
			.iter()
			.filter_map(|named| {
				let context = named.context.as_ref()?;
				let cluster = kubeconfig
					.clusters
					.iter()
					.find(|c| c.name == context.cluster)?
					.cluster
					.as_ref()?;
				Some(ClusterInfo {
					name: named.name.clone(),
					server: cluster.server.clone().unwrap_or_default(),
					is_current: current == Some(named.name.as_str()),
					labels: config.cluster_labels(&named.name),
				})
			})
			.collect();

		Self {
			clusters,
			read_timeout: config.api_timeout(),
			handles: RwLock::new(HashMap::new()),
			clients_built: AtomicUsize::new(0),
			kubeconfig,
		}
	}

	pub fn discover(&self, filter: &ClusterFilter) -> Vec<ClusterInfo> {
		match filter {
			ClusterFilter::All => self.clusters.clone(),
			ClusterFilter::Named(names) => names
				.iter()
				.filter_map(|name| self.cluster(name).cloned())
				.collect(),
		}
	}

	pub fn cluster(&self, name: &str) -> Option<&ClusterInfo> {
		self.clusters.iter().find(|c| c.name == name)
	}

	pub fn cluster_names(&self) -> Vec<String> {
		self.clusters.iter().map(|c| c.name.clone()).collect()
	}

	pub fn current_context(&self) -> Option<&str> {
		self.kubeconfig.current_context.as_deref()
	}

	/// Number of clients constructed so far.
	pub fn clients_built(&self) -> usize {
		self.clients_built.load(Ordering::Relaxed)
	}

	/// Client for `name`, constructed on first use.
	///
	/// Concurrent first calls for the same name construct exactly one client.
	pub async fn handle(&self, name: &str) -> Result<Client, RegistryError> {
		if let Some(client) = self.handles.read().await.get(name) {
			return Ok(client.clone());
		}

		let mut handles = self.handles.write().await;
		if let Some(client) = handles.get(name) {
			return Ok(client.clone());
		}

		let client = self.build_client(name).await?;
		handles.insert(name.to_string(), client.clone());
		Ok(client)
	}

	#[instrument(skip(self))]
	async fn build_client(&self, name: &str) -> Result<Client, RegistryError> {
		if self.cluster(name).is_none() {
			return Err(RegistryError::UnknownCluster(name.to_string()));
		}

		let mut config = Config::from_custom_kubeconfig(
			self.kubeconfig.clone(),
			&KubeConfigOptions {
				context: Some(name.to_string()),
				..Default::default()
			},
		)
		.await
		.map_err(|source| RegistryError::Config {
			cluster: name.to_string(),
			source,
		})?;
		config.read_timeout = Some(self.read_timeout);

		let client = Client::try_from(config).map_err(|e| RegistryError::Client {
			cluster: name.to_string(),
			source: Box::new(e),
		})?;

		let built = self.clients_built.fetch_add(1, Ordering::Relaxed) + 1;
		debug!(built, "constructed cluster client");
		Ok(client)
	}
}
