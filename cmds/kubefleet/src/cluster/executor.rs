//! Fan-out of one operation across clusters.
//!
//! Every requested cluster yields exactly one [`ClusterResult`]. Handle
//! construction errors, operation errors and worker panics are all captured
//! per cluster; nothing one cluster does can keep another cluster's result
//! from being collected.

use std::{future::Future, sync::Arc};

use kube::Client;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, instrument, warn, Instrument};

use super::registry::ClusterRegistry;

/// Which clusters an operation runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
	/// One cluster.
	Cluster(String),
	/// Every cluster known to the registry.
	All,
	/// An explicit list of cluster names.
	Subset(Vec<String>),
}

impl Target {
	/// Target for a user-supplied cluster list; an empty list means all.
	pub fn from_names(names: Vec<String>) -> Self {
		if names.is_empty() {
			Target::All
		} else {
			Target::Subset(names)
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResult<T> {
	pub cluster: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl<T> ClusterResult<T> {
	pub fn success(cluster: impl Into<String>, result: T) -> Self {
		Self {
			cluster: cluster.into(),
			result: Some(result),
			error: None,
		}
	}

	pub fn failure(cluster: impl Into<String>, error: impl Into<String>) -> Self {
		Self {
			cluster: cluster.into(),
			result: None,
			error: Some(error.into()),
		}
	}

	pub fn is_ok(&self) -> bool {
		self.error.is_none()
	}

	pub fn into_result(self) -> Result<T, String> {
		match (self.result, self.error) {
			(Some(result), None) => Ok(result),
			(_, Some(error)) => Err(error),
			(None, None) => Err("no result".to_string()),
		}
	}
}

/// Runs operations against clusters of a shared registry.
#[derive(Debug, Clone)]
pub struct Executor {
	registry: Arc<ClusterRegistry>,
}

impl Executor {
	pub fn new(registry: Arc<ClusterRegistry>) -> Self {
		Self { registry }
	}

	pub fn registry(&self) -> &Arc<ClusterRegistry> {
		&self.registry
	}

	/// Run `operation` against `target`, blocking until every cluster is done.
	///
	/// Each cluster, a single one included, runs on its own task. Results
	/// come back in the order clusters were requested.
	#[instrument(skip_all, fields(target = ?target))]
	pub async fn run<T, F, Fut>(&self, target: &Target, operation: F) -> Vec<ClusterResult<T>>
	where
		T: Send + 'static,
		F: Fn(Client, String) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		let names = match target {
			Target::Cluster(name) => vec![name.clone()],
			Target::All => self.registry.cluster_names(),
			Target::Subset(names) => names.clone(),
		};

		debug!(clusters = names.len(), "fanning out");

		let operation = Arc::new(operation);
		let workers: Vec<(String, JoinHandle<ClusterResult<T>>)> = names
			.into_iter()
			.map(|name| {
				let registry = Arc::clone(&self.registry);
				let operation = Arc::clone(&operation);
				let span = info_span!("cluster", cluster = %name);
				let worker = tokio::spawn(
					{
						let name = name.clone();
						async move { run_one(&registry, name, operation.as_ref()).await }
					}
					.instrument(span),
				);
				(name, worker)
			})
			.collect();

		let mut results = Vec::with_capacity(workers.len());
		for (name, worker) in workers {
			let result = match worker.await {
				Ok(result) => result,
				Err(err) if err.is_panic() => {
					let message = panic_message(err.into_panic());
					warn!(cluster = %name, %message, "worker panicked");
					ClusterResult::failure(name, format!("worker panicked: {message}"))
				}
				Err(_) => ClusterResult::failure(name, "worker cancelled"),
			};
			results.push(result);
		}
		results
	}
}

async fn run_one<T, F, Fut>(registry: &ClusterRegistry, name: String, operation: &F) -> ClusterResult<T>
where
	F: Fn(Client, String) -> Fut,
	Fut: Future<Output = anyhow::Result<T>>,
{
	let client = match registry.handle(&name).await {
		Ok(client) => client,
		Err(err) => {
			let message = format!("{:#}", anyhow::Error::from(err));
			debug!(cluster = %name, error = %message, "no client");
			return ClusterResult::failure(name, message);
		}
	};

	match operation(client, name.clone()).await {
		Ok(result) => ClusterResult::success(name, result),
		Err(err) => {
			debug!(cluster = %name, error = %err, "operation failed");
			ClusterResult::failure(name, format!("{err:#}"))
		}
	}
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"unknown panic".to_string()
	}
}

#[cfg(test)]
mod tests {
	use kube::config::Kubeconfig;

	use super::*;
	use crate::config::FleetConfig;

	#[test]
	fn test_target_from_names() {
		assert_eq!(Target::from_names(vec![]), Target::All);
		assert_eq!(
			Target::from_names(vec!["a".into()]),
			Target::Subset(vec!["a".into()])
		);
	}

	#[test]
	fn test_cluster_result_into_result() {
		assert_eq!(ClusterResult::success("a", 1).into_result(), Ok(1));
		assert_eq!(
			ClusterResult::<i32>::failure("a", "boom").into_result(),
			Err("boom".to_string())
		);
	}

	#[tokio::test]
	async fn test_unknown_names_still_get_results() {
		let registry = Arc::new(ClusterRegistry::from_kubeconfig(
			Kubeconfig::default(),
			&FleetConfig::default(),
		));
		let executor = Executor::new(registry);

		let results = executor
			.run(
				&Target::Subset(vec!["a".into(), "b".into(), "c".into()]),
				|_client, _name| async { Ok::<_, anyhow::Error>(()) },
			)
			.await;

		let clusters: Vec<_> = results.iter().map(|r| r.cluster.as_str()).collect();
		assert_eq!(clusters, vec!["a", "b", "c"]);
		assert!(results
			.iter()
			.all(|r| r.error.as_deref().is_some_and(|e| e.contains("unknown cluster"))));
	}

	#[tokio::test]
	async fn test_single_target_unknown_cluster() {
		let registry = Arc::new(ClusterRegistry::from_kubeconfig(
			Kubeconfig::default(),
			&FleetConfig::default(),
		));
		let results = Executor::new(registry)
			.run(&Target::Cluster("x".into()), |_c, _n| async { Ok::<_, anyhow::Error>(1) })
			.await;
		assert_eq!(results.len(), 1);
		assert_eq!(results[0].cluster, "x");
		assert!(!results[0].is_ok());
	}
}
