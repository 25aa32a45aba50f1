//! Run-wide drift checks and syncs across the fleet.
//!
//! A run loads its manifest set once, shares it read-only with one worker per
//! target cluster and folds the per-cluster outcomes into a single report.

use std::sync::Arc;

use bon::Builder;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use super::{
	drift::{DriftDetector, DriftResult},
	manifest::{ManifestError, ManifestSet},
	source::{ManifestSource, SourceError},
	sync::{SyncOptions, SyncSummary, Syncer},
};
use crate::{
	cluster::{Executor, Selector, Target, WorkloadRequirements},
	config::DEFAULT_FIELD_MANAGER,
};

#[derive(Debug, Error)]
pub enum ReconcileError {
	#[error("loading manifests from {source_name}")]
	Source {
		source_name: String,
		#[source]
		source: SourceError,
	},

	#[error("applying namespace override `{namespace}`")]
	Namespace {
		namespace: String,
		#[source]
		source: ManifestError,
	},

	#[error("no cluster satisfies the workload requirements")]
	NoMatchingCluster,
}

#[derive(Debug, Clone, Builder)]
pub struct DriftRequest {
	pub source: ManifestSource,
	/// Clusters to check. Empty means every known cluster.
	#[builder(default)]
	pub clusters: Vec<String>,
	#[builder(into)]
	pub namespace: Option<String>,
}

#[derive(Debug, Clone, Builder)]
pub struct SyncRequest {
	pub source: ManifestSource,
	/// Clusters to sync. When empty, `requirements` picks them, or every
	/// known cluster if no requirements are set.
	#[builder(default)]
	pub clusters: Vec<String>,
	pub requirements: Option<WorkloadRequirements>,
	#[builder(into)]
	pub namespace: Option<String>,
	#[builder(default)]
	pub dry_run: bool,
	#[builder(default)]
	pub include: Vec<String>,
	#[builder(default)]
	pub exclude: Vec<String>,
	#[builder(into, default = DEFAULT_FIELD_MANAGER.to_string())]
	pub field_manager: String,
}

impl SyncRequest {
	fn options(&self) -> SyncOptions {
		SyncOptions::builder()
			.dry_run(self.dry_run)
			.include(self.include.clone())
			.exclude(self.exclude.clone())
			.field_manager(self.field_manager.clone())
			.build()
	}
}

/// A cluster the run could not check at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterError {
	pub cluster: String,
	pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
	pub source: String,
	pub cluster_count: usize,
	pub total_drifts: usize,
	pub drifts: Vec<DriftResult>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub errors: Vec<ClusterError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
	pub source: String,
	pub dry_run: bool,
	pub summaries: Vec<SyncSummary>,
}

impl SyncReport {
	/// Whether any resource in any cluster failed.
	pub fn has_failures(&self) -> bool {
		self.summaries.iter().any(|s| s.failed > 0)
	}
}

#[derive(Debug, Clone)]
pub struct Reconciler {
	executor: Executor,
}

impl Reconciler {
	pub fn new(executor: Executor) -> Self {
		Self { executor }
	}

	async fn load(source: &ManifestSource, namespace: Option<&str>) -> Result<ManifestSet, ReconcileError> {
		let mut manifests = source.load().await.map_err(|source_err| ReconcileError::Source {
			source_name: source.to_string(),
			source: source_err,
		})?;
		if let Some(namespace) = namespace {
			manifests
				.override_namespace(namespace)
				.map_err(|source| ReconcileError::Namespace {
					namespace: namespace.to_string(),
					source,
				})?;
		}
		Ok(manifests)
	}

	#[instrument(skip_all, fields(source = %request.source))]
	pub async fn drift(&self, request: &DriftRequest) -> Result<DriftReport, ReconcileError> {
		let manifests = Self::load(&request.source, request.namespace.as_deref()).await?;
		let target = Target::from_names(request.clusters.clone());
		Ok(self
			.detect_drift(request.source.to_string(), Arc::new(manifests), &target)
			.await)
	}

	/// Check an already loaded set against `target`.
	pub async fn detect_drift(&self, source: String, manifests: Arc<ManifestSet>, target: &Target) -> DriftReport {
		let results = self
			.executor
			.run(target, move |client, cluster| {
				let manifests = Arc::clone(&manifests);
				async move { Ok(DriftDetector::new(client, cluster).detect(&manifests).await) }
			})
			.await;

		let mut report = DriftReport {
			source,
			cluster_count: results.len(),
			total_drifts: 0,
			drifts: Vec::new(),
			errors: Vec::new(),
		};
		for result in results {
			let cluster = result.cluster.clone();
			match result.into_result() {
				Ok(drifts) => report.drifts.extend(drifts),
				Err(error) => report.errors.push(ClusterError { cluster, error }),
			}
		}
		report.total_drifts = report.drifts.len();

		info!(
			clusters = report.cluster_count,
			drifts = report.total_drifts,
			unreachable = report.errors.len(),
			"drift check finished"
		);
		report
	}

	#[instrument(skip_all, fields(source = %request.source, dry_run = request.dry_run))]
	pub async fn sync(&self, request: &SyncRequest) -> Result<SyncReport, ReconcileError> {
		let manifests = Self::load(&request.source, request.namespace.as_deref()).await?;
		let target = self.placement(request).await?;
		Ok(self
			.apply_set(request.source.to_string(), Arc::new(manifests), &target, request.options())
			.await)
	}

	/// Target clusters of a sync. Named clusters are taken as given.
	async fn placement(&self, request: &SyncRequest) -> Result<Target, ReconcileError> {
		let Some(requirements) = request.requirements.as_ref().filter(|_| request.clusters.is_empty()) else {
			return Ok(Target::from_names(request.clusters.clone()));
		};
		let clusters = Selector::new(self.executor.clone())
			.find_clusters_for_workload(&Target::All, requirements)
			.await;
		if clusters.is_empty() {
			return Err(ReconcileError::NoMatchingCluster);
		}
		info!(?clusters, "placed by workload requirements");
		Ok(Target::Subset(clusters))
	}

	/// Sync for real, whatever the request says about dry-run.
	pub async fn reconcile(&self, request: SyncRequest) -> Result<SyncReport, ReconcileError> {
		self.sync(&SyncRequest {
			dry_run: false,
			..request
		})
		.await
	}

	/// Dry-run sync, whatever the request says about dry-run.
	pub async fn preview(&self, request: SyncRequest) -> Result<SyncReport, ReconcileError> {
		self.sync(&SyncRequest {
			dry_run: true,
			..request
		})
		.await
	}

	/// Sync an already loaded set into `target`.
	pub async fn apply_set(
		&self,
		source: String,
		manifests: Arc<ManifestSet>,
		target: &Target,
		options: SyncOptions,
	) -> SyncReport {
		let dry_run = options.dry_run;
		let results = self
			.executor
			.run(target, move |client, cluster| {
				let manifests = Arc::clone(&manifests);
				let options = options.clone();
				async move { Ok(Syncer::new(client, cluster, options).sync(&manifests).await) }
			})
			.await;

		let summaries: Vec<SyncSummary> = results
			.into_iter()
			.map(|result| {
				let cluster = result.cluster.clone();
				result
					.into_result()
					.unwrap_or_else(|error| SyncSummary::cluster_failure(cluster, error))
			})
			.collect();

		info!(
			clusters = summaries.len(),
			failed_clusters = summaries.iter().filter(|s| s.failed > 0).count(),
			"sync finished"
		);
		SyncReport {
			source,
			dry_run,
			summaries,
		}
	}
}
