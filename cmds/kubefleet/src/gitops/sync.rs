//! Create-or-apply reconciliation of declared manifests into one cluster.

use std::fmt;

use bon::Builder;
use kube::{
	api::{DynamicObject, Patch, PatchParams, PostParams},
	Client,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::{
	manifest::{Manifest, ManifestSet},
	resource::dynamic_api,
};
use crate::config::DEFAULT_FIELD_MANAGER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
	Created,
	Updated,
	Unchanged,
	Skipped,
	Failed,
}

impl fmt::Display for SyncAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncAction::Created => write!(f, "created"),
			SyncAction::Updated => write!(f, "updated"),
			SyncAction::Unchanged => write!(f, "unchanged"),
			SyncAction::Skipped => write!(f, "skipped"),
			SyncAction::Failed => write!(f, "failed"),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
	pub cluster: String,
	pub kind: String,
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	pub action: SyncAction,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub message: String,
}

/// Per-cluster outcome counts plus the individual results.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
	pub cluster: String,
	pub created: usize,
	pub updated: usize,
	pub unchanged: usize,
	pub failed: usize,
	pub skipped: usize,
	pub results: Vec<SyncResult>,
}

impl SyncSummary {
	pub fn new(cluster: impl Into<String>) -> Self {
		Self {
			cluster: cluster.into(),
			..Default::default()
		}
	}

	/// Summary for a cluster the sync never reached.
	pub fn cluster_failure(cluster: impl Into<String>, error: impl Into<String>) -> Self {
		let mut summary = Self::new(cluster);
		summary.record(SyncResult {
			cluster: summary.cluster.clone(),
			kind: String::new(),
			name: String::new(),
			namespace: None,
			action: SyncAction::Failed,
			message: error.into(),
		});
		summary
	}

	pub fn record(&mut self, result: SyncResult) {
		match result.action {
			SyncAction::Created => self.created += 1,
			SyncAction::Updated => self.updated += 1,
			SyncAction::Unchanged => self.unchanged += 1,
			SyncAction::Skipped => self.skipped += 1,
			SyncAction::Failed => self.failed += 1,
		}
		self.results.push(result);
	}
}

#[derive(Debug, Clone, Builder)]
pub struct SyncOptions {
	/// Only classify; never write.
	#[builder(default)]
	pub dry_run: bool,
	/// Kinds to sync. Empty means every kind.
	#[builder(default)]
	pub include: Vec<String>,
	/// Kinds never to sync. Wins over `include`.
	#[builder(default)]
	pub exclude: Vec<String>,
	#[builder(into, default = DEFAULT_FIELD_MANAGER.to_string())]
	pub field_manager: String,
}

impl Default for SyncOptions {
	fn default() -> Self {
		Self::builder().build()
	}
}

impl SyncOptions {
	pub fn should_sync(&self, kind: &str) -> bool {
		if self.exclude.iter().any(|k| k == kind) {
			return false;
		}
		self.include.is_empty() || self.include.iter().any(|k| k == kind)
	}
}

/// Syncs a manifest set into one cluster.
pub struct Syncer {
	client: Client,
	cluster: String,
	options: SyncOptions,
}

impl Syncer {
	pub fn new(client: Client, cluster: impl Into<String>, options: SyncOptions) -> Self {
		Self {
			client,
			cluster: cluster.into(),
			options,
		}
	}

	/// Sync every manifest in declaration order. A failure on one object is
	/// recorded and the next object is still processed.
	#[instrument(skip_all, fields(cluster = %self.cluster, dry_run = self.options.dry_run))]
	pub async fn sync(&self, manifests: &ManifestSet) -> SyncSummary {
		let mut summary = SyncSummary::new(&self.cluster);
		for manifest in manifests {
			let result = self.sync_one(manifest).await;
			if result.action == SyncAction::Failed {
				warn!(resource = %manifest.key(), message = %result.message, "sync failed");
			} else {
				debug!(resource = %manifest.key(), action = %result.action, "synced");
			}
			summary.record(result);
		}
		info!(
			created = summary.created,
			updated = summary.updated,
			unchanged = summary.unchanged,
			skipped = summary.skipped,
			failed = summary.failed,
			"sync complete"
		);
		summary
	}

	async fn sync_one(&self, manifest: &Manifest) -> SyncResult {
		let (action, message) = if self.options.should_sync(&manifest.kind) {
			match self.apply(manifest).await {
				Ok(outcome) => outcome,
				Err(err) => (SyncAction::Failed, format!("{err:#}")),
			}
		} else {
			(SyncAction::Skipped, "kind excluded from sync".to_string())
		};

		SyncResult {
			cluster: self.cluster.clone(),
			kind: manifest.kind.clone(),
			name: manifest.name.clone(),
			namespace: manifest.namespace().map(str::to_string),
			action,
			message,
		}
	}

	async fn apply(&self, manifest: &Manifest) -> anyhow::Result<(SyncAction, String)> {
		use anyhow::Context as _;

		let api = dynamic_api(&self.client, manifest)?;
		let existing = api
			.get_opt(&manifest.name)
			.await
			.context("fetching live object")?;

		if self.options.dry_run {
			return Ok(match existing {
				None => (SyncAction::Created, "would create (dry-run)".to_string()),
				Some(_) => (SyncAction::Updated, "would update (dry-run)".to_string()),
			});
		}

		let object = manifest.to_object();

		let Some(existing) = existing else {
			let object: DynamicObject =
				serde_json::from_value(object).context("converting manifest to an API object")?;
			let params = PostParams {
				field_manager: Some(self.options.field_manager.clone()),
				..Default::default()
			};
			let created = api.create(&params, &object).await.context("creating")?;
			let message = match created.metadata.uid {
				Some(uid) => format!("created (uid: {uid})"),
				None => "created".to_string(),
			};
			return Ok((SyncAction::Created, message));
		};

		let params = PatchParams {
			field_manager: Some(self.options.field_manager.clone()),
			force: true,
			..Default::default()
		};
		let applied = api
			.patch(&manifest.name, &params, &Patch::Apply(&object))
			.await
			.context("applying")?;

		let before = existing.metadata.resource_version.unwrap_or_default();
		let after = applied.metadata.resource_version.unwrap_or_default();
		Ok(if before == after {
			(SyncAction::Unchanged, String::new())
		} else {
			(
				SyncAction::Updated,
				format!("updated (resourceVersion {before} -> {after})"),
			)
		})
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case(&[], &[], "Deployment", true)]
	#[case(&["Deployment"], &[], "Deployment", true)]
	#[case(&["Deployment"], &[], "Service", false)]
	#[case(&[], &["Secret"], "Secret", false)]
	#[case(&["Secret"], &["Secret"], "Secret", false)]
	fn test_should_sync(
		#[case] include: &[&str],
		#[case] exclude: &[&str],
		#[case] kind: &str,
		#[case] expected: bool,
	) {
		let options = SyncOptions::builder()
			.include(include.iter().map(ToString::to_string).collect())
			.exclude(exclude.iter().map(ToString::to_string).collect())
			.build();
		assert_eq!(options.should_sync(kind), expected);
	}

	#[test]
	fn test_summary_counts() {
		let mut summary = SyncSummary::new("prod");
		for action in [SyncAction::Created, SyncAction::Created, SyncAction::Skipped] {
			summary.record(SyncResult {
				cluster: "prod".into(),
				kind: "ConfigMap".into(),
				name: "c".into(),
				namespace: Some("default".into()),
				action,
				message: String::new(),
			});
		}
		assert_eq!((summary.created, summary.skipped, summary.failed), (2, 1, 0));
		assert_eq!(summary.results.len(), 3);
	}

	#[test]
	fn test_cluster_failure_summary() {
		let summary = SyncSummary::cluster_failure("edge", "connection refused");
		assert_eq!(summary.failed, 1);
		assert_eq!(summary.results[0].action, SyncAction::Failed);
		assert_eq!(summary.results[0].message, "connection refused");
	}
}
