//! Drift detection and sync against mock clusters.

mod common;

use std::sync::Arc;

use common::{
	deployment, empty_server, executor, node, server_with, unavailable_server, write_files,
};
use indoc::indoc;
use assert_matches::assert_matches;
use kubefleet::{
	cluster::{Target, WorkloadRequirements},
	gitops::{
		parse_documents, DriftDetector, DriftRequest, DriftType, ManifestSet, ManifestSource,
		ReconcileError, Reconciler, SyncAction, SyncOptions, SyncRequest, Syncer,
	},
};

const MANIFESTS: &str = indoc! {"
	apiVersion: apps/v1
	kind: Deployment
	metadata:
	  name: web
	  labels:
	    app: web
	spec:
	  replicas: 2
	  selector:
	    matchLabels:
	      app: web
	  template:
	    metadata:
	      labels:
	        app: web
	    spec:
	      containers:
	      - name: web
	        image: nginx:1.27
	---
	apiVersion: v1
	kind: ConfigMap
	metadata:
	  name: settings
	data:
	  mode: fast
	---
	apiVersion: v1
	kind: Namespace
	metadata:
	  name: team-a
"};

fn manifests() -> ManifestSet {
	ManifestSet::new(parse_documents(MANIFESTS, "inline")).unwrap()
}

async fn client_for(server: &k8s_mock::RunningHttpMockK8sServer) -> kube::Client {
	common::registry(&[("c", server)]).handle("c").await.unwrap()
}

#[tokio::test]
async fn test_sync_is_idempotent() {
	let server = empty_server().await;
	let client = client_for(&server).await;
	let syncer = Syncer::new(client, "c", SyncOptions::default());

	let first = syncer.sync(&manifests()).await;
	assert_eq!(first.created, 3, "{:#?}", first.results);
	assert!(first.results[0].message.starts_with("created (uid: "));
	assert!(server
		.object("apps/v1", "Deployment", Some("default"), "web")
		.is_some());
	assert!(server.object("v1", "Namespace", None, "team-a").is_some());

	let second = syncer.sync(&manifests()).await;
	assert_eq!(second.unchanged, 3, "{:#?}", second.results);
	assert_eq!(second.created + second.updated + second.failed, 0);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
	let server = server_with(vec![deployment("web", 3)]).await;
	let client = client_for(&server).await;
	let options = SyncOptions::builder().dry_run(true).build();

	let summary = Syncer::new(client, "c", options).sync(&manifests()).await;

	let actions: Vec<_> = summary.results.iter().map(|r| (r.action, r.message.as_str())).collect();
	assert_eq!(
		actions,
		vec![
			(SyncAction::Updated, "would update (dry-run)"),
			(SyncAction::Created, "would create (dry-run)"),
			(SyncAction::Created, "would create (dry-run)"),
		]
	);
	assert_eq!(server.write_request_count().await, 0);
	assert_eq!(
		server.object("apps/v1", "Deployment", Some("default"), "web").unwrap()["spec"]["replicas"],
		3
	);
}

#[tokio::test]
async fn test_replica_drift_then_sync() {
	let server = server_with(vec![deployment("web", 3)]).await;
	let client = client_for(&server).await;
	let set = ManifestSet::new(
		parse_documents(MANIFESTS, "inline")
			.into_iter()
			.filter(|m| m.kind == "Deployment")
			.collect(),
	)
	.unwrap();

	let detector = DriftDetector::new(client.clone(), "c");
	let drifts = detector.detect(&set).await;
	assert_eq!(drifts.len(), 1);
	assert_eq!(drifts[0].drift_type, DriftType::Modified);
	assert_eq!(drifts[0].differences, vec!["spec.replicas: 3 (expected: 2)"]);
	assert_eq!(drifts[0].resource_key, "apps/v1/Deployment/default/web");

	let summary = Syncer::new(client, "c", SyncOptions::default()).sync(&set).await;
	assert_eq!(summary.updated, 1, "{:#?}", summary.results);
	assert!(summary.results[0].message.contains("resourceVersion"));

	assert!(detector.detect(&set).await.is_empty());
	assert_eq!(
		server.object("apps/v1", "Deployment", Some("default"), "web").unwrap()["spec"]["replicas"],
		2
	);
}

#[tokio::test]
async fn test_server_defaulted_fields_stay_in_sync() {
	let server = k8s_mock::HttpMockK8sServer::builder()
		.server_defaults(true)
		.build()
		.start()
		.await;
	let client = client_for(&server).await;
	let service = indoc! {"
		apiVersion: v1
		kind: Service
		metadata:
		  name: web
		spec:
		  selector:
		    app: web
		  ports:
		  - port: 80
	"};
	let set = ManifestSet::new(parse_documents(&format!("{MANIFESTS}---\n{service}"), "inline")).unwrap();

	let syncer = Syncer::new(client.clone(), "c", SyncOptions::default());
	assert_eq!(syncer.sync(&set).await.created, 4);

	let stored = server.object("v1", "Service", Some("default"), "web").unwrap();
	assert_eq!(stored["spec"]["ports"][0]["protocol"], "TCP");
	let stored = server.object("apps/v1", "Deployment", Some("default"), "web").unwrap();
	assert_eq!(
		stored["spec"]["template"]["spec"]["containers"][0]["imagePullPolicy"],
		"IfNotPresent"
	);

	let drifts = DriftDetector::new(client, "c").detect(&set).await;
	assert!(drifts.is_empty(), "{drifts:#?}");
	let again = syncer.sync(&set).await;
	assert_eq!(again.unchanged, 4, "{:#?}", again.results);
}

#[tokio::test]
async fn test_missing_resources_drift() {
	let server = empty_server().await;
	let client = client_for(&server).await;

	let drifts = DriftDetector::new(client, "c").detect(&manifests()).await;
	assert_eq!(drifts.len(), 3);
	assert!(drifts.iter().all(|d| d.drift_type == DriftType::Missing));
	assert_eq!(drifts[0].differences, vec!["resource does not exist in cluster"]);
	assert!(drifts[0].declared.is_some());
}

#[tokio::test]
async fn test_include_exclude_and_unsupported() {
	let server = empty_server().await;
	let client = client_for(&server).await;
	let set = ManifestSet::new(parse_documents(
		indoc! {"
			apiVersion: v1
			kind: ConfigMap
			metadata:
			  name: a
			---
			apiVersion: v1
			kind: Secret
			metadata:
			  name: b
			---
			apiVersion: a/b/c
			kind: ConfigMap
			metadata:
			  name: c
		"},
		"inline",
	))
	.unwrap();

	let options = SyncOptions::builder()
		.include(vec!["ConfigMap".into(), "Secret".into()])
		.exclude(vec!["Secret".into()])
		.build();
	let summary = Syncer::new(client, "c", options).sync(&set).await;

	let actions: Vec<_> = summary.results.iter().map(|r| r.action).collect();
	assert_eq!(
		actions,
		vec![SyncAction::Created, SyncAction::Skipped, SyncAction::Failed]
	);
	assert_eq!(summary.results[1].message, "kind excluded from sync");
	assert!(summary.results[2].message.contains("a/b/c"));
	assert_eq!((summary.created, summary.skipped, summary.failed), (1, 1, 1));
}

#[tokio::test]
async fn test_reconcile_and_preview_from_directory() {
	let healthy = empty_server().await;
	let down = unavailable_server().await;
	let reconciler = Reconciler::new(executor(&[("healthy", &healthy), ("down", &down)]));

	let dir = tempfile::tempdir().unwrap();
	write_files(
		dir.path(),
		&[
			("apps/web.yaml", MANIFESTS),
			("README.md", "not a manifest"),
		],
	);
	let source = ManifestSource::Local {
		path: dir.path().to_path_buf(),
	};

	let preview = reconciler
		.preview(
			SyncRequest::builder()
				.source(source.clone())
				.dry_run(false)
				.build(),
		)
		.await
		.unwrap();
	assert!(preview.dry_run);
	assert_eq!(preview.summaries.len(), 2);
	assert_eq!(healthy.write_request_count().await, 0);

	let report = reconciler
		.reconcile(
			SyncRequest::builder()
				.source(source.clone())
				.clusters(vec!["healthy".into()])
				.namespace("prod")
				.dry_run(true)
				.build(),
		)
		.await
		.unwrap();
	assert!(!report.dry_run);
	assert_eq!(report.summaries.len(), 1);
	assert_eq!(report.summaries[0].created, 3);
	assert!(healthy
		.object("v1", "ConfigMap", Some("prod"), "settings")
		.is_some());

	let drift = reconciler
		.drift(
			&DriftRequest::builder()
				.source(source)
				.namespace("prod")
				.build(),
		)
		.await
		.unwrap();
	assert_eq!(drift.cluster_count, 2);
	assert!(drift.errors.is_empty());
	assert_eq!(drift.total_drifts, 3, "{:#?}", drift.drifts);
	assert!(drift.drifts.iter().all(|d| d.cluster == "down"
		&& d.drift_type == DriftType::Missing
		&& d.differences[0].starts_with("error checking resource: ")));
}

#[tokio::test]
async fn test_unreachable_cluster_fails_its_summary_only() {
	let healthy = empty_server().await;
	let down = unavailable_server().await;
	let reconciler = Reconciler::new(executor(&[("healthy", &healthy), ("down", &down)]));

	let report = reconciler
		.apply_set(
			"inline".into(),
			Arc::new(manifests()),
			&Target::Subset(vec!["healthy".into(), "down".into(), "ghost".into()]),
			SyncOptions::default(),
		)
		.await;

	assert_eq!(report.summaries.len(), 3);
	assert_eq!(report.summaries[0].created, 3);
	assert_eq!(report.summaries[1].failed, 3);
	assert_eq!(report.summaries[2].failed, 1);
	assert!(report.summaries[2].results[0].message.contains("unknown cluster"));
}

#[tokio::test]
async fn test_requirements_place_the_deployment() {
	let gpu = server_with(vec![node(
		"gpu-1",
		true,
		&[("cpu", "16"), ("memory", "64Gi"), ("nvidia.com/gpu", "4")],
		&[],
	)])
	.await;
	let cpu = server_with(vec![node("cpu-1", true, &[("cpu", "8"), ("memory", "32Gi")], &[])]).await;
	let reconciler = Reconciler::new(executor(&[("cpu", &cpu), ("gpu", &gpu)]));

	let dir = tempfile::tempdir().unwrap();
	write_files(dir.path(), &[("app.yaml", MANIFESTS)]);
	let source = ManifestSource::Local {
		path: dir.path().to_path_buf(),
	};
	let nvidia = WorkloadRequirements {
		gpu_type: Some("nvidia.com/gpu".into()),
		min_gpu: 2,
		..Default::default()
	};

	let report = reconciler
		.sync(
			&SyncRequest::builder()
				.source(source.clone())
				.requirements(nvidia.clone())
				.build(),
		)
		.await
		.unwrap();
	let clusters: Vec<_> = report.summaries.iter().map(|s| s.cluster.as_str()).collect();
	assert_eq!(clusters, vec!["gpu"]);
	assert_eq!(report.summaries[0].created, 3);
	assert!(gpu.object("apps/v1", "Deployment", Some("default"), "web").is_some());
	assert!(cpu.object("apps/v1", "Deployment", Some("default"), "web").is_none());

	// Named clusters are used as given
	let report = reconciler
		.sync(
			&SyncRequest::builder()
				.source(source.clone())
				.clusters(vec!["cpu".into()])
				.requirements(nvidia)
				.build(),
		)
		.await
		.unwrap();
	assert_eq!(report.summaries[0].cluster, "cpu");
	assert!(cpu.object("apps/v1", "Deployment", Some("default"), "web").is_some());

	let too_many = WorkloadRequirements {
		min_gpu: 16,
		..Default::default()
	};
	let err = reconciler
		.sync(
			&SyncRequest::builder()
				.source(source)
				.requirements(too_many)
				.build(),
		)
		.await
		.unwrap_err();
	assert_matches!(err, ReconcileError::NoMatchingCluster);
}
