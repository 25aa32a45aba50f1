//! Command handlers rendering against mock clusters.

mod common;

use common::{empty_server, node, server_with, unavailable_server, write_files};
use k8s_mock::{fleet_kubeconfig, RunningHttpMockK8sServer};
use kubefleet::{
	cluster::ClusterRegistry,
	commands::{
		clusters::{self, HealthArgs, ListArgs},
		deploy::{self, DeployArgs},
		drift::{self, DriftArgs},
		find::RequirementArgs,
		output::{ColorMode, OutputFormat},
		sync::{self, SyncMode, SyncTargetArgs},
		util::{CommonArgs, Fleet, SourceArgs},
	},
	config::FleetConfig,
};

fn fleet(members: &[(&str, &RunningHttpMockK8sServer)]) -> Fleet {
	let config = FleetConfig::default();
	let registry = ClusterRegistry::from_kubeconfig(fleet_kubeconfig(members), &config);
	Fleet::from_registry(config, registry)
}

fn common(output: OutputFormat) -> CommonArgs {
	CommonArgs {
		log_level: None,
		kubeconfig: None,
		output,
		color: ColorMode::Never,
	}
}

fn local_source(path: &std::path::Path) -> SourceArgs {
	SourceArgs {
		repo: None,
		branch: None,
		path: Some(path.display().to_string()),
	}
}

const CONFIGMAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\ndata:\n  mode: fast\n";

#[tokio::test]
async fn test_clusters_list_json() {
	let a = empty_server().await;
	let b = empty_server().await;
	let fleet = fleet(&[("a", &a), ("b", &b)]);

	let mut out = Vec::new();
	clusters::list(
		&fleet,
		&ListArgs {
			names: vec![],
			common: common(OutputFormat::Json),
		},
		&mut out,
	)
	.unwrap();

	let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(json[0]["name"], "a");
	assert_eq!(json[0]["isCurrent"], true);
	assert_eq!(json[1]["server"], b.uri());
}

#[tokio::test]
async fn test_clusters_health_text() {
	let up = server_with(vec![node("n1", true, &[("cpu", "2")], &[])]).await;
	let down = unavailable_server().await;
	let fleet = fleet(&[("up", &up), ("down", &down)]);

	let mut out = Vec::new();
	clusters::health(
		&fleet,
		&HealthArgs {
			clusters: vec![],
			common: common(OutputFormat::Text),
		},
		&mut out,
	)
	.await
	.unwrap();

	let text = String::from_utf8(out).unwrap();
	let lines: Vec<_> = text.lines().collect();
	assert!(lines[0].starts_with("CLUSTER"));
	assert!(lines[1].starts_with("up") && lines[1].contains("healthy") && lines[1].contains("1/1"));
	assert!(lines[2].starts_with("down") && lines[2].contains("unhealthy"));
}

#[tokio::test]
async fn test_drift_exit_status() {
	let server = empty_server().await;
	let fleet = fleet(&[("c", &server)]);
	let dir = tempfile::tempdir().unwrap();
	write_files(dir.path(), &[("settings.yaml", CONFIGMAP)]);

	let mut args = DriftArgs {
		source: local_source(dir.path()),
		clusters: vec![],
		namespace: None,
		exit_zero: false,
		common: common(OutputFormat::Text),
	};

	let mut out = Vec::new();
	let err = drift::drift(&fleet, &args, &mut out).await.unwrap_err();
	assert_eq!(err.to_string(), "found 1 drift(s), 0 cluster(s) could not be checked");
	let text = String::from_utf8(out).unwrap();
	assert!(text.contains("v1/ConfigMap/default/settings"));
	assert!(text.contains("resource does not exist in cluster"));

	args.exit_zero = true;
	drift::drift(&fleet, &args, &mut Vec::new()).await.unwrap();
}

#[tokio::test]
async fn test_preview_then_reconcile() {
	let server = empty_server().await;
	let fleet = fleet(&[("c", &server)]);
	let dir = tempfile::tempdir().unwrap();
	write_files(dir.path(), &[("settings.yaml", CONFIGMAP)]);

	let args = SyncTargetArgs {
		source: local_source(dir.path()),
		clusters: vec![],
		namespace: Some("team-a".into()),
		include: vec![],
		exclude: vec![],
		field_manager: None,
		common: common(OutputFormat::Json),
	};

	let mut out = Vec::new();
	sync::sync(&fleet, &args, SyncMode::Preview, false, &mut out)
		.await
		.unwrap();
	let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(json["dryRun"], true);
	assert_eq!(json["summaries"][0]["created"], 1);
	assert!(server.object("v1", "ConfigMap", Some("team-a"), "settings").is_none());

	sync::sync(&fleet, &args, SyncMode::Reconcile, true, &mut Vec::new())
		.await
		.unwrap();
	assert!(server.object("v1", "ConfigMap", Some("team-a"), "settings").is_some());
}

#[tokio::test]
async fn test_deploy_to_gpu_clusters_only() {
	let gpu = server_with(vec![node("g1", true, &[("cpu", "8"), ("nvidia.com/gpu", "2")], &[])]).await;
	let plain = server_with(vec![node("p1", true, &[("cpu", "8")], &[])]).await;
	let fleet = fleet(&[("plain", &plain), ("gpu", &gpu)]);
	let dir = tempfile::tempdir().unwrap();
	write_files(dir.path(), &[("settings.yaml", CONFIGMAP)]);

	let mut args = DeployArgs {
		dry_run: false,
		workload: RequirementArgs {
			gpu_type: None,
			min_gpu: 1,
			min_cpu: None,
			min_memory: None,
			labels: vec![],
		},
		target: SyncTargetArgs {
			source: local_source(dir.path()),
			clusters: vec![],
			namespace: None,
			include: vec![],
			exclude: vec![],
			field_manager: None,
			common: common(OutputFormat::Json),
		},
	};

	let mut out = Vec::new();
	deploy::deploy(&fleet, &args, &mut out).await.unwrap();
	let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(json["summaries"].as_array().unwrap().len(), 1);
	assert_eq!(json["summaries"][0]["cluster"], "gpu");
	assert!(gpu.object("v1", "ConfigMap", Some("default"), "settings").is_some());
	assert!(plain.object("v1", "ConfigMap", Some("default"), "settings").is_none());

	args.workload.min_gpu = 4;
	let err = deploy::deploy(&fleet, &args, &mut Vec::new()).await.unwrap_err();
	assert_eq!(err.to_string(), "no cluster satisfies the workload requirements");
}
