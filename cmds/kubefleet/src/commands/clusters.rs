//! `clusters list` and `clusters health`.

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::instrument;

use super::{
	output::{cell, paint_health, write_structured, Table},
	util::{runtime, CommonArgs, Fleet},
};
use crate::cluster::{check_health, ClusterFilter, HealthInfo, Target};

#[derive(Args)]
pub struct ClustersArgs {
	#[command(subcommand)]
	pub command: ClustersCommand,
}

#[derive(Subcommand)]
pub enum ClustersCommand {
	/// List clusters known to the kubeconfig
	List(ListArgs),

	/// Check API server reachability and node readiness
	Health(HealthArgs),
}

#[derive(Args)]
pub struct ListArgs {
	/// Only list these clusters
	pub names: Vec<String>,

	#[command(flatten)]
	pub common: CommonArgs,
}

#[derive(Args)]
pub struct HealthArgs {
	/// Cluster to check, may be repeated. All clusters when omitted.
	#[arg(short, long = "cluster")]
	pub clusters: Vec<String>,

	#[command(flatten)]
	pub common: CommonArgs,
}

impl ClustersArgs {
	pub fn common(&self) -> &CommonArgs {
		match &self.command {
			ClustersCommand::List(args) => &args.common,
			ClustersCommand::Health(args) => &args.common,
		}
	}
}

pub fn run<W: Write>(args: ClustersArgs, writer: W) -> Result<()> {
	match args.command {
		ClustersCommand::List(args) => {
			let fleet = Fleet::connect(&args.common)?;
			list(&fleet, &args, writer)
		}
		ClustersCommand::Health(args) => {
			let fleet = Fleet::connect(&args.common)?;
			runtime()?.block_on(health(&fleet, &args, writer))
		}
	}
}

pub fn list<W: Write>(fleet: &Fleet, args: &ListArgs, mut writer: W) -> Result<()> {
	let filter = if args.names.is_empty() {
		ClusterFilter::All
	} else {
		ClusterFilter::Named(args.names.clone())
	};
	let clusters = fleet.registry().discover(&filter);

	if write_structured(&mut writer, args.common.output, &clusters)? {
		return Ok(());
	}

	let mut table = Table::new(writer, &["NAME", "CURRENT", "SERVER", "LABELS"])?;
	for cluster in &clusters {
		let labels = cluster
			.labels
			.iter()
			.map(|(k, v)| format!("{k}={v}"))
			.collect::<Vec<_>>()
			.join(",");
		table.row(&[
			cluster.name.as_str(),
			if cluster.is_current { "*" } else { "" },
			cluster.server.as_str(),
			cell(&labels),
		])?;
	}
	table.finish()
}

#[instrument(skip_all)]
pub async fn health<W: Write>(fleet: &Fleet, args: &HealthArgs, mut writer: W) -> Result<()> {
	let target = Target::from_names(args.clusters.clone());
	let infos: Vec<HealthInfo> = fleet
		.executor
		.run(&target, check_health)
		.await
		.into_iter()
		.map(|result| {
			let cluster = result.cluster.clone();
			result
				.into_result()
				.unwrap_or_else(|error| HealthInfo::unreachable(cluster, error))
		})
		.collect();

	if write_structured(&mut writer, args.common.output, &infos)? {
		return Ok(());
	}

	let colored = args.common.color.should_colorize();
	let mut table = Table::new(
		writer,
		&["CLUSTER", "STATUS", "NODES", "API SERVER", "VERSION", "MESSAGE"],
	)?;
	for info in &infos {
		table.row(&[
			info.cluster.clone(),
			paint_health(info.status, colored),
			cell(&info.nodes_ready).to_string(),
			info.api_server.clone(),
			info.version.clone().unwrap_or_else(|| "-".to_string()),
			info.message.clone(),
		])?;
	}
	table.finish()
}
